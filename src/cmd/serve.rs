//! Server lifecycle commands — `civic-issues serve` and `civic-issues init`.

use anyhow::{Context, Result};

use civic_issues::config::AppConfig;
use civic_issues::issues::db::IssueDb;
use civic_issues::issues::server::{self, ServerConfig};

pub async fn cmd_serve(config: &AppConfig) -> Result<()> {
    let problems = config.validate();
    if !problems.is_empty() {
        anyhow::bail!("Invalid configuration:\n  {}", problems.join("\n  "));
    }
    server::start_server(ServerConfig::from(config)).await
}

pub fn cmd_init(config: &AppConfig) -> Result<()> {
    let db_path = &config.storage.db_path;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = IssueDb::new(db_path)?;
    let count = db.count_issues()?;
    println!(
        "Issue database initialized at {} ({} issues)",
        db_path.display(),
        count
    );
    Ok(())
}
