//! Configuration view and validation commands — `civic-issues config`.

use std::path::Path;

use anyhow::Result;

use civic_issues::config::{AppConfig, DEFAULT_CONFIG_FILE};

use super::super::ConfigCommands;

pub fn cmd_config(
    config: &AppConfig,
    explicit: Option<&Path>,
    command: Option<ConfigCommands>,
) -> Result<()> {
    let source = match explicit {
        Some(path) => path.display().to_string(),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => DEFAULT_CONFIG_FILE.to_string(),
        None => "built-in defaults".to_string(),
    };
    let problems = config.validate();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Civic Issues Configuration");
            println!("==========================");
            println!();
            println!("Source: {} (with CIVIC_* env overrides)", source);
            println!();

            println!("[server]");
            println!("  host = \"{}\"", config.server.host);
            println!("  port = {}", config.server.port);
            println!("  dev_mode = {}", config.server.dev_mode);
            println!();
            println!("[storage]");
            println!("  db_path = \"{}\"", config.storage.db_path.display());
            println!("  uploads_dir = \"{}\"", config.storage.uploads_dir.display());
            println!();
            println!("[uploads]");
            println!("  max_image_bytes = {}", config.uploads.max_image_bytes);
            println!();
            println!("[auth]");
            match &config.auth.team_token {
                Some(_) => println!("  team_token = \"<redacted>\""),
                None => println!("  team_token = (unset, team routes are open)"),
            }
            println!();
            println!("[logging]");
            println!("  json = {}", config.logging.json);
            if let Some(dir) = &config.logging.directory {
                println!("  directory = \"{}\"", dir.display());
            }
            println!("  filter = \"{}\"", config.logging.filter);
            println!();

            for problem in &problems {
                println!("warning: {}", problem);
            }
        }
        Some(ConfigCommands::Validate) => {
            if !problems.is_empty() {
                anyhow::bail!("Configuration has problems:\n  {}", problems.join("\n  "));
            }
            println!("Configuration is valid ({})", source);
        }
    }
    Ok(())
}
