use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use civic_issues::config::AppConfig;
use civic_issues::telemetry;

mod cmd;

#[derive(Parser)]
#[command(name = "civic-issues")]
#[command(version, about = "Civic infrastructure issue reporting service")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the config file. Defaults to civic.toml in the working directory when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Directory for uploaded images
        #[arg(long)]
        uploads_dir: Option<PathBuf>,

        /// Enable dev mode (internal error details in responses)
        #[arg(long)]
        dev: bool,
    },
    /// Initialize the issue database without starting the server
    Init {
        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate the effective configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_env()?;

    let _log_guard = telemetry::init_tracing(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            db_path,
            uploads_dir,
            dev,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(path) = db_path {
                config.storage.db_path = path;
            }
            if let Some(dir) = uploads_dir {
                config.storage.uploads_dir = dir;
            }
            if dev {
                config.server.dev_mode = true;
            }
            cmd::cmd_serve(&config).await?;
        }
        Commands::Init { db_path } => {
            if let Some(path) = db_path {
                config.storage.db_path = path;
            }
            cmd::cmd_init(&config)?;
        }
        Commands::Config { command } => cmd::cmd_config(&config, cli.config.as_deref(), command)?,
    }

    Ok(())
}
