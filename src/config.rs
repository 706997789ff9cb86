//! Layered configuration for the issue service.
//!
//! Settings resolve in order: built-in defaults, then `civic.toml` (or the
//! file passed with `--config`), then `CIVIC_*` environment variables
//! (a `.env` file is loaded first if present), then CLI flags.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 4100
//! dev_mode = false
//!
//! [storage]
//! db_path = "data/civic.db"
//! uploads_dir = "uploads"
//!
//! [uploads]
//! max_image_bytes = 10485760
//!
//! [auth]
//! team_token = "change-me"
//!
//! [logging]
//! json = false
//! directory = "logs"
//! filter = "info"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::issues::ingest::MAX_IMAGE_BYTES;

pub const DEFAULT_CONFIG_FILE: &str = "civic.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSection {
    /// Bind address; all interfaces by default.
    pub host: String,
    pub port: u16,
    /// Includes internal error detail in responses.
    pub dev_mode: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4100,
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageSection {
    pub db_path: PathBuf,
    pub uploads_dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/civic.db"),
            uploads_dir: PathBuf::from("uploads"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadsSection {
    pub max_image_bytes: usize,
}

impl Default for UploadsSection {
    fn default() -> Self {
        Self {
            max_image_bytes: MAX_IMAGE_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthSection {
    /// Bearer token required on repair-team routes. Unset leaves them open.
    pub team_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSection {
    pub json: bool,
    /// Directory for daily-rolling log files; stderr only when unset.
    pub directory: Option<PathBuf>,
    /// Default filter when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            json: false,
            directory: None,
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSection,
    pub storage: StorageSection,
    pub uploads: UploadsSection,
    pub auth: AuthSection,
    pub logging: LoggingSection,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse civic.toml")
    }

    /// Load an explicit file, or `civic.toml` in the working directory when
    /// it exists, or the defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::load(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply `CIVIC_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `CIVIC_*` overrides using `lookup` as the environment.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("CIVIC_HOST") {
            self.server.host = host.trim().to_string();
        }
        if let Some(port) = lookup("CIVIC_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid CIVIC_PORT '{}'", port))?;
        }
        if let Some(dev) = lookup("CIVIC_DEV") {
            self.server.dev_mode = matches!(dev.trim(), "1" | "true" | "yes");
        }
        if let Some(path) = lookup("CIVIC_DB_PATH") {
            self.storage.db_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("CIVIC_UPLOADS_DIR") {
            self.storage.uploads_dir = PathBuf::from(dir);
        }
        if let Some(token) = lookup("CIVIC_TEAM_TOKEN") {
            let token = token.trim().to_string();
            self.auth.team_token = (!token.is_empty()).then_some(token);
        }
        Ok(())
    }

    /// Human-readable problems with the effective configuration.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.server.host.trim().is_empty() {
            problems.push("server.host must not be empty".to_string());
        }
        if self.server.port == 0 {
            problems.push("server.port must be non-zero".to_string());
        }
        if self.uploads.max_image_bytes == 0 {
            problems.push("uploads.max_image_bytes must be greater than zero".to_string());
        }
        if self.storage.db_path.as_os_str().is_empty() {
            problems.push("storage.db_path must not be empty".to_string());
        }
        if self.storage.uploads_dir.as_os_str().is_empty() {
            problems.push("storage.uploads_dir must not be empty".to_string());
        }
        if matches!(&self.auth.team_token, Some(t) if t.trim().is_empty()) {
            problems.push("auth.team_token must not be blank when set".to_string());
        }
        problems
    }
}
