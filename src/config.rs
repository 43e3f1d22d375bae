// ⚙️ Configuration - TOML file with environment overrides

use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming a TOML config file
pub const CONFIG_ENV: &str = "COLLECTION_LEDGER_CONFIG";
/// Environment variable overriding `database.path`
pub const DATABASE_ENV: &str = "COLLECTION_LEDGER_DB";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub export: ExportConfig,
    pub admin: AdminSeed,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; ":memory:" for a throwaway database
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("collections.db"),
        }
    }
}

/// How export rows are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CsvQuoting {
    /// Fields joined with commas, never escaped (legacy readers)
    Legacy,
    /// Fields containing commas, quotes or newlines are quoted
    #[default]
    Quoted,
}

/// What happens to collectible rows once their period is sealed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    #[default]
    Keep,
    /// Delete the collectibles; the period row stays as the export marker
    Purge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory the CLI's file sink writes into
    pub output_dir: PathBuf,
    pub quoting: CsvQuoting,
    pub retention: RetentionPolicy,
    /// Filename prefix used when no consultant profile exists
    pub default_prefix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("exports"),
            quoting: CsvQuoting::default(),
            retention: RetentionPolicy::default(),
            default_prefix: "collections".to_string(),
        }
    }
}

/// Admin account created when the database has none
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminSeed {
    pub username: String,
    pub password: String,
}

impl Default for AdminSeed {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "admin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| LedgerError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Resolve the effective configuration: explicit path, then
    /// `COLLECTION_LEDGER_CONFIG`, then defaults. `COLLECTION_LEDGER_DB`
    /// always wins for the database path.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var(CONFIG_ENV) {
                Ok(path) => Self::from_file(path)?,
                Err(_) => Config::default(),
            },
        };

        if let Ok(db_path) = std::env::var(DATABASE_ENV) {
            config.database.path = PathBuf::from(db_path);
        }

        Ok(config)
    }
}
