//! Runtime configuration
//!
//! Process settings come from the environment (with `.env` support); the
//! download locations come from a JSON file passed on the command line.

use crate::storage::PgConfig;
use cnpj_common::{CnpjError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

/// Default directory for downloaded and extracted files.
pub const DEFAULT_DATA_DOWNLOAD_PATH: &str = "./data";

/// Default maximum database connections in the pool.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Default database connection timeout in seconds.
pub const DEFAULT_DB_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default per-operation database timeout in seconds.
pub const DEFAULT_DB_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Default HTTP connect timeout in seconds.
pub const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default timeout for the HEAD probe against each download location.
pub const DEFAULT_HTTP_PROBE_TIMEOUT_SECS: u64 = 30;

/// Process configuration loaded from the environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub database_url: String,
    pub data_download_path: PathBuf,
    pub db_max_connections: u32,
    pub db_connect_timeout_secs: u64,
    pub db_operation_timeout_secs: u64,
    pub http_connect_timeout_secs: u64,
    pub http_probe_timeout_secs: u64,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl IngestConfig {
    /// Load configuration from `.env` and the process environment
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| CnpjError::Config("DATABASE_URL must be set".to_string()))?,
            data_download_path: std::env::var("DATA_DOWNLOAD_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DOWNLOAD_PATH)),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            db_connect_timeout_secs: env_or(
                "DB_CONNECT_TIMEOUT_SECS",
                DEFAULT_DB_CONNECT_TIMEOUT_SECS,
            ),
            db_operation_timeout_secs: env_or(
                "DB_OPERATION_TIMEOUT_SECS",
                DEFAULT_DB_OPERATION_TIMEOUT_SECS,
            ),
            http_connect_timeout_secs: env_or(
                "HTTP_CONNECT_TIMEOUT_SECS",
                DEFAULT_HTTP_CONNECT_TIMEOUT_SECS,
            ),
            http_probe_timeout_secs: env_or(
                "HTTP_PROBE_TIMEOUT_SECS",
                DEFAULT_HTTP_PROBE_TIMEOUT_SECS,
            ),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.database_url.starts_with("postgres://")
            || self.database_url.starts_with("postgresql://"))
        {
            return Err(CnpjError::Config(
                "DATABASE_URL must start with postgres:// or postgresql://".to_string(),
            ));
        }

        if self.db_max_connections == 0 {
            return Err(CnpjError::Config(
                "DB_MAX_CONNECTIONS must be greater than 0".to_string(),
            ));
        }

        for (name, secs) in [
            ("DB_CONNECT_TIMEOUT_SECS", self.db_connect_timeout_secs),
            ("DB_OPERATION_TIMEOUT_SECS", self.db_operation_timeout_secs),
            ("HTTP_CONNECT_TIMEOUT_SECS", self.http_connect_timeout_secs),
            ("HTTP_PROBE_TIMEOUT_SECS", self.http_probe_timeout_secs),
        ] {
            if secs == 0 {
                return Err(CnpjError::Config(format!("{} must be greater than 0", name)));
            }
        }

        Ok(())
    }

    pub fn database(&self) -> PgConfig {
        PgConfig {
            url: self.database_url.clone(),
            max_connections: self.db_max_connections,
            connect_timeout: Duration::from_secs(self.db_connect_timeout_secs),
            operation_timeout: Duration::from_secs(self.db_operation_timeout_secs),
        }
    }

    pub fn http_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.http_connect_timeout_secs)
    }

    pub fn http_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.http_probe_timeout_secs)
    }
}

/// Where the release is published
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadConfig {
    /// Catalog page listing the release files
    pub main_url: String,
    /// Base URLs tried, in order, after the file's own directory
    #[serde(default)]
    pub mirror_urls: Vec<String>,
    /// NR-04 PDF with the risk grade table
    pub reference_doc_url: String,
}

impl DownloadConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;

        if config.main_url.trim().is_empty() {
            return Err(CnpjError::Config("mainUrl cannot be empty".to_string()));
        }

        Ok(config)
    }
}
