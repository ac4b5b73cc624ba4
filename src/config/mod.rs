//! Configuration module for the recipe version service.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (optional, disabled when unset)
    pub api_psk: Option<String>,
    /// Path to the SQLite file holding commits and branches
    pub db_path: PathBuf,
    /// Path to the SQLite file holding recipe snapshots
    pub snapshot_db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines
    pub log_json: bool,
    /// Upper bound for a single request
    pub request_timeout: Duration,
    /// Attempts for a commit whose branch head moved concurrently
    pub commit_retries: u32,
    /// Minimum age of an unreferenced snapshot before reconciliation removes it
    pub orphan_grace: Duration,
}

/// Invalid configuration value.
#[derive(Debug)]
pub struct ConfigError {
    pub variable: &'static str,
    pub value: String,
    pub reason: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid {} value {:?}: {}",
            self.variable, self.value, self.reason
        )
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("RECIPE_VCS_API_PSK")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let db_path = env::var("RECIPE_VCS_DB_PATH")
            .unwrap_or_else(|_| "./data/metadata.sqlite".to_string())
            .into();

        let snapshot_db_path = env::var("RECIPE_VCS_SNAPSHOT_DB_PATH")
            .unwrap_or_else(|_| "./data/snapshots.sqlite".to_string())
            .into();

        let bind_addr = parse_var("RECIPE_VCS_BIND_ADDR", "127.0.0.1:8080")?;

        let log_level = env::var("RECIPE_VCS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_json = parse_var("RECIPE_VCS_LOG_JSON", "false")?;

        let timeout_secs: u64 = parse_var("RECIPE_VCS_REQUEST_TIMEOUT_SECS", "30")?;

        let commit_retries: u32 = parse_var("RECIPE_VCS_COMMIT_RETRIES", "5")?;

        let grace_secs: u64 = parse_var("RECIPE_VCS_ORPHAN_GRACE_SECS", "300")?;

        Ok(Self {
            api_psk,
            db_path,
            snapshot_db_path,
            bind_addr,
            log_level,
            log_json,
            request_timeout: Duration::from_secs(timeout_secs),
            commit_retries: commit_retries.max(1),
            orphan_grace: Duration::from_secs(grace_secs),
        })
    }
}

fn parse_var<T>(variable: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value = env::var(variable).unwrap_or_else(|_| default.to_string());
    value.trim().parse().map_err(|e: T::Err| ConfigError {
        variable,
        reason: e.to_string(),
        value,
    })
}
