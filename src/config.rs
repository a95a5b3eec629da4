use std::path::PathBuf;
use std::time::Duration;

use cama_sync::SyncPolicy;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub inbox_path: PathBuf,
    pub sync_interval_secs: u64,
    pub sync_batch_size: usize,
    pub sink_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_path = std::env::var("CAMA_DB_PATH")
            .unwrap_or_else(|_| "./cama.redb".to_string())
            .into();

        let inbox_path = std::env::var("CAMA_INBOX_PATH")
            .unwrap_or_else(|_| "./outbox.jsonl".to_string())
            .into();

        let sync_interval_secs = parse_var(
            "CAMA_SYNC_INTERVAL_SECS",
            30,
            "must be a whole number of seconds",
        )?;

        let sync_batch_size: usize = parse_var(
            "CAMA_SYNC_BATCH_SIZE",
            50,
            "must be a positive whole number",
        )?;
        if sync_batch_size == 0 {
            return Err(ConfigError::Invalid("CAMA_SYNC_BATCH_SIZE", "must be at least 1"));
        }

        let sink_timeout_secs = parse_var(
            "CAMA_SINK_TIMEOUT_SECS",
            10,
            "must be a whole number of seconds",
        )?;

        Ok(Config {
            db_path,
            inbox_path,
            sync_interval_secs,
            sync_batch_size,
            sink_timeout_secs,
        })
    }

    pub fn sync_policy(&self) -> SyncPolicy {
        SyncPolicy {
            batch_size: self.sync_batch_size,
            sink_timeout: Duration::from_secs(self.sink_timeout_secs),
            interval: Duration::from_secs(self.sync_interval_secs),
        }
    }

    /// Create a test configuration rooted in `dir`.
    #[cfg(test)]
    pub fn for_testing(dir: &std::path::Path) -> Self {
        Config {
            db_path: dir.join("cama-test.redb"),
            inbox_path: dir.join("outbox.jsonl"),
            sync_interval_secs: 1,
            sync_batch_size: 50,
            sink_timeout_secs: 1,
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    var: &'static str,
    default: T,
    msg: &'static str,
) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(s) if !s.trim().is_empty() => {
            s.trim().parse().map_err(|_| ConfigError::Invalid(var, msg))
        }
        _ => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid(&'static str, &'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid(var, msg) => write!(f, "Invalid value for {}: {}", var, msg),
        }
    }
}

impl std::error::Error for ConfigError {}
