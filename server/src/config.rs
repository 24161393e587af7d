//! Configuration management for the server.

use std::env;
use storysync_engine::DEFAULT_RETENTION;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL; documents are kept in memory without one
    pub database_url: Option<String>,
    /// Shared bearer token required on document routes when set
    pub auth_secret: Option<String>,
    /// Snapshots kept per document
    pub snapshot_retention: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let auth_secret = env::var("AUTH_SECRET").ok().filter(|s| !s.is_empty());

        let snapshot_retention = match env::var("SNAPSHOT_RETENTION") {
            Ok(value) => match value.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::InvalidRetention(value)),
            },
            Err(_) => DEFAULT_RETENTION,
        };

        Ok(Self {
            host,
            port,
            database_url,
            auth_secret,
            snapshot_retention,
        })
    }

    /// In-memory configuration for tests and local tooling.
    pub fn in_memory() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: None,
            auth_secret: None,
            snapshot_retention: DEFAULT_RETENTION,
        }
    }

    pub fn with_auth_secret(mut self, secret: impl Into<String>) -> Self {
        self.auth_secret = Some(secret.into());
        self
    }

    pub fn with_snapshot_retention(mut self, retention: usize) -> Self {
        self.snapshot_retention = retention.max(1);
        self
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid SNAPSHOT_RETENTION value: {0}")]
    InvalidRetention(String),
}
