//! Session configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use storysync_engine::{ResolutionStrategy, ScalarPolicy, SchedulerConfig, WriterId};

/// What the session does when a save is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Resolve immediately with a fixed strategy
    Auto(ResolutionStrategy),
    /// Park the conflict until the host picks a strategy
    Interactive,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        ConflictPolicy::Auto(ResolutionStrategy::Merge)
    }
}

impl FromStr for ConflictPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "merge" => Ok(ConflictPolicy::Auto(ResolutionStrategy::Merge)),
            "keep-local" | "local" => Ok(ConflictPolicy::Auto(ResolutionStrategy::KeepLocal)),
            "keep-remote" | "remote" => Ok(ConflictPolicy::Auto(ResolutionStrategy::KeepRemote)),
            "interactive" | "ask" => Ok(ConflictPolicy::Interactive),
            _ => Err(ConfigError::InvalidPolicy(s.to_string())),
        }
    }
}

/// Configuration for an editing session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Debounce and staleness ceiling.
    pub scheduler: SchedulerConfig,
    /// Conflict handling.
    pub conflict_policy: ConflictPolicy,
    /// How document-level scalars are merged.
    pub scalar_policy: ScalarPolicy,
    /// Identity recorded as the writer of accepted saves.
    pub writer: WriterId,
}

impl SessionConfig {
    /// Creates a configuration with default timings.
    pub fn new(writer: impl Into<WriterId>) -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            conflict_policy: ConflictPolicy::default(),
            scalar_policy: ScalarPolicy::default(),
            writer: writer.into(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// `STORYSYNC_WRITER` defaults to a random session id.
    pub fn from_env() -> Result<Self, ConfigError> {
        let writer = env::var("STORYSYNC_WRITER")
            .unwrap_or_else(|_| format!("session-{}", uuid::Uuid::new_v4()));
        let mut config = Self::new(writer);

        if let Some(ms) = read_millis("STORYSYNC_DEBOUNCE_MS")? {
            config.scheduler.debounce_ms = ms;
        }
        if let Some(ms) = read_millis("STORYSYNC_MAX_INTERVAL_MS")? {
            config.scheduler.max_interval_ms = ms;
        }
        if let Ok(policy) = env::var("STORYSYNC_CONFLICT_POLICY") {
            config.conflict_policy = policy.parse()?;
        }

        Ok(config)
    }

    /// Sets the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.scheduler.debounce_ms = debounce.as_millis() as u64;
        self
    }

    /// Sets the staleness ceiling.
    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.scheduler.max_interval_ms = max_interval.as_millis() as u64;
        self
    }

    /// Sets the conflict policy.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Sets the scalar merge policy.
    pub fn with_scalar_policy(mut self, policy: ScalarPolicy) -> Self {
        self.scalar_policy = policy;
        self
    }
}

fn read_millis(var: &'static str) -> Result<Option<u64>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        Err(_) => Ok(None),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("unknown conflict policy: {0}")]
    InvalidPolicy(String),
}
