// System
use std::env;

// Third Party
use anyhow::Context;
use tokio::time::Duration;

/// Delay before a closed or failed watch is reopened.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Envelopes buffered in the ingestion channel before watch loops start blocking.
pub const DEFAULT_INGESTION_CAPACITY: usize = 1024;

pub const RETRY_BACKOFF_ENV: &str = "WATCH_RETRY_BACKOFF_MS";
pub const INGESTION_CAPACITY_ENV: &str = "INGESTION_CHANNEL_CAPACITY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub retry_backoff: Duration,
    pub ingestion_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            ingestion_capacity: DEFAULT_INGESTION_CAPACITY,
        }
    }
}

impl ControllerConfig {
    /// Defaults, overridden by `WATCH_RETRY_BACKOFF_MS` and `INGESTION_CHANNEL_CAPACITY`
    /// when they are set.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let mut config = Self::default();
        if let Ok(value) = env::var(RETRY_BACKOFF_ENV) {
            let millis: u64 = value
                .trim()
                .parse()
                .with_context(|| {
                    format!("{} must be a number of milliseconds", RETRY_BACKOFF_ENV)
                })?;
            config.retry_backoff = Duration::from_millis(millis);
        }
        if let Ok(value) = env::var(INGESTION_CAPACITY_ENV) {
            let capacity: usize = value
                .trim()
                .parse()
                .with_context(|| format!("{} must be a positive integer", INGESTION_CAPACITY_ENV))?;
            // tokio's bounded channel panics on a zero capacity
            if capacity == 0 {
                anyhow::bail!("{} must be greater than zero", INGESTION_CAPACITY_ENV);
            }
            config.ingestion_capacity = capacity;
        }
        Ok(config)
    }
}
