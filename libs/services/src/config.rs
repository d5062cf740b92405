//! Configuration for the service container.

use std::time::Duration;

use anyhow::Result;

/// Service container configuration.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Maximum number of start/stop actions running in parallel.
    pub max_concurrent_starts: usize,

    /// Deadline for a single start action; exceeding it marks the service failed.
    pub start_timeout: Duration,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_starts: 8,
            start_timeout: Duration::from_secs(30),
        }
    }
}

impl ContainerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let max_concurrent_starts = std::env::var("MAST_MAX_CONCURRENT_STARTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_concurrent_starts);

        let start_timeout = std::env::var("MAST_START_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.start_timeout);

        Ok(Self {
            max_concurrent_starts,
            start_timeout,
        })
    }
}
