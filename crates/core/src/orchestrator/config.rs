//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::storage::SweepPolicy;
use crate::submission::PollSettings;
use crate::transfer::{RetryConfig, DEFAULT_MAX_CONCURRENCY};

/// Configuration for the run orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum transfers in flight per upload or download batch.
    #[serde(default = "default_max_transfers")]
    pub max_concurrent_transfers: usize,

    /// Delay between job status polls (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Extra attempts for a status query that fails transiently.
    #[serde(default = "default_status_retry_attempts")]
    pub status_retry_attempts: u32,

    /// Delay between those attempts (milliseconds).
    #[serde(default = "default_status_retry_delay")]
    pub status_retry_delay_ms: u64,

    /// Lifetime of signed container URIs (hours).
    #[serde(default = "default_signed_uri_ttl")]
    pub signed_uri_ttl_hours: u32,

    /// Age after which abandoned run containers are swept (days).
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Sweep abandoned containers on one run in every N (0 = never).
    #[serde(default = "default_sweep_every")]
    pub sweep_every_n_runs: u64,

    /// Keep run containers after the run ends.
    /// Useful when inspecting what the engine wrote.
    #[serde(default)]
    pub preserve_containers: bool,

    /// Per-transfer retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_max_transfers() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_poll_interval() -> u64 {
    1000 // 1 second
}

fn default_status_retry_attempts() -> u32 {
    2
}

fn default_status_retry_delay() -> u64 {
    300
}

fn default_signed_uri_ttl() -> u32 {
    5
}

fn default_retention_days() -> u32 {
    7
}

fn default_sweep_every() -> u64 {
    20
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: default_max_transfers(),
            poll_interval_ms: default_poll_interval(),
            status_retry_attempts: default_status_retry_attempts(),
            status_retry_delay_ms: default_status_retry_delay(),
            signed_uri_ttl_hours: default_signed_uri_ttl(),
            retention_days: default_retention_days(),
            sweep_every_n_runs: default_sweep_every(),
            preserve_containers: false,
            retry: RetryConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Checks values that would make runs impossible.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_transfers == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_concurrent_transfers must be greater than 0".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.signed_uri_ttl_hours == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.signed_uri_ttl_hours must be greater than 0".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.poll_interval_ms),
            status_retry_attempts: self.status_retry_attempts,
            status_retry_delay: Duration::from_millis(self.status_retry_delay_ms),
        }
    }

    pub fn sweep_policy(&self) -> SweepPolicy {
        SweepPolicy::new(self.sweep_every_n_runs)
    }

    pub fn signed_uri_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.signed_uri_ttl_hours as i64)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days as i64)
    }
}
