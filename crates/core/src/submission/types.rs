//! Types for the submission state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::JobPhase;

/// Lifecycle of one job submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    NotSubmitted,
    Submitted,
    Polling,
    Succeeded,
    ValidationFailed,
    Failed,
    Cancelled,
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::ValidationFailed | Self::Failed | Self::Cancelled
        )
    }

    /// State reached when polling ends on `phase`.
    pub(crate) fn from_final_phase(phase: JobPhase) -> Self {
        match phase {
            JobPhase::Succeeded => Self::Succeeded,
            JobPhase::ValidationFailed => Self::ValidationFailed,
            JobPhase::Cancelled => Self::Cancelled,
            _ => Self::Failed,
        }
    }
}

/// Timing of status polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay between polls.
    pub interval: Duration,
    /// Extra attempts for a status query that fails transiently.
    pub status_retry_attempts: u32,
    /// Delay between those extra attempts.
    pub status_retry_delay: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            status_retry_attempts: 2,
            status_retry_delay: Duration::from_millis(300),
        }
    }
}
