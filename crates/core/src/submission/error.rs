//! Error types for job submission and polling.

use thiserror::Error;

use crate::engine::EngineError;

use super::SubmissionState;

/// Errors that can occur while submitting or tracking a job.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// The engine refused or failed a call.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Status queries kept failing after the inline retries.
    #[error("Status query failed after {attempts} attempts: {source}")]
    StatusUnavailable {
        attempts: u32,
        #[source]
        source: EngineError,
    },

    /// The run's cancellation scope fired.
    #[error("Run cancelled")]
    Cancelled,

    /// Operation not valid in the current state.
    #[error("Cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SubmissionState,
    },
}

impl SubmissionError {
    /// Whether the engine rejected the signed URIs it was given.
    pub fn is_signed_uri_rejection(&self) -> bool {
        matches!(self, Self::Engine(e) if e.is_signed_uri_rejection())
    }
}
