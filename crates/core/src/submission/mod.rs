//! Job submission and polling.
//!
//! `SubmissionMachine` drives one job through
//! `NotSubmitted -> Submitted -> Polling -> {Succeeded, ValidationFailed, Failed, Cancelled}`.
//! Polling reports progress through the run's event sink: a heartbeat for every
//! poll, and a status change whenever the job's last-modified time moves.
//! Submit, poll and cancel all observe the run's cancellation token.

mod error;
mod machine;
mod types;

pub use error::SubmissionError;
pub use machine::{build_request, SubmissionMachine};
pub(crate) use machine::final_status_error;
pub use types::{PollSettings, SubmissionState};
