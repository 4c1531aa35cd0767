//! Run orchestrator for batch document translation.
//!
//! One run stages local files into per-run containers, submits a translation
//! job, polls it to completion, downloads the results and removes the
//! containers again:
//! - **Validation**: inputs, languages and formats are checked before anything
//!   remote is created
//! - **Failover**: a rejection of signed URIs triggers exactly one resubmission
//!   with direct identity
//! - **Outcome**: every run produces one `RunOutcome`; only configuration errors are raised

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::{resolve_output_dir, RunOrchestrator, LANGUAGE_PLACEHOLDER};
pub use types::{RunContext, RunError, RunOutcome, RunRequest};
