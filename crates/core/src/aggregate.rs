//! Per-document result aggregation and the run success decision.

use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::engine::{DocumentOutcome, DocumentOutcomeStream, EngineError};

/// Failure reason for a run that finished without writing any output.
pub const NO_OUTPUT_REASON: &str = "No output produced: zero files were downloaded";

/// Totals over every document outcome of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub billed_units: u64,
    /// Documents that did not translate, in engine order.
    pub failures: Vec<DocumentOutcome>,
}

impl OutcomeSummary {
    pub fn record(&mut self, outcome: DocumentOutcome) {
        self.billed_units += outcome.billed_units;
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
            self.failures.push(outcome);
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// One line per failed document, or `None` when everything translated.
    pub fn error_report(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        let lines: Vec<String> = self.failures.iter().map(failure_line).collect();
        Some(lines.join("\n"))
    }
}

/// Drains the whole outcome stream. The first page error aborts the drain.
pub async fn collect_outcomes(
    mut outcomes: DocumentOutcomeStream,
) -> Result<OutcomeSummary, EngineError> {
    let mut summary = OutcomeSummary::default();
    while let Some(outcome) = outcomes.next().await {
        summary.record(outcome?);
    }
    Ok(summary)
}

/// Final verdict for a run.
///
/// A run succeeds only when it downloaded at least one file and no earlier
/// stage recorded a failure reason. The earlier reason always wins.
pub fn decide_success(
    failure_reason: Option<String>,
    files_downloaded: usize,
) -> Result<(), String> {
    match failure_reason {
        Some(reason) => Err(reason),
        None if files_downloaded == 0 => Err(NO_OUTPUT_REASON.to_string()),
        None => Ok(()),
    }
}

fn failure_line(outcome: &DocumentOutcome) -> String {
    let name = outcome.display_name();
    match outcome.error {
        Some(ref error) => format!(
            "{} ({}): {} [{}]",
            name,
            outcome.target_language,
            error.message,
            error.detail_code()
        ),
        None => format!(
            "{} ({}): document ended as {}",
            name, outcome.target_language, outcome.phase
        ),
    }
}
