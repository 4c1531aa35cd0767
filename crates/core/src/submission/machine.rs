//! Submission and polling state machine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{
    EngineError, GlossaryDescriptor, JobHandle, JobPhase, JobStatus, SourceDescriptor,
    TargetDescriptor, TranslationEngine, TranslationRequest,
};
use crate::events::{EventSink, RunEvent};
use crate::metrics;
use crate::storage::AccessMode;

use super::error::SubmissionError;
use super::types::{PollSettings, SubmissionState};

/// Builds the engine request for one source container and its targets.
///
/// `targets` pairs each language code with its container URI. Every glossary
/// applies to every target.
pub fn build_request(
    source_uri: String,
    source_language: &str,
    targets: Vec<(String, String)>,
    glossaries: &[GlossaryDescriptor],
    category: Option<&str>,
    access_mode: AccessMode,
) -> TranslationRequest {
    TranslationRequest {
        source: SourceDescriptor::new(source_uri, source_language),
        targets: targets
            .into_iter()
            .map(|(language, uri)| TargetDescriptor {
                uri,
                language,
                category: category.filter(|c| !c.is_empty()).map(String::from),
                glossaries: glossaries.to_vec(),
            })
            .collect(),
        access_mode,
    }
}

/// Drives a single job through submission, polling and cancellation.
pub struct SubmissionMachine {
    engine: Arc<dyn TranslationEngine>,
    settings: PollSettings,
    cancel: CancellationToken,
    events: EventSink,
    state: SubmissionState,
    handle: Option<JobHandle>,
}

impl SubmissionMachine {
    pub fn new(
        engine: Arc<dyn TranslationEngine>,
        settings: PollSettings,
        cancel: CancellationToken,
        events: EventSink,
    ) -> Self {
        Self {
            engine,
            settings,
            cancel,
            events,
            state: SubmissionState::NotSubmitted,
            handle: None,
        }
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    /// Handle of the most recent successful submission.
    pub fn handle(&self) -> Option<&JobHandle> {
        self.handle.as_ref()
    }

    /// Submits `request`, replacing any previous job handle.
    ///
    /// A rejected attempt leaves the machine in its prior state so the caller
    /// may resubmit with different access.
    pub async fn submit(
        &mut self,
        request: &TranslationRequest,
    ) -> Result<JobHandle, SubmissionError> {
        if matches!(
            self.state,
            SubmissionState::Submitted | SubmissionState::Polling | SubmissionState::Cancelled
        ) {
            return Err(SubmissionError::InvalidState {
                operation: "submit",
                state: self.state,
            });
        }

        let job_id = tokio::select! {
            _ = self.cancel.cancelled() => return Err(SubmissionError::Cancelled),
            result = self.engine.submit_translation(request) => result?,
        };

        let handle = JobHandle {
            id: job_id,
            access_mode: request.access_mode,
        };
        info!(
            "Run {} submitted job {} using {}",
            self.events.run_id(),
            handle.id,
            handle.access_mode.as_str()
        );
        self.handle = Some(handle.clone());
        self.state = SubmissionState::Submitted;
        Ok(handle)
    }

    /// Polls the current job until it finishes.
    ///
    /// Returns the final status; `ValidationFailed` is returned as soon as the
    /// engine reports it. Every poll emits a heartbeat and every change of the
    /// last-modified time emits a status change.
    pub async fn poll(&mut self) -> Result<JobStatus, SubmissionError> {
        let Some(job_id) = self.handle.as_ref().map(|h| h.id.clone()) else {
            return Err(SubmissionError::InvalidState {
                operation: "poll",
                state: self.state,
            });
        };
        if self.state.is_terminal() {
            return Err(SubmissionError::InvalidState {
                operation: "poll",
                state: self.state,
            });
        }
        self.state = SubmissionState::Polling;

        let mut last_modified: Option<DateTime<Utc>> = None;
        loop {
            let status = tokio::select! {
                _ = self.cancel.cancelled() => return Err(SubmissionError::Cancelled),
                result = self.fetch_status(&job_id) => result?,
            };
            metrics::STATUS_POLLS.inc();

            self.events
                .emit(RunEvent::Heartbeat {
                    status: status.clone(),
                })
                .await;

            if last_modified != Some(status.last_modified) {
                last_modified = Some(status.last_modified);
                debug!("Job {} is {}", job_id, status.phase);
                self.events
                    .emit(RunEvent::StatusChanged {
                        phase: status.phase,
                        message: describe(&status),
                    })
                    .await;
            }

            if status.phase == JobPhase::ValidationFailed || status.is_complete() {
                self.state = SubmissionState::from_final_phase(status.phase);
                info!("Job {} finished polling as {:?}", job_id, self.state);
                return Ok(status);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(SubmissionError::Cancelled),
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }
    }

    /// Cancels the run's scope and the engine job, then fetches one final status.
    ///
    /// Engine errors are logged. Containers are left for the caller to clean up.
    pub async fn cancel(&mut self) -> Option<JobStatus> {
        self.cancel.cancel();
        self.state = SubmissionState::Cancelled;

        let handle = self.handle.as_ref()?;
        if let Err(e) = self.engine.cancel(&handle.id).await {
            warn!("Failed to cancel job {}: {}", handle.id, e);
        }
        match self.engine.get_status(&handle.id).await {
            Ok(status) => {
                info!("Job {} is {} after cancellation", handle.id, status.phase);
                Some(status)
            }
            Err(e) => {
                warn!("Failed to fetch status of cancelled job {}: {}", handle.id, e);
                None
            }
        }
    }

    /// One status query with inline retries for transient failures.
    async fn fetch_status(&self, job_id: &str) -> Result<JobStatus, SubmissionError> {
        let attempts = self.settings.status_retry_attempts + 1;
        let mut attempt = 1;
        loop {
            match self.engine.get_status(job_id).await {
                Ok(status) => return Ok(status),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(
                        "Status query for job {} failed (attempt {}/{}): {}",
                        job_id, attempt, attempts, e
                    );
                    tokio::time::sleep(self.settings.status_retry_delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(SubmissionError::StatusUnavailable {
                        attempts,
                        source: e,
                    })
                }
                Err(e) => return Err(SubmissionError::Engine(e)),
            }
        }
    }
}

fn describe(status: &JobStatus) -> String {
    let counts = &status.counts;
    let mut message = format!(
        "{}: {} of {} documents done, {} in progress",
        status.phase,
        counts.succeeded + counts.failed + counts.cancelled,
        counts.total,
        counts.in_progress
    );
    if let Some(ref error) = status.error {
        message.push_str(&format!(" ({})", error));
    }
    message
}

/// Error to report for a job that ended without succeeding.
pub(crate) fn final_status_error(status: &JobStatus) -> Option<EngineError> {
    let error = status.error.as_ref()?;
    Some(EngineError::Rejected {
        status: 200,
        code: error.code.clone(),
        inner_code: error.inner_code.clone(),
        message: error.message.clone(),
    })
}
