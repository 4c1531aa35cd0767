//! Per-run progress notifications.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::engine::{JobPhase, JobStatus};

/// Notifications emitted while a run progresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    UploadStarted {
        files: usize,
    },
    UploadCompleted {
        count: usize,
        bytes: u64,
    },
    /// The job's last-modified timestamp moved.
    StatusChanged {
        phase: JobPhase,
        message: String,
    },
    /// Raw status from every poll.
    Heartbeat {
        status: JobStatus,
    },
    DownloadCompleted {
        count: usize,
        bytes: u64,
    },
    FilesDiscarded {
        paths: Vec<PathBuf>,
    },
    ErrorsOccurred {
        message: String,
    },
}

/// Envelope wrapping a run event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEventEnvelope {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: RunEvent,
}

/// Per-run sink for [`RunEvent`]s.
///
/// Cheaply cloneable. A sink without a channel drops every event, and a full or
/// closed channel is logged but never fails the run.
#[derive(Clone)]
pub struct EventSink {
    run_id: String,
    tx: Option<mpsc::Sender<RunEventEnvelope>>,
}

impl EventSink {
    /// Create a sink from a channel sender
    pub fn new(run_id: impl Into<String>, tx: mpsc::Sender<RunEventEnvelope>) -> Self {
        Self {
            run_id: run_id.into(),
            tx: Some(tx),
        }
    }

    /// A sink that discards everything.
    pub fn disabled(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            tx: None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Emit an event without waiting for the receiver.
    ///
    /// A full or closed channel drops the event, so a caller that stops
    /// reading never stalls the run.
    pub async fn emit(&self, event: RunEvent) {
        self.try_emit(event);
    }

    /// Try to emit an event without blocking
    ///
    /// Returns true if the event was queued, false otherwise.
    pub fn try_emit(&self, event: RunEvent) -> bool {
        let Some(ref tx) = self.tx else {
            return false;
        };
        let envelope = RunEventEnvelope {
            run_id: self.run_id.clone(),
            timestamp: Utc::now(),
            event,
        };
        match tx.try_send(envelope) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Event channel full for run {}, dropping event", self.run_id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("Event channel closed for run {}, dropping event", self.run_id);
                false
            }
        }
    }
}
