//! Types for the run orchestrator.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::{EngineError, AUTO_DETECT};
use crate::events::RunEventEnvelope;
use crate::storage::{AccessMode, StorageError};
use crate::submission::SubmissionError;
use crate::transfer::TransferError;

/// One batch translation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Files or directories; directories contribute their immediate files.
    pub paths: Vec<PathBuf>,
    /// Source language code, or "auto" to let the engine detect it.
    #[serde(default = "default_source_language")]
    pub source_language: String,
    pub target_languages: Vec<String>,
    #[serde(default)]
    pub glossaries: Vec<PathBuf>,
    /// Output directory; `{lang}` is replaced by each target language.
    #[serde(default)]
    pub output_template: Option<String>,
    /// Overrides the configured container preservation for this run.
    #[serde(default)]
    pub preserve_containers: Option<bool>,
}

fn default_source_language() -> String {
    AUTO_DETECT.to_string()
}

impl RunRequest {
    pub fn new<P, L>(paths: P, target_languages: L) -> Self
    where
        P: IntoIterator,
        P::Item: Into<PathBuf>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            source_language: default_source_language(),
            target_languages: target_languages.into_iter().map(Into::into).collect(),
            glossaries: Vec::new(),
            output_template: None,
            preserve_containers: None,
        }
    }

    pub fn with_source_language(mut self, language: impl Into<String>) -> Self {
        self.source_language = language.into();
        self
    }

    pub fn with_glossaries<P>(mut self, glossaries: P) -> Self
    where
        P: IntoIterator,
        P::Item: Into<PathBuf>,
    {
        self.glossaries = glossaries.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_output_template(mut self, template: impl Into<String>) -> Self {
        self.output_template = Some(template.into());
        self
    }
}

/// Result of one run. Produced exactly once per request, on every path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub success: bool,
    /// Absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub files_uploaded: usize,
    pub bytes_uploaded: u64,
    pub files_downloaded: usize,
    pub bytes_downloaded: u64,
    pub billed_units: u64,
    pub documents_succeeded: usize,
    pub documents_failed: usize,
    /// Output directory per target language.
    pub output_dirs: BTreeMap<String, PathBuf>,
    /// Inputs skipped because of their extension.
    pub discarded: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<AccessMode>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Per-run wiring supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Run id; generated when absent.
    pub run_id: Option<String>,
    /// Receives this run's notifications.
    pub events: Option<mpsc::Sender<RunEventEnvelope>>,
    /// Cancels submission and polling.
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn with_events(events: mpsc::Sender<RunEventEnvelope>) -> Self {
        Self {
            events: Some(events),
            ..Default::default()
        }
    }
}

/// Reasons a run stops early. The display text becomes the outcome's failure reason.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Run has no files to translate")]
    NoFiles,

    #[error("No target language specified")]
    NoTargetLanguage,

    #[error("Unknown target language: {0}")]
    UnknownTargetLanguage(String),

    #[error("Unknown source language: {0}")]
    UnknownSourceLanguage(String),

    #[error("Found no files with a supported extension ({discarded} discarded)")]
    NoSupportedFiles { discarded: usize },

    #[error("Unsupported glossary format: {}", .0.display())]
    UnsupportedGlossary(PathBuf),

    #[error("Cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch {what} from the engine: {source}")]
    Catalog {
        what: &'static str,
        #[source]
        source: EngineError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("Submission failed: {0}")]
    Submission(#[source] SubmissionError),

    #[error("Polling failed: {0}")]
    Polling(#[source] SubmissionError),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Translation failed: {0}")]
    TranslationFailed(String),

    #[error("Failed to fetch document results: {0}")]
    Outcomes(#[source] EngineError),

    #[error("Run cancelled")]
    Cancelled,
}
