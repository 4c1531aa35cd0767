//! Types exchanged with the translation engine.

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::storage::AccessMode;

use super::error::{EngineError, SIGNED_URI_REJECTION_CODE};

/// Lazily fetched, single-pass sequence of per-document results.
pub type DocumentOutcomeStream = BoxStream<'static, Result<DocumentOutcome, EngineError>>;

/// Source language value meaning "let the engine detect it".
pub const AUTO_DETECT: &str = "auto";

/// Where the engine reads documents from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub uri: String,
    /// Absent when the engine should detect the language.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl SourceDescriptor {
    /// Builds a descriptor, mapping `"auto"` (any case) to no language.
    pub fn new(uri: impl Into<String>, language: &str) -> Self {
        let language = language.trim();
        Self {
            uri: uri.into(),
            language: if language.is_empty() || language.eq_ignore_ascii_case(AUTO_DETECT) {
                None
            } else {
                Some(language.to_string())
            },
        }
    }
}

/// A glossary applied to one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryDescriptor {
    pub uri: String,
    /// File format name, e.g. "TSV", "CSV" or "XLIFF".
    pub format: String,
}

/// Where the engine writes documents for one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub uri: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub glossaries: Vec<GlossaryDescriptor>,
}

/// One batch translation submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub source: SourceDescriptor,
    pub targets: Vec<TargetDescriptor>,
    /// How the URIs above grant access.
    pub access_mode: AccessMode,
}

/// A submitted job and the access mode it was submitted with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: String,
    pub access_mode: AccessMode,
}

/// Overall job state reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Cancelling,
    Cancelled,
    ValidationFailed,
}

impl JobPhase {
    /// Parses the engine's status string. Unknown values map to `Running`.
    pub fn from_engine(status: &str) -> Self {
        match status {
            "NotStarted" => JobPhase::NotStarted,
            "Running" => JobPhase::Running,
            "Succeeded" => JobPhase::Succeeded,
            "Failed" => JobPhase::Failed,
            "Cancelling" => JobPhase::Cancelling,
            "Cancelled" => JobPhase::Cancelled,
            "ValidationFailed" => JobPhase::ValidationFailed,
            _ => JobPhase::Running,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::NotStarted => "NotStarted",
            JobPhase::Running => "Running",
            JobPhase::Succeeded => "Succeeded",
            JobPhase::Failed => "Failed",
            JobPhase::Cancelling => "Cancelling",
            JobPhase::Cancelled => "Cancelled",
            JobPhase::ValidationFailed => "ValidationFailed",
        }
    }

    /// Whether the engine will not change this job any further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobPhase::Succeeded
                | JobPhase::Failed
                | JobPhase::Cancelled
                | JobPhase::ValidationFailed
        )
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-document progress counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentCounts {
    pub total: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub in_progress: u32,
    pub not_started: u32,
    pub cancelled: u32,
}

/// A coded engine error attached to a job or document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inner_code: Option<String>,
}

impl ErrorInfo {
    pub fn is_signed_uri_rejection(&self) -> bool {
        self.code == SIGNED_URI_REJECTION_CODE
            || self.inner_code.as_deref() == Some(SIGNED_URI_REJECTION_CODE)
    }

    /// Most specific code available.
    pub fn detail_code(&self) -> &str {
        self.inner_code.as_deref().unwrap_or(&self.code)
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Snapshot of a job returned by a status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub phase: JobPhase,
    pub counts: DocumentCounts,
    /// Units (characters) billed so far.
    pub billed_units: u64,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl JobStatus {
    /// No documents in flight and the job reached a final phase.
    pub fn is_complete(&self) -> bool {
        self.counts.in_progress == 0 && self.phase.is_terminal()
    }
}

/// Result for one document in one target language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    /// Source document location as reported by the engine.
    pub source_path: String,
    /// Translated document location, if one was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
    pub target_language: String,
    pub phase: JobPhase,
    pub billed_units: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl DocumentOutcome {
    pub fn is_success(&self) -> bool {
        self.phase == JobPhase::Succeeded && self.error.is_none()
    }

    /// Last path segment of the source location, decoded, without any query string.
    pub fn display_name(&self) -> String {
        let path = self.source_path.split('?').next().unwrap_or(&self.source_path);
        let segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or(path);
        urlencoding::decode(segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string())
    }
}

/// An entry in the engine's supported-language catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub code: String,
    pub name: String,
    pub native_name: String,
}

/// A document format the engine can translate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFormat {
    pub format: String,
    /// Extensions with a leading dot.
    pub file_extensions: Vec<String>,
    #[serde(default)]
    pub content_types: Vec<String>,
}
