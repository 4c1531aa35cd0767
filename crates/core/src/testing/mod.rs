//! Testing utilities and mock implementations for E2E tests.
//!
//! This module provides in-memory implementations of the storage and engine
//! traits, allowing whole runs to be tested without a remote service.
//!
//! # Example
//!
//! ```rust,ignore
//! use doctr_core::testing::{MockObjectStorage, MockTranslationEngine};
//!
//! let storage = Arc::new(MockObjectStorage::new());
//! let engine = Arc::new(MockTranslationEngine::new().with_storage(storage.clone()));
//!
//! // Configure mock behavior
//! engine.reject_signed_uris_at_submit();
//! engine.fail_document("broken.docx").await;
//!
//! // Use in RunOrchestrator...
//! ```

mod mock_engine;
mod mock_storage;

pub use mock_engine::MockTranslationEngine;
pub use mock_storage::{MockObjectStorage, MOCK_SCHEME};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::engine::{
        DocumentCounts, DocumentOutcome, EngineError, ErrorInfo, FileFormat, JobPhase,
        JobStatus, LanguageInfo, SIGNED_URI_REJECTION_CODE,
    };

    /// A fixed instant (2024-01-01T00:00:00Z) shifted by `offset_secs`.
    pub fn timestamp(offset_secs: i64) -> DateTime<Utc> {
        let base = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        base + Duration::seconds(offset_secs)
    }

    /// A job status with `in_progress` documents still running.
    ///
    /// Terminal phases also count two documents as finished in that phase.
    pub fn job_status(
        phase: JobPhase,
        in_progress: u32,
        last_modified: DateTime<Utc>,
    ) -> JobStatus {
        let finished = if phase.is_terminal() { 2 } else { 0 };
        let mut counts = DocumentCounts {
            total: in_progress + finished,
            in_progress,
            ..Default::default()
        };
        match phase {
            JobPhase::Succeeded => counts.succeeded = finished,
            JobPhase::Failed | JobPhase::ValidationFailed => counts.failed = finished,
            JobPhase::Cancelled => counts.cancelled = finished,
            _ => {}
        }

        JobStatus {
            job_id: "job-test".to_string(),
            phase,
            counts,
            billed_units: 0,
            created_at: timestamp(0),
            last_modified,
            error: None,
        }
    }

    pub fn error_info(code: &str, message: &str) -> ErrorInfo {
        ErrorInfo {
            code: code.to_string(),
            message: message.to_string(),
            inner_code: None,
        }
    }

    /// The error returned when the engine cannot use signed URIs.
    pub fn signed_uri_rejection() -> EngineError {
        EngineError::Rejected {
            status: 400,
            code: "InvalidRequest".to_string(),
            inner_code: Some(SIGNED_URI_REJECTION_CODE.to_string()),
            message: "Cannot access source document location with the current permissions"
                .to_string(),
        }
    }

    /// A successfully translated document.
    pub fn document_outcome(name: &str, language: &str, billed_units: u64) -> DocumentOutcome {
        DocumentOutcome {
            source_path: format!("mock://src/{}", name),
            target_path: Some(format!("mock://{}/{}", language, name)),
            target_language: language.to_string(),
            phase: JobPhase::Succeeded,
            billed_units,
            error: None,
        }
    }

    /// A document that failed with `code`.
    pub fn failed_document(
        name: &str,
        language: &str,
        code: &str,
        message: &str,
    ) -> DocumentOutcome {
        DocumentOutcome {
            source_path: format!("mock://src/{}", name),
            target_path: None,
            target_language: language.to_string(),
            phase: JobPhase::Failed,
            billed_units: 0,
            error: Some(error_info(code, message)),
        }
    }

    /// Catalog entries for the given language codes.
    pub fn languages(codes: &[&str]) -> Vec<LanguageInfo> {
        codes
            .iter()
            .map(|code| LanguageInfo {
                code: code.to_string(),
                name: code.to_uppercase(),
                native_name: code.to_string(),
            })
            .collect()
    }

    /// Word, PDF and plain text.
    pub fn document_formats() -> Vec<FileFormat> {
        vec![
            FileFormat {
                format: "WordDocument".to_string(),
                file_extensions: vec![".docx".to_string()],
                content_types: vec![
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                        .to_string(),
                ],
            },
            FileFormat {
                format: "PortableDocumentFormat".to_string(),
                file_extensions: vec![".pdf".to_string()],
                content_types: vec!["application/pdf".to_string()],
            },
            FileFormat {
                format: "PlainText".to_string(),
                file_extensions: vec![".txt".to_string()],
                content_types: vec!["text/plain".to_string()],
            },
        ]
    }
}
