//! Trait definitions for the translation engine.

use async_trait::async_trait;

use super::error::EngineError;
use super::types::{DocumentOutcomeStream, FileFormat, JobStatus, LanguageInfo, TranslationRequest};

/// A remote batch document translation service.
#[async_trait]
pub trait TranslationEngine: Send + Sync {
    /// Returns the name of this engine implementation.
    fn name(&self) -> &str;

    /// Submits a batch and returns the engine's job id.
    async fn submit_translation(&self, request: &TranslationRequest) -> Result<String, EngineError>;

    /// Fetches the current status of a job.
    async fn get_status(&self, job_id: &str) -> Result<JobStatus, EngineError>;

    /// Asks the engine to stop a job.
    async fn cancel(&self, job_id: &str) -> Result<(), EngineError>;

    /// Per-document results, fetched page by page as the stream is consumed.
    fn list_document_outcomes(&self, job_id: &str) -> DocumentOutcomeStream;

    /// Languages the engine can translate into.
    async fn list_supported_languages(&self) -> Result<Vec<LanguageInfo>, EngineError>;

    /// Document formats the engine accepts.
    async fn list_supported_formats(&self) -> Result<Vec<FileFormat>, EngineError>;
}
