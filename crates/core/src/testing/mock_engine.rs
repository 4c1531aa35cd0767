//! Mock translation engine for testing.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::{
    DocumentCounts, DocumentOutcome, DocumentOutcomeStream, EngineError, ErrorInfo, FileFormat,
    JobPhase, JobStatus, LanguageInfo, TranslationEngine, TranslationRequest,
};
use crate::storage::{blob_uri, AccessMode};

use super::fixtures;
use super::mock_storage::MockObjectStorage;

/// Where the mock rejects signed URIs, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignedUriRejection {
    Never,
    AtSubmit,
    AtValidation,
}

/// Mock implementation of the TranslationEngine trait.
///
/// Provides controllable behavior for testing:
/// - Record submissions, status queries and cancellations
/// - Script the sequence of job statuses
/// - Simulate signed URI rejections and per-document failures
/// - With attached storage, "translate" by copying source blobs into targets
///
/// Scripted statuses are consumed in order; the last one keeps being returned.
/// Without a script every job reports success.
///
/// # Example
///
/// ```rust,ignore
/// let storage = Arc::new(MockObjectStorage::new());
/// let engine = MockTranslationEngine::new().with_storage(storage.clone());
///
/// engine.push_status(fixtures::job_status(JobPhase::Running, 1, fixtures::timestamp(0))).await;
/// engine.push_status(fixtures::job_status(JobPhase::Succeeded, 0, fixtures::timestamp(1))).await;
/// engine.reject_signed_uris_at_submit();
///
/// // Run the orchestrator...
///
/// let submitted = engine.submitted().await;
/// assert_eq!(submitted.last().unwrap().access_mode, AccessMode::DirectIdentity);
/// ```
#[derive(Debug)]
pub struct MockTranslationEngine {
    /// Requests that were accepted, in order.
    submitted: Arc<RwLock<Vec<TranslationRequest>>>,
    /// Access modes of every submit attempt, accepted or not.
    attempts: Arc<RwLock<Vec<AccessMode>>>,
    /// Errors returned by upcoming submits.
    submit_errors: Arc<RwLock<VecDeque<EngineError>>>,
    /// Scripted status responses.
    statuses: Arc<RwLock<VecDeque<Result<JobStatus, EngineError>>>>,
    /// Job ids passed to get_status, in order.
    status_queries: Arc<RwLock<Vec<String>>>,
    /// Job ids passed to cancel, in order.
    cancel_calls: Arc<RwLock<Vec<String>>>,
    cancelled_jobs: Arc<RwLock<HashSet<String>>>,
    /// Access mode per accepted job.
    jobs: Arc<RwLock<HashMap<String, AccessMode>>>,
    /// Outcomes returned for every job; overrides generated ones.
    outcomes: Arc<RwLock<Option<Vec<DocumentOutcome>>>>,
    /// Outcomes produced by simulated translation, by job id.
    generated_outcomes: Arc<RwLock<HashMap<String, Vec<DocumentOutcome>>>>,
    outcome_error: Arc<RwLock<Option<EngineError>>>,
    /// Blob names that fail to translate.
    failing_documents: Arc<RwLock<HashSet<String>>>,
    languages: Arc<RwLock<Vec<LanguageInfo>>>,
    formats: Arc<RwLock<Vec<FileFormat>>>,
    catalog_error: Arc<RwLock<Option<EngineError>>>,
    signed_uri_rejection: Arc<std::sync::RwLock<SignedUriRejection>>,
    /// Counter for generating job ids.
    job_counter: Arc<RwLock<u32>>,
    storage: Option<Arc<MockObjectStorage>>,
}

impl Default for MockTranslationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTranslationEngine {
    /// Create a mock engine supporting de, es and fr, and docx, pdf and txt.
    pub fn new() -> Self {
        Self {
            submitted: Arc::new(RwLock::new(Vec::new())),
            attempts: Arc::new(RwLock::new(Vec::new())),
            submit_errors: Arc::new(RwLock::new(VecDeque::new())),
            statuses: Arc::new(RwLock::new(VecDeque::new())),
            status_queries: Arc::new(RwLock::new(Vec::new())),
            cancel_calls: Arc::new(RwLock::new(Vec::new())),
            cancelled_jobs: Arc::new(RwLock::new(HashSet::new())),
            jobs: Arc::new(RwLock::new(HashMap::new())),
            outcomes: Arc::new(RwLock::new(None)),
            generated_outcomes: Arc::new(RwLock::new(HashMap::new())),
            outcome_error: Arc::new(RwLock::new(None)),
            failing_documents: Arc::new(RwLock::new(HashSet::new())),
            languages: Arc::new(RwLock::new(fixtures::languages(&["de", "es", "fr"]))),
            formats: Arc::new(RwLock::new(fixtures::document_formats())),
            catalog_error: Arc::new(RwLock::new(None)),
            signed_uri_rejection: Arc::new(std::sync::RwLock::new(SignedUriRejection::Never)),
            job_counter: Arc::new(RwLock::new(0)),
            storage: None,
        }
    }

    /// Translate into the given storage: source blobs are copied into target
    /// containers on submit and one outcome per document and target is generated.
    pub fn with_storage(mut self, storage: Arc<MockObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    // =========================================================================
    // Test setup
    // =========================================================================

    /// Queue a status for upcoming queries.
    pub async fn push_status(&self, status: JobStatus) {
        self.statuses.write().await.push_back(Ok(status));
    }

    /// Queue a failing status query.
    pub async fn push_status_error(&self, error: EngineError) {
        self.statuses.write().await.push_back(Err(error));
    }

    /// Fail the next submit with `error`.
    pub async fn fail_next_submit(&self, error: EngineError) {
        self.submit_errors.write().await.push_back(error);
    }

    /// Reject every submission that uses signed URIs.
    pub fn reject_signed_uris_at_submit(&self) {
        self.set_signed_uri_rejection(SignedUriRejection::AtSubmit);
    }

    /// Accept signed URIs at submit, then fail the job's validation.
    pub fn reject_signed_uris_at_validation(&self) {
        self.set_signed_uri_rejection(SignedUriRejection::AtValidation);
    }

    fn set_signed_uri_rejection(&self, rejection: SignedUriRejection) {
        if let Ok(mut current) = self.signed_uri_rejection.write() {
            *current = rejection;
        }
    }

    fn signed_uri_rejection(&self) -> SignedUriRejection {
        self.signed_uri_rejection
            .read()
            .map(|r| *r)
            .unwrap_or(SignedUriRejection::Never)
    }

    /// Return these outcomes for every job.
    pub async fn set_outcomes(&self, outcomes: Vec<DocumentOutcome>) {
        *self.outcomes.write().await = Some(outcomes);
    }

    /// Fail the outcome listing with `error`.
    pub async fn fail_outcomes(&self, error: EngineError) {
        *self.outcome_error.write().await = Some(error);
    }

    /// Make the document with this blob name fail in every language.
    pub async fn fail_document(&self, name: &str) {
        self.failing_documents.write().await.insert(name.to_string());
    }

    pub async fn set_languages(&self, languages: Vec<LanguageInfo>) {
        *self.languages.write().await = languages;
    }

    pub async fn set_formats(&self, formats: Vec<FileFormat>) {
        *self.formats.write().await = formats;
    }

    /// Fail the language and format catalogs with `error`.
    pub async fn fail_catalog(&self, error: EngineError) {
        *self.catalog_error.write().await = Some(error);
    }

    // =========================================================================
    // Test assertions
    // =========================================================================

    /// Requests the engine accepted.
    pub async fn submitted(&self) -> Vec<TranslationRequest> {
        self.submitted.read().await.clone()
    }

    /// Access mode of every submit attempt.
    pub async fn submit_attempts(&self) -> Vec<AccessMode> {
        self.attempts.read().await.clone()
    }

    pub async fn status_queries(&self) -> Vec<String> {
        self.status_queries.read().await.clone()
    }

    pub async fn cancel_calls(&self) -> Vec<String> {
        self.cancel_calls.read().await.clone()
    }

    // =========================================================================
    // Simulation
    // =========================================================================

    async fn next_job_id(&self) -> String {
        let mut counter = self.job_counter.write().await;
        *counter += 1;
        format!("job-{}", counter)
    }

    /// Copies each source blob into every target container.
    async fn translate(
        &self,
        storage: &MockObjectStorage,
        request: &TranslationRequest,
    ) -> Vec<DocumentOutcome> {
        let Some(source) = MockObjectStorage::container_from_uri(&request.source.uri) else {
            return Vec::new();
        };
        let failing: Vec<String> = self.failing_documents.read().await.iter().cloned().collect();
        let documents = storage.blob_names(source).await;

        let mut outcomes = Vec::new();
        for target in &request.targets {
            let Some(container) = MockObjectStorage::container_from_uri(&target.uri) else {
                continue;
            };
            let copied = storage.copy_blobs(source, container, &failing).await;

            for name in &documents {
                let source_path = blob_uri(&request.source.uri, name);
                let outcome = if copied.contains(name) {
                    let size = storage
                        .blob_content(container, name)
                        .await
                        .map(|c| c.len() as u64)
                        .unwrap_or(0);
                    DocumentOutcome {
                        source_path,
                        target_path: Some(blob_uri(&target.uri, name)),
                        target_language: target.language.clone(),
                        phase: JobPhase::Succeeded,
                        billed_units: size,
                        error: None,
                    }
                } else {
                    DocumentOutcome {
                        source_path,
                        target_path: None,
                        target_language: target.language.clone(),
                        phase: JobPhase::Failed,
                        billed_units: 0,
                        error: Some(ErrorInfo {
                            code: "InvalidRequest".to_string(),
                            message: "The document could not be translated".to_string(),
                            inner_code: Some("WrongDocumentEncoding".to_string()),
                        }),
                    }
                };
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    async fn default_status(&self, job_id: &str) -> JobStatus {
        let outcomes = self.outcomes_for(job_id).await;
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count() as u32;
        let total = outcomes.len() as u32;
        let mut status = fixtures::job_status(JobPhase::Succeeded, 0, Utc::now());
        status.counts = DocumentCounts {
            total,
            succeeded,
            failed: total - succeeded,
            ..Default::default()
        };
        status.billed_units = outcomes.iter().map(|o| o.billed_units).sum();
        status
    }

    async fn outcomes_for(&self, job_id: &str) -> Vec<DocumentOutcome> {
        if let Some(ref outcomes) = *self.outcomes.read().await {
            return outcomes.clone();
        }
        self.generated_outcomes
            .read()
            .await
            .get(job_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TranslationEngine for MockTranslationEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit_translation(
        &self,
        request: &TranslationRequest,
    ) -> Result<String, EngineError> {
        self.attempts.write().await.push(request.access_mode);

        if let Some(error) = self.submit_errors.write().await.pop_front() {
            return Err(error);
        }
        if request.access_mode == AccessMode::SignedUri
            && self.signed_uri_rejection() == SignedUriRejection::AtSubmit
        {
            return Err(fixtures::signed_uri_rejection());
        }

        let job_id = self.next_job_id().await;
        self.submitted.write().await.push(request.clone());
        self.jobs
            .write()
            .await
            .insert(job_id.clone(), request.access_mode);

        let rejected_later = request.access_mode == AccessMode::SignedUri
            && self.signed_uri_rejection() == SignedUriRejection::AtValidation;
        if let (Some(storage), false) = (self.storage.as_ref(), rejected_later) {
            let outcomes = self.translate(storage, request).await;
            self.generated_outcomes
                .write()
                .await
                .insert(job_id.clone(), outcomes);
        }
        Ok(job_id)
    }

    async fn get_status(&self, job_id: &str) -> Result<JobStatus, EngineError> {
        self.status_queries.write().await.push(job_id.to_string());

        if self.cancelled_jobs.read().await.contains(job_id) {
            let mut status = fixtures::job_status(JobPhase::Cancelled, 0, Utc::now());
            status.job_id = job_id.to_string();
            return Ok(status);
        }

        let signed = self.jobs.read().await.get(job_id).copied() == Some(AccessMode::SignedUri);
        if signed && self.signed_uri_rejection() == SignedUriRejection::AtValidation {
            let mut status = fixtures::job_status(JobPhase::ValidationFailed, 0, Utc::now());
            status.job_id = job_id.to_string();
            status.error = Some(ErrorInfo {
                code: "InvalidRequest".to_string(),
                message: "Cannot access source document location with the current permissions"
                    .to_string(),
                inner_code: Some(crate::engine::SIGNED_URI_REJECTION_CODE.to_string()),
            });
            return Ok(status);
        }

        let scripted = {
            let mut statuses = self.statuses.write().await;
            if statuses.len() > 1 {
                statuses.pop_front()
            } else {
                statuses.front().cloned()
            }
        };

        let mut status = match scripted {
            Some(result) => result?,
            None => self.default_status(job_id).await,
        };
        status.job_id = job_id.to_string();
        Ok(status)
    }

    async fn cancel(&self, job_id: &str) -> Result<(), EngineError> {
        self.cancel_calls.write().await.push(job_id.to_string());
        self.cancelled_jobs.write().await.insert(job_id.to_string());
        Ok(())
    }

    fn list_document_outcomes(&self, job_id: &str) -> DocumentOutcomeStream {
        let outcomes = Arc::clone(&self.outcomes);
        let generated = Arc::clone(&self.generated_outcomes);
        let error = Arc::clone(&self.outcome_error);
        let job_id = job_id.to_string();

        let items = async move {
            if let Some(e) = error.read().await.clone() {
                return vec![Err(e)];
            }
            let list = match *outcomes.read().await {
                Some(ref list) => list.clone(),
                None => generated
                    .read()
                    .await
                    .get(&job_id)
                    .cloned()
                    .unwrap_or_default(),
            };
            list.into_iter().map(Ok).collect()
        };
        stream::once(items)
            .flat_map(stream::iter)
            .boxed()
    }

    async fn list_supported_languages(&self) -> Result<Vec<LanguageInfo>, EngineError> {
        if let Some(e) = self.catalog_error.read().await.clone() {
            return Err(e);
        }
        Ok(self.languages.read().await.clone())
    }

    async fn list_supported_formats(&self) -> Result<Vec<FileFormat>, EngineError> {
        if let Some(e) = self.catalog_error.read().await.clone() {
            return Err(e);
        }
        Ok(self.formats.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SourceDescriptor;
    use crate::engine::TargetDescriptor;

    fn request(mode: AccessMode) -> TranslationRequest {
        TranslationRequest {
            source: SourceDescriptor::new("mock://src", "auto"),
            targets: vec![TargetDescriptor {
                uri: "mock://es".to_string(),
                language: "es".to_string(),
                category: None,
                glossaries: Vec::new(),
            }],
            access_mode: mode,
        }
    }

    #[tokio::test]
    async fn test_status_script_is_sticky() {
        let engine = MockTranslationEngine::new();
        engine
            .push_status(fixtures::job_status(JobPhase::Running, 1, fixtures::timestamp(0)))
            .await;
        engine
            .push_status(fixtures::job_status(JobPhase::Succeeded, 0, fixtures::timestamp(1)))
            .await;

        assert_eq!(engine.get_status("j").await.unwrap().phase, JobPhase::Running);
        assert_eq!(engine.get_status("j").await.unwrap().phase, JobPhase::Succeeded);
        let last = engine.get_status("j").await.unwrap();
        assert_eq!(last.phase, JobPhase::Succeeded);
        assert_eq!(last.job_id, "j");
    }

    #[tokio::test]
    async fn test_translate_copies_into_targets() {
        let storage = Arc::new(MockObjectStorage::new());
        storage.put_blob("src", "a.docx", b"abc".to_vec()).await;
        storage.put_blob("src", "b.docx", b"de".to_vec()).await;
        storage.add_container("es", Utc::now()).await;

        let engine = MockTranslationEngine::new().with_storage(storage.clone());
        engine.fail_document("b.docx").await;
        let job_id = engine
            .submit_translation(&request(AccessMode::DirectIdentity))
            .await
            .unwrap();

        assert_eq!(job_id, "job-1");
        assert_eq!(storage.blob_names("es").await, vec!["a.docx"]);

        let outcomes: Vec<_> = engine.list_document_outcomes(&job_id).collect().await;
        assert_eq!(outcomes.len(), 2);
        let status = engine.get_status(&job_id).await.unwrap();
        assert_eq!(status.counts.succeeded, 1);
        assert_eq!(status.counts.failed, 1);
        assert_eq!(status.billed_units, 3);
    }

    #[tokio::test]
    async fn test_signed_uri_rejection_at_submit() {
        let engine = MockTranslationEngine::new();
        engine.reject_signed_uris_at_submit();

        let err = engine
            .submit_translation(&request(AccessMode::SignedUri))
            .await
            .unwrap_err();
        assert!(err.is_signed_uri_rejection());
        assert!(engine
            .submit_translation(&request(AccessMode::DirectIdentity))
            .await
            .is_ok());
        assert_eq!(
            engine.submit_attempts().await,
            vec![AccessMode::SignedUri, AccessMode::DirectIdentity]
        );
        assert_eq!(engine.submitted().await.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_job_reports_cancelled() {
        let engine = MockTranslationEngine::new();
        engine
            .push_status(fixtures::job_status(JobPhase::Running, 2, fixtures::timestamp(0)))
            .await;
        engine.cancel("job-1").await.unwrap();
        assert_eq!(
            engine.get_status("job-1").await.unwrap().phase,
            JobPhase::Cancelled
        );
    }
}
