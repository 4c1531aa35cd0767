//! Run lifecycle integration tests.
//!
//! These tests drive complete runs through the orchestrator with the in-memory
//! storage and engine:
//! validate -> create containers -> upload -> submit -> poll -> download -> cleanup

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use doctr_core::{
    storage::AccessMode,
    testing::{fixtures, MockObjectStorage, MockTranslationEngine},
    JobPhase, OrchestratorConfig, RetryConfig, RunContext, RunEvent, RunEventEnvelope,
    RunOrchestrator, RunOutcome, RunRequest, StorageError, NO_OUTPUT_REASON,
};

/// Test helper wiring an orchestrator to mocks and temporary directories.
struct TestHarness {
    orchestrator: RunOrchestrator,
    storage: Arc<MockObjectStorage>,
    engine: Arc<MockTranslationEngine>,
    input_dir: TempDir,
    output_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(fast_config())
    }

    fn with_config(config: OrchestratorConfig) -> Self {
        let storage = Arc::new(MockObjectStorage::new());
        let engine = Arc::new(MockTranslationEngine::new().with_storage(storage.clone()));
        let orchestrator = RunOrchestrator::new(config, engine.clone(), storage.clone(), "doctr")
            .expect("valid orchestrator config");

        Self {
            orchestrator,
            storage,
            engine,
            input_dir: TempDir::new().expect("Failed to create input dir"),
            output_dir: TempDir::new().expect("Failed to create output dir"),
        }
    }

    /// Writes input files of the given sizes and returns their paths.
    fn write_inputs(&self, files: &[(&str, usize)]) -> Vec<PathBuf> {
        files
            .iter()
            .map(|(name, size)| {
                let path = self.input_dir.path().join(name);
                std::fs::write(&path, vec![b'a'; *size]).expect("Failed to write input");
                path
            })
            .collect()
    }

    fn output_template(&self) -> String {
        format!("{}/{{lang}}", self.output_dir.path().display())
    }

    fn request(&self, paths: Vec<PathBuf>, languages: &[&str]) -> RunRequest {
        RunRequest::new(paths, languages.iter().copied())
            .with_output_template(self.output_template())
    }

    /// Runs and returns the outcome with every event the run emitted.
    async fn run(&self, request: RunRequest) -> (RunOutcome, Vec<RunEvent>) {
        self.run_with(request, RunContext::default()).await
    }

    async fn run_with(
        &self,
        request: RunRequest,
        mut context: RunContext,
    ) -> (RunOutcome, Vec<RunEvent>) {
        let (tx, mut rx) = mpsc::channel::<RunEventEnvelope>(1024);
        context.events = Some(tx);
        let outcome = self.orchestrator.run_with_context(request, context).await;

        let mut events = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            assert_eq!(envelope.run_id, outcome.run_id);
            events.push(envelope.event);
        }
        (outcome, events)
    }
}

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        poll_interval_ms: 5,
        status_retry_delay_ms: 1,
        sweep_every_n_runs: 0,
        retry: RetryConfig {
            max_attempts: 2,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        },
        ..Default::default()
    }
}

fn reason(outcome: &RunOutcome) -> &str {
    outcome.failure_reason.as_deref().unwrap_or_default()
}

fn count<F: Fn(&RunEvent) -> bool>(events: &[RunEvent], predicate: F) -> usize {
    events.iter().filter(|e| predicate(e)).count()
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

// =============================================================================
// Successful runs
// =============================================================================

#[tokio::test]
async fn test_unsupported_extension_is_discarded() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 10), ("b.pdf", 20), ("c.exe", 5)]);

    let (outcome, events) = harness.run(harness.request(files.clone(), &["es"])).await;

    assert!(outcome.success, "run failed: {:?}", outcome.failure_reason);
    assert_eq!(outcome.failure_reason, None);
    assert_eq!(outcome.files_uploaded, 2);
    assert_eq!(outcome.discarded, vec![files[2].clone()]);
    assert_eq!(outcome.files_downloaded, 2);

    let discarded: Vec<&Vec<PathBuf>> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::FilesDiscarded { paths } => Some(paths),
            _ => None,
        })
        .collect();
    assert_eq!(discarded, vec![&vec![files[2].clone()]]);

    let out = harness.output_dir.path().join("es");
    assert_eq!(files_in(&out), vec!["a.docx", "b.pdf"]);
    assert_eq!(outcome.output_dirs.get("es"), Some(&out));
}

#[tokio::test]
async fn test_reported_counts_match_transferred_sizes() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 10), ("b.txt", 20)]);

    let (outcome, events) = harness.run(harness.request(files, &["es", "fr"])).await;

    assert!(outcome.success);
    assert_eq!(outcome.files_uploaded, 2);
    assert_eq!(outcome.bytes_uploaded, 30);
    assert_eq!(outcome.files_downloaded, 4);
    assert_eq!(outcome.bytes_downloaded, 60);
    assert_eq!(outcome.documents_succeeded, 4);
    assert_eq!(outcome.billed_units, 60);
    assert_eq!(outcome.access_mode, Some(AccessMode::SignedUri));

    assert!(events.contains(&RunEvent::UploadStarted { files: 2 }));
    assert!(events.contains(&RunEvent::UploadCompleted {
        count: 2,
        bytes: 30
    }));
    assert!(events.contains(&RunEvent::DownloadCompleted {
        count: 4,
        bytes: 60
    }));

    for lang in ["es", "fr"] {
        let dir = harness.output_dir.path().join(lang);
        assert_eq!(files_in(&dir), vec!["a.docx", "b.txt"]);
    }
}

#[tokio::test]
async fn test_containers_are_deleted_after_success() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 3)]);

    let (outcome, _) = harness.run(harness.request(files, &["es", "fr"])).await;

    assert!(outcome.success);
    let created = harness.storage.created_containers().await;
    assert_eq!(created.len(), 3);
    let mut deleted = harness.storage.deleted_containers().await;
    deleted.sort();
    let mut expected = created.clone();
    expected.sort();
    assert_eq!(deleted, expected);
    assert!(harness.storage.container_names().await.is_empty());
}

#[tokio::test]
async fn test_three_polls_emit_one_status_change() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 3)]);
    let ts = fixtures::timestamp(0);
    harness
        .engine
        .push_status(fixtures::job_status(JobPhase::Running, 1, ts))
        .await;
    harness
        .engine
        .push_status(fixtures::job_status(JobPhase::Running, 1, ts))
        .await;
    harness
        .engine
        .push_status(fixtures::job_status(JobPhase::Succeeded, 0, ts))
        .await;

    let (outcome, events) = harness.run(harness.request(files, &["es"])).await;

    assert!(outcome.success, "run failed: {:?}", outcome.failure_reason);
    assert_eq!(harness.engine.status_queries().await.len(), 3);
    assert_eq!(count(&events, |e| matches!(e, RunEvent::Heartbeat { .. })), 3);
    assert_eq!(
        count(&events, |e| matches!(e, RunEvent::StatusChanged { .. })),
        1
    );
}

#[tokio::test]
async fn test_partial_document_failure_keeps_run_successful() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 4), ("b.docx", 4)]);
    harness.engine.fail_document("b.docx").await;

    let (outcome, events) = harness.run(harness.request(files, &["es"])).await;

    assert!(outcome.success);
    assert_eq!(outcome.documents_succeeded, 1);
    assert_eq!(outcome.documents_failed, 1);
    assert_eq!(outcome.files_downloaded, 1);

    let reports: Vec<&String> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::ErrorsOccurred { message } => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("b.docx (es)"));
    assert!(reports[0].contains("[WrongDocumentEncoding]"));
}

#[tokio::test]
async fn test_directory_input_and_default_output() {
    let harness = TestHarness::new();
    harness.write_inputs(&[("a.docx", 2), ("b.txt", 2)]);

    let request = RunRequest::new([harness.input_dir.path()], ["fr"]);
    let (outcome, _) = harness.run(request).await;

    assert!(outcome.success, "run failed: {:?}", outcome.failure_reason);
    let expected = harness.input_dir.path().join("fr");
    assert_eq!(outcome.output_dirs.get("fr"), Some(&expected));
    assert_eq!(files_in(&expected), vec!["a.docx", "b.txt"]);
}

#[tokio::test]
async fn test_glossary_is_uploaded_and_attached() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 2)]);
    let glossary_dir = TempDir::new().unwrap();
    let glossary = glossary_dir.path().join("terms.tsv");
    std::fs::write(&glossary, "hello\thola\n").unwrap();

    let request = harness.request(files, &["es"]).with_glossaries([glossary]);
    let (outcome, _) = harness.run(request).await;

    assert!(outcome.success);
    let submitted = harness.engine.submitted().await;
    let glossaries = &submitted[0].targets[0].glossaries;
    assert_eq!(glossaries.len(), 1);
    assert_eq!(glossaries[0].format, "TSV");
    assert!(glossaries[0].uri.contains("terms.tsv"));

    let created = harness.storage.created_containers().await;
    assert_eq!(created.len(), 3);
    assert!(created.iter().any(|name| name.ends_with("gls")));
    assert_eq!(harness.storage.deleted_containers().await.len(), 3);
}

#[tokio::test]
async fn test_preserved_containers_are_kept() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 2)]);
    let mut request = harness.request(files, &["es"]);
    request.preserve_containers = Some(true);

    let (outcome, _) = harness.run(request).await;

    assert!(outcome.success);
    assert!(harness.storage.delete_calls().await.is_empty());
    assert_eq!(harness.storage.container_names().await.len(), 2);
}

// =============================================================================
// Signed URI failover
// =============================================================================

#[tokio::test]
async fn test_submit_rejection_fails_over_once() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 5)]);
    harness.engine.reject_signed_uris_at_submit();

    let (outcome, _) = harness.run(harness.request(files, &["es"])).await;

    assert!(outcome.success, "run failed: {:?}", outcome.failure_reason);
    assert_eq!(
        harness.engine.submit_attempts().await,
        vec![AccessMode::SignedUri, AccessMode::DirectIdentity]
    );
    assert_eq!(outcome.access_mode, Some(AccessMode::DirectIdentity));
    assert_eq!(outcome.job_id.as_deref(), Some("job-1"));

    let submitted = harness.engine.submitted().await;
    assert_eq!(submitted.len(), 1);
    assert!(!submitted[0].source.uri.contains('?'));
    assert!(harness
        .engine
        .status_queries()
        .await
        .iter()
        .all(|id| id == "job-1"));
}

#[tokio::test]
async fn test_validation_rejection_fails_over_once() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 5)]);
    harness.engine.reject_signed_uris_at_validation();

    let (outcome, _) = harness.run(harness.request(files, &["es"])).await;

    assert!(outcome.success, "run failed: {:?}", outcome.failure_reason);
    assert_eq!(
        harness.engine.submit_attempts().await,
        vec![AccessMode::SignedUri, AccessMode::DirectIdentity]
    );
    assert_eq!(outcome.job_id.as_deref(), Some("job-2"));
    assert_eq!(outcome.access_mode, Some(AccessMode::DirectIdentity));

    let queries = harness.engine.status_queries().await;
    assert_eq!(queries.first().map(String::as_str), Some("job-1"));
    assert!(queries[1..].iter().all(|id| id == "job-2"));
}

#[tokio::test]
async fn test_other_submit_rejection_is_not_retried() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 5)]);
    harness
        .engine
        .fail_next_submit(doctr_core::EngineError::Rejected {
            status: 400,
            code: "InvalidRequest".to_string(),
            inner_code: Some("InvalidTargetDocumentAccessLevel".to_string()),
            message: "Target container is not writable".to_string(),
        })
        .await;

    let (outcome, _) = harness.run(harness.request(files, &["es"])).await;

    assert!(!outcome.success);
    assert!(reason(&outcome).contains("InvalidRequest: Target container is not writable"));
    assert_eq!(harness.engine.submit_attempts().await.len(), 1);
    assert_eq!(harness.storage.delete_calls().await.len(), 2);
}

// =============================================================================
// Failed runs
// =============================================================================

#[tokio::test]
async fn test_empty_input_fails_without_containers() {
    let harness = TestHarness::new();

    let request = RunRequest::new([harness.input_dir.path()], ["es"]);
    let (outcome, events) = harness.run(request).await;

    assert!(!outcome.success);
    assert!(reason(&outcome).contains("no files"));
    assert!(harness.storage.created_containers().await.is_empty());
    assert!(events.contains(&RunEvent::ErrorsOccurred {
        message: reason(&outcome).to_string()
    }));
}

#[tokio::test]
async fn test_unknown_target_language_creates_nothing() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 5)]);

    let (outcome, _) = harness.run(harness.request(files, &["es", "xx"])).await;

    assert!(!outcome.success);
    assert_eq!(reason(&outcome), "Unknown target language: xx");
    assert!(harness.storage.created_containers().await.is_empty());
    assert!(harness.engine.submit_attempts().await.is_empty());
}

#[tokio::test]
async fn test_unknown_source_language_creates_nothing() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 5)]);

    let request = harness.request(files, &["es"]).with_source_language("tlh");
    let (outcome, _) = harness.run(request).await;

    assert!(!outcome.success);
    assert!(reason(&outcome).contains("tlh"));
    assert!(harness.storage.created_containers().await.is_empty());
}

#[tokio::test]
async fn test_only_unsupported_files() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("setup.exe", 5)]);

    let (outcome, _) = harness.run(harness.request(files.clone(), &["es"])).await;

    assert!(!outcome.success);
    assert_eq!(outcome.discarded, files);
    assert!(harness.storage.created_containers().await.is_empty());
}

#[tokio::test]
async fn test_missing_input_names_path() {
    let harness = TestHarness::new();
    let missing = harness.input_dir.path().join("ghost.docx");

    let (outcome, _) = harness.run(harness.request(vec![missing], &["es"])).await;

    assert!(!outcome.success);
    assert!(reason(&outcome).contains("ghost.docx"));
}

#[tokio::test]
async fn test_engine_validation_failure_deletes_all_containers() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 5)]);
    let mut status = fixtures::job_status(JobPhase::ValidationFailed, 0, fixtures::timestamp(0));
    status.error = Some(fixtures::error_info(
        "InvalidRequest",
        "No documents found in the source location",
    ));
    harness.engine.push_status(status).await;

    let (outcome, _) = harness.run(harness.request(files, &["es", "fr"])).await;

    assert!(!outcome.success);
    assert_eq!(
        reason(&outcome),
        "Validation failed: InvalidRequest: No documents found in the source location"
    );
    assert_eq!(harness.engine.submit_attempts().await.len(), 1);
    assert_eq!(harness.storage.delete_calls().await.len(), 3);
    assert_eq!(harness.storage.deleted_containers().await.len(), 3);
    assert_eq!(outcome.files_downloaded, 0);
}

#[tokio::test]
async fn test_upload_failure_cleans_up_once() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 5), ("b.docx", 5)]);
    harness
        .storage
        .fail_upload("b.docx", StorageError::InvalidName("b.docx".into()))
        .await;

    let (outcome, _) = harness.run(harness.request(files, &["es", "fr"])).await;

    assert!(!outcome.success);
    assert!(reason(&outcome).contains("b.docx"));
    assert!(harness.engine.submit_attempts().await.is_empty());

    let mut calls = harness.storage.delete_calls().await;
    assert_eq!(calls.len(), 3);
    calls.dedup();
    assert_eq!(calls.len(), 3);
}

#[tokio::test]
async fn test_all_documents_failing_means_no_output() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 5)]);
    harness.engine.fail_document("a.docx").await;

    let (outcome, _) = harness.run(harness.request(files, &["es"])).await;

    assert!(!outcome.success);
    assert_eq!(reason(&outcome), NO_OUTPUT_REASON);
    assert_eq!(outcome.documents_failed, 1);
}

#[tokio::test]
async fn test_deletion_errors_do_not_flip_success() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 5)]);
    harness.storage.fail_all_deletions();

    let (outcome, _) = harness.run(harness.request(files, &["es", "fr"])).await;

    assert!(outcome.success);
    assert_eq!(harness.storage.delete_calls().await.len(), 3);
    assert!(harness.storage.deleted_containers().await.is_empty());
}

#[tokio::test]
async fn test_cancellation_stops_polling_and_cleans_up() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 5)]);
    harness
        .engine
        .push_status(fixtures::job_status(JobPhase::Running, 1, fixtures::timestamp(0)))
        .await;

    let context = RunContext::default();
    let cancel = context.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let (outcome, _) = harness
        .run_with(harness.request(files, &["es"]), context)
        .await;

    assert!(!outcome.success);
    assert_eq!(reason(&outcome), "Run cancelled");
    assert_eq!(harness.engine.cancel_calls().await, vec!["job-1"]);
    assert_eq!(harness.storage.deleted_containers().await.len(), 2);
}

#[tokio::test]
async fn test_catalog_failure_is_reported() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 5)]);
    harness
        .engine
        .fail_catalog(doctr_core::EngineError::Unavailable("503".into()))
        .await;

    let (outcome, _) = harness.run(harness.request(files, &["es"])).await;

    assert!(!outcome.success);
    assert!(reason(&outcome).contains("supported languages"));
    assert!(harness.storage.created_containers().await.is_empty());
}

#[tokio::test]
async fn test_partial_upload_counts_survive_failure() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 10), ("b.docx", 20), ("c.docx", 30)]);
    harness
        .storage
        .fail_upload("b.docx", StorageError::InvalidName("b.docx".into()))
        .await;

    let (outcome, _) = harness.run(harness.request(files, &["es"])).await;

    assert!(!outcome.success);
    assert!(reason(&outcome).contains("1 of 3 transfers failed"));
    assert_eq!(outcome.files_uploaded, 2);
    assert_eq!(outcome.bytes_uploaded, 40);
    assert_eq!(outcome.files_downloaded, 0);
}

// =============================================================================
// Notifications and housekeeping
// =============================================================================

#[tokio::test]
async fn test_unread_event_channel_does_not_stall_run() {
    let harness = TestHarness::new();
    let files = harness.write_inputs(&[("a.docx", 5), ("b.txt", 5)]);
    let (tx, _rx) = mpsc::channel::<RunEventEnvelope>(1);
    let context = RunContext::with_events(tx);

    let outcome = tokio::time::timeout(
        Duration::from_secs(3),
        harness
            .orchestrator
            .run_with_context(harness.request(files, &["es", "fr"]), context),
    )
    .await
    .expect("run must finish while nobody reads its events");

    assert!(outcome.success, "run failed: {:?}", outcome.failure_reason);
    assert!(harness.storage.container_names().await.is_empty());
}

#[tokio::test]
async fn test_sampled_run_sweeps_abandoned_containers() {
    let harness = TestHarness::with_config(OrchestratorConfig {
        sweep_every_n_runs: 1,
        ..fast_config()
    });
    let abandoned = "doctr0123456789absrc";
    let recent = "doctrfedcba987654src";
    harness
        .storage
        .add_container(abandoned, fixtures::timestamp(0))
        .await;
    harness
        .storage
        .add_container(recent, chrono::Utc::now())
        .await;
    harness
        .storage
        .add_container("doctr-notes", fixtures::timestamp(0))
        .await;
    let files = harness.write_inputs(&[("a.docx", 5)]);

    let (outcome, _) = harness.run(harness.request(files, &["es"])).await;
    assert!(outcome.success, "run failed: {:?}", outcome.failure_reason);

    // The sweep is detached from the run
    let mut swept = false;
    for _ in 0..200 {
        if !harness.storage.has_container(abandoned).await {
            swept = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(swept, "abandoned container was never swept");
    assert!(harness.storage.has_container(recent).await);
    assert!(harness.storage.has_container("doctr-notes").await);
    assert_eq!(
        harness.storage.container_names().await,
        vec!["doctr-notes".to_string(), recent.to_string()]
    );
}
