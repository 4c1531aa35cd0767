//! Run orchestrator implementation.
//!
//! Drives one translation run through a linear pipeline:
//! - Validation: inputs, languages and formats, before any container exists
//! - Staging: per-run containers, uploads, glossaries
//! - Translation: submission with signed URI failover, polling
//! - Retrieval: outcome aggregation, per-language downloads
//! - Cleanup: best-effort container deletion on every exit path

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::aggregate::{collect_outcomes, decide_success};
use crate::config::{Config, ConfigError};
use crate::engine::{
    GlossaryDescriptor, JobHandle, JobPhase, JobStatus, TranslationEngine, TranslationRequest,
    AUTO_DETECT,
};
use crate::events::{EventSink, RunEvent};
use crate::filter::{filter_by_extension, ExtensionSet};
use crate::metrics;
use crate::storage::{
    blob_uri, AccessMode, ContainerPermissions, ContainerSet, EphemeralStorageManager,
    ObjectStorage, StorageError,
};
use crate::submission::{build_request, final_status_error, SubmissionError, SubmissionMachine};
use crate::transfer::{TransferEngine, TransferSummary};

use super::config::OrchestratorConfig;
use super::types::{RunContext, RunError, RunOutcome, RunRequest};

/// Placeholder replaced by the target language in output templates.
pub const LANGUAGE_PLACEHOLDER: &str = "{lang}";

/// What a run accomplished so far. Filled in stage by stage.
#[derive(Debug, Default)]
struct RunProgress {
    containers: Option<ContainerSet>,
    uploaded: TransferSummary,
    downloaded: TransferSummary,
    billed_units: u64,
    documents_succeeded: usize,
    documents_failed: usize,
    output_dirs: BTreeMap<String, PathBuf>,
    discarded: Vec<PathBuf>,
    job: Option<JobHandle>,
}

/// Runs batch translations end to end.
pub struct RunOrchestrator {
    config: OrchestratorConfig,
    engine: Arc<dyn TranslationEngine>,
    containers: EphemeralStorageManager,
    transfers: TransferEngine,
    category: Option<String>,
    runs_started: AtomicU64,
}

impl RunOrchestrator {
    /// Create a new orchestrator.
    ///
    /// Fails only on invalid configuration.
    pub fn new(
        config: OrchestratorConfig,
        engine: Arc<dyn TranslationEngine>,
        storage: Arc<dyn ObjectStorage>,
        container_prefix: &str,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if container_prefix.is_empty() {
            return Err(ConfigError::MissingSetting(
                "storage.container_prefix".to_string(),
            ));
        }

        Ok(Self {
            containers: EphemeralStorageManager::new(Arc::clone(&storage), container_prefix),
            transfers: TransferEngine::new(storage, config.retry.clone()),
            config,
            engine,
            category: None,
            runs_started: AtomicU64::new(0),
        })
    }

    /// Create an orchestrator from the full application config.
    pub fn from_config(
        config: &Config,
        engine: Arc<dyn TranslationEngine>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.orchestrator.clone(),
            engine,
            storage,
            &config.storage.container_prefix,
        )?
        .with_category(config.engine.category.clone()))
    }

    /// Custom translator category applied to every target.
    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category.filter(|c| !c.is_empty());
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Runs one request without notifications or external cancellation.
    pub async fn run(&self, request: RunRequest) -> RunOutcome {
        self.run_with_context(request, RunContext::default()).await
    }

    /// Runs one request. Never fails: every problem ends up in the outcome.
    pub async fn run_with_context(&self, request: RunRequest, context: RunContext) -> RunOutcome {
        let run_id = context
            .run_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let events = match context.events {
            Some(tx) => EventSink::new(run_id.clone(), tx),
            None => EventSink::disabled(run_id.clone()),
        };
        let started_at = Utc::now();
        let start = Instant::now();
        info!(
            "Run {} started: {} paths into {:?}",
            run_id,
            request.paths.len(),
            request.target_languages
        );

        let mut progress = RunProgress::default();
        let result = self
            .execute(&request, &events, &context.cancel, &mut progress)
            .await;

        let preserve = request
            .preserve_containers
            .unwrap_or(self.config.preserve_containers);
        if let Some(ref set) = progress.containers {
            if preserve {
                info!("Run {} keeps containers {:?}", run_id, set.all_names());
            } else {
                let report = self.containers.delete_run_containers(set).await;
                if !report.failed.is_empty() {
                    warn!(
                        "Run {} left {} containers behind",
                        run_id,
                        report.failed.len()
                    );
                }
            }
        }

        let failure_reason = result.err().map(|e| e.to_string());
        let verdict = decide_success(failure_reason, progress.downloaded.files);
        if let Err(ref reason) = verdict {
            error!("Run {} failed: {}", run_id, reason);
            events
                .emit(RunEvent::ErrorsOccurred {
                    message: reason.clone(),
                })
                .await;
        } else {
            info!(
                "Run {} succeeded: {} files downloaded, {} units billed",
                run_id, progress.downloaded.files, progress.billed_units
            );
        }

        let label = if verdict.is_ok() { "success" } else { "failed" };
        metrics::RUNS_TOTAL.with_label_values(&[label]).inc();
        metrics::RUN_DURATION
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());
        metrics::BILLED_UNITS.inc_by(progress.billed_units);

        RunOutcome {
            run_id,
            success: verdict.is_ok(),
            failure_reason: verdict.err(),
            files_uploaded: progress.uploaded.files,
            bytes_uploaded: progress.uploaded.bytes,
            files_downloaded: progress.downloaded.files,
            bytes_downloaded: progress.downloaded.bytes,
            billed_units: progress.billed_units,
            documents_succeeded: progress.documents_succeeded,
            documents_failed: progress.documents_failed,
            output_dirs: progress.output_dirs,
            discarded: progress.discarded,
            job_id: progress.job.as_ref().map(|j| j.id.clone()),
            access_mode: progress.job.as_ref().map(|j| j.access_mode),
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn execute(
        &self,
        request: &RunRequest,
        events: &EventSink,
        cancel: &CancellationToken,
        progress: &mut RunProgress,
    ) -> Result<(), RunError> {
        // Validation. Nothing remote is created until every check passes.
        let files = expand_paths(&request.paths).await?;
        if files.is_empty() {
            return Err(RunError::NoFiles);
        }
        let languages = dedupe_languages(&request.target_languages);
        if languages.is_empty() {
            return Err(RunError::NoTargetLanguage);
        }
        self.validate_languages(&request.source_language, &languages)
            .await?;
        let glossaries = describe_glossaries(&request.glossaries).await?;

        let allowed = self.supported_extensions().await?;
        let filtered = filter_by_extension(Some(&files), &allowed);
        if !filtered.discarded.is_empty() {
            info!(
                "Run {} discards {} files with unsupported extensions",
                events.run_id(),
                filtered.discarded.len()
            );
            events
                .emit(RunEvent::FilesDiscarded {
                    paths: filtered.discarded.clone(),
                })
                .await;
        }
        progress.discarded = filtered.discarded;
        let accepted = filtered.accepted;
        if accepted.is_empty() {
            return Err(RunError::NoSupportedFiles {
                discarded: progress.discarded.len(),
            });
        }

        self.maybe_sweep();

        // Staging. The set is recorded before creation so cleanup covers partial creates.
        let set = self
            .containers
            .plan_run_containers(&languages, !glossaries.is_empty());
        progress.containers = Some(set.clone());
        let pending = self.containers.create_run_containers(&set).await?;

        events
            .emit(RunEvent::UploadStarted {
                files: accepted.len(),
            })
            .await;
        let uploaded = self
            .transfers
            .upload_all(&accepted, &set.source, self.config.max_concurrent_transfers)
            .await;
        let created = pending.join().await;
        progress.uploaded = match uploaded {
            Ok(summary) => summary,
            Err(e) => {
                progress.uploaded = e.completed();
                return Err(e.into());
            }
        };
        created?;
        events
            .emit(RunEvent::UploadCompleted {
                count: progress.uploaded.files,
                bytes: progress.uploaded.bytes,
            })
            .await;

        if let Some(ref container) = set.glossary {
            let paths: Vec<PathBuf> = glossaries.iter().map(|(path, _)| path.clone()).collect();
            self.transfers
                .upload_all(&paths, container, self.config.max_concurrent_transfers)
                .await?;
        }

        // Translation.
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        let mut machine = SubmissionMachine::new(
            Arc::clone(&self.engine),
            self.config.poll_settings(),
            cancel.clone(),
            events.clone(),
        );
        let status = self
            .submit_and_poll(&mut machine, &set, request, &glossaries, progress)
            .await?;
        check_final_status(&status)?;

        // Retrieval.
        let job_id = status.job_id.clone();
        let outcomes = collect_outcomes(self.engine.list_document_outcomes(&job_id))
            .await
            .map_err(RunError::Outcomes)?;
        progress.billed_units = outcomes.billed_units.max(status.billed_units);
        progress.documents_succeeded = outcomes.succeeded;
        progress.documents_failed = outcomes.failed;
        if let Some(report) = outcomes.error_report() {
            warn!(
                "Run {}: {} documents failed to translate",
                events.run_id(),
                outcomes.failed
            );
            events
                .emit(RunEvent::ErrorsOccurred { message: report })
                .await;
        }

        let first_input = accepted.first().map(PathBuf::as_path);
        for target in &set.targets {
            let dir = resolve_output_dir(
                request.output_template.as_deref(),
                first_input,
                &target.language,
                set.targets.len() > 1,
            );
            let downloaded = self
                .transfers
                .download_all(
                    &target.name,
                    &dir,
                    &target.language,
                    self.config.max_concurrent_transfers,
                )
                .await;
            match downloaded {
                Ok(summary) => progress.downloaded.merge(summary),
                Err(e) => {
                    progress.downloaded.merge(e.completed());
                    progress.output_dirs.insert(target.language.clone(), dir);
                    return Err(e.into());
                }
            }
            progress.output_dirs.insert(target.language.clone(), dir);
        }
        events
            .emit(RunEvent::DownloadCompleted {
                count: progress.downloaded.files,
                bytes: progress.downloaded.bytes,
            })
            .await;

        Ok(())
    }

    /// Submits with signed URIs, falling back once to direct identity when the
    /// engine rejects them at submission or while validating the job.
    async fn submit_and_poll(
        &self,
        machine: &mut SubmissionMachine,
        set: &ContainerSet,
        request: &RunRequest,
        glossaries: &[(PathBuf, String)],
        progress: &mut RunProgress,
    ) -> Result<JobStatus, RunError> {
        let mut mode = AccessMode::SignedUri;
        loop {
            let translation =
                self.translation_request(set, mode, &request.source_language, glossaries)?;

            match machine.submit(&translation).await {
                Ok(handle) => progress.job = Some(handle),
                Err(e) if e.is_signed_uri_rejection() && mode == AccessMode::SignedUri => {
                    mode = self.fail_over(&e.to_string());
                    continue;
                }
                Err(SubmissionError::Cancelled) => return Err(RunError::Cancelled),
                Err(e) => return Err(RunError::Submission(e)),
            }

            match machine.poll().await {
                Ok(status)
                    if status.phase == JobPhase::ValidationFailed
                        && mode == AccessMode::SignedUri
                        && status
                            .error
                            .as_ref()
                            .is_some_and(|e| e.is_signed_uri_rejection()) =>
                {
                    let reason = status
                        .error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_default();
                    mode = self.fail_over(&reason);
                }
                Ok(status) => return Ok(status),
                Err(SubmissionError::Cancelled) => {
                    machine.cancel().await;
                    return Err(RunError::Cancelled);
                }
                Err(e) => return Err(RunError::Polling(e)),
            }
        }
    }

    fn fail_over(&self, reason: &str) -> AccessMode {
        warn!(
            "Engine rejected signed URIs ({}), resubmitting with direct identity",
            reason
        );
        metrics::AUTH_FAILOVERS.inc();
        AccessMode::DirectIdentity
    }

    fn translation_request(
        &self,
        set: &ContainerSet,
        mode: AccessMode,
        source_language: &str,
        glossaries: &[(PathBuf, String)],
    ) -> Result<TranslationRequest, StorageError> {
        let ttl = self.config.signed_uri_ttl();
        let source_uri = self.containers.generate_access_uri(
            &set.source,
            mode,
            ContainerPermissions::SOURCE,
            ttl,
        )?;

        let targets = set
            .targets
            .iter()
            .map(|t| {
                let uri = self.containers.generate_access_uri(
                    &t.name,
                    mode,
                    ContainerPermissions::TARGET,
                    ttl,
                )?;
                Ok((t.language.clone(), uri))
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        let glossary_descriptors = match set.glossary {
            Some(ref container) => {
                let container_uri = self.containers.generate_access_uri(
                    container,
                    mode,
                    ContainerPermissions::READ,
                    ttl,
                )?;
                glossaries
                    .iter()
                    .filter_map(|(path, format)| {
                        let name = path.file_name()?.to_string_lossy().to_string();
                        Some(GlossaryDescriptor {
                            uri: blob_uri(&container_uri, &name),
                            format: format.clone(),
                        })
                    })
                    .collect()
            }
            None => Vec::new(),
        };

        Ok(build_request(
            source_uri,
            source_language,
            targets,
            &glossary_descriptors,
            self.category.as_deref(),
            mode,
        ))
    }

    async fn validate_languages(
        &self,
        source_language: &str,
        targets: &[String],
    ) -> Result<(), RunError> {
        let catalog = self
            .engine
            .list_supported_languages()
            .await
            .map_err(|source| RunError::Catalog {
                what: "supported languages",
                source,
            })?;
        let known: HashSet<String> = catalog.iter().map(|l| l.code.to_lowercase()).collect();

        if let Some(unknown) = targets.iter().find(|t| !known.contains(&t.to_lowercase())) {
            return Err(RunError::UnknownTargetLanguage(unknown.clone()));
        }

        let source = source_language.trim();
        if !source.is_empty()
            && !source.eq_ignore_ascii_case(AUTO_DETECT)
            && !known.contains(&source.to_lowercase())
        {
            return Err(RunError::UnknownSourceLanguage(source.to_string()));
        }
        Ok(())
    }

    async fn supported_extensions(&self) -> Result<ExtensionSet, RunError> {
        let formats = self
            .engine
            .list_supported_formats()
            .await
            .map_err(|source| RunError::Catalog {
                what: "supported formats",
                source,
            })?;
        Ok(ExtensionSet::new(
            formats.iter().flat_map(|f| f.file_extensions.iter()),
        ))
    }

    /// Starts a detached sweep of abandoned containers when this run is sampled.
    fn maybe_sweep(&self) {
        let run_number = self.runs_started.fetch_add(1, Ordering::Relaxed) + 1;
        if !self.config.sweep_policy().should_sweep(run_number) {
            return;
        }

        debug!("Run #{} triggers an abandoned container sweep", run_number);
        let manager = self.containers.clone();
        let retention = self.config.retention();
        tokio::spawn(async move {
            manager.sweep_abandoned(retention).await;
        });
    }
}

/// Maps a finished job to a run error unless it succeeded.
fn check_final_status(status: &JobStatus) -> Result<(), RunError> {
    let detail = || {
        final_status_error(status)
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no error details reported".to_string())
    };
    match status.phase {
        JobPhase::Succeeded => Ok(()),
        JobPhase::ValidationFailed => Err(RunError::ValidationFailed(detail())),
        JobPhase::Cancelled => Err(RunError::Cancelled),
        _ => Err(RunError::TranslationFailed(detail())),
    }
}

/// Expands directories to their immediate files, sorted by name.
async fn expand_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>, RunError> {
    let mut files = Vec::new();
    for path in paths {
        let metadata = tokio::fs::metadata(path).await.map_err(io_error(path))?;
        if !metadata.is_dir() {
            files.push(path.clone());
            continue;
        }

        let mut children = Vec::new();
        let mut entries = tokio::fs::read_dir(path).await.map_err(io_error(path))?;
        while let Some(entry) = entries.next_entry().await.map_err(io_error(path))? {
            let file_type = entry.file_type().await.map_err(io_error(&entry.path()))?;
            if file_type.is_file() {
                children.push(entry.path());
            }
        }
        children.sort();
        files.extend(children);
    }
    Ok(files)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> RunError {
    let path = path.to_path_buf();
    move |source| RunError::Io { path, source }
}

/// Trims, drops empties and removes case-insensitive duplicates, keeping order.
fn dedupe_languages(languages: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    languages
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && seen.insert(l.to_lowercase()))
        .map(String::from)
        .collect()
}

/// Checks each glossary exists and pairs it with the engine's format name.
async fn describe_glossaries(paths: &[PathBuf]) -> Result<Vec<(PathBuf, String)>, RunError> {
    let mut glossaries = Vec::with_capacity(paths.len());
    for path in paths {
        tokio::fs::metadata(path)
            .await
            .map_err(|source| RunError::Io {
                path: path.clone(),
                source,
            })?;
        let format =
            glossary_format(path).ok_or_else(|| RunError::UnsupportedGlossary(path.clone()))?;
        glossaries.push((path.clone(), format.to_string()));
    }
    Ok(glossaries)
}

fn glossary_format(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    match ext.as_str() {
        "tsv" | "tab" => Some("TSV"),
        "csv" => Some("CSV"),
        "xlf" | "xliff" => Some("XLIFF"),
        _ => None,
    }
}

/// Output directory for one language.
///
/// A template containing `{lang}` is expanded per language. A template without it
/// is used as is for a single language and gets a language subdirectory otherwise.
/// Without a template, output goes to a language directory next to the first input.
pub fn resolve_output_dir(
    template: Option<&str>,
    first_input: Option<&Path>,
    language: &str,
    multiple_languages: bool,
) -> PathBuf {
    match template.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) if t.contains(LANGUAGE_PLACEHOLDER) => {
            PathBuf::from(t.replace(LANGUAGE_PLACEHOLDER, language))
        }
        Some(t) if multiple_languages => PathBuf::from(t).join(language),
        Some(t) => PathBuf::from(t),
        None => first_input
            .and_then(Path::parent)
            .unwrap_or_else(|| Path::new("."))
            .join(language),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_output_dir() {
        let input = Path::new("/docs/report.docx");
        assert_eq!(
            resolve_output_dir(Some("/out/{lang}/final"), Some(input), "es", true),
            PathBuf::from("/out/es/final")
        );
        assert_eq!(
            resolve_output_dir(Some("/out"), Some(input), "es", true),
            PathBuf::from("/out/es")
        );
        assert_eq!(
            resolve_output_dir(Some("/out"), Some(input), "es", false),
            PathBuf::from("/out")
        );
        assert_eq!(
            resolve_output_dir(None, Some(input), "fr", false),
            PathBuf::from("/docs/fr")
        );
        assert_eq!(
            resolve_output_dir(Some("  "), None, "de", false),
            PathBuf::from("./de")
        );
    }

    #[test]
    fn test_dedupe_languages() {
        let input = vec![
            "es".to_string(),
            " fr ".to_string(),
            "ES".to_string(),
            "".to_string(),
        ];
        assert_eq!(dedupe_languages(&input), vec!["es", "fr"]);
    }

    #[test]
    fn test_glossary_format() {
        assert_eq!(glossary_format(Path::new("terms.TSV")), Some("TSV"));
        assert_eq!(glossary_format(Path::new("terms.xliff")), Some("XLIFF"));
        assert_eq!(glossary_format(Path::new("terms.docx")), None);
    }

    #[test]
    fn test_check_final_status() {
        let ts = fixtures::timestamp(0);
        assert!(check_final_status(&fixtures::job_status(JobPhase::Succeeded, 0, ts)).is_ok());

        let mut failed = fixtures::job_status(JobPhase::ValidationFailed, 0, ts);
        failed.error = Some(fixtures::error_info("InvalidRequest", "No documents found"));
        let reason = check_final_status(&failed).unwrap_err().to_string();
        assert_eq!(reason, "Validation failed: InvalidRequest: No documents found");

        let reason = check_final_status(&fixtures::job_status(JobPhase::Failed, 0, ts))
            .unwrap_err()
            .to_string();
        assert!(reason.starts_with("Translation failed"));
    }

    #[tokio::test]
    async fn test_expand_paths_is_shallow_and_sorted() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.docx"), b"b").unwrap();
        std::fs::write(dir.path().join("a.docx"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.docx"), b"c").unwrap();
        let single = dir.path().join("nested").join("c.docx");

        let files = expand_paths(&[dir.path().to_path_buf(), single.clone()])
            .await
            .unwrap();

        assert_eq!(
            files,
            vec![dir.path().join("a.docx"), dir.path().join("b.docx"), single]
        );
    }

    #[tokio::test]
    async fn test_expand_missing_path_names_it() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.docx");
        let err = expand_paths(&[missing]).await.unwrap_err();
        assert!(err.to_string().contains("missing.docx"));
    }
}
