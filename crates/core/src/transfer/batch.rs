//! Bounded-concurrency batch uploads and downloads.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::metrics;
use crate::storage::{BlobInfo, ObjectStorage, StorageError};

use super::config::RetryConfig;
use super::error::TransferError;
use super::types::{Direction, TransferSummary};

/// Default number of transfers in flight per batch.
pub const DEFAULT_MAX_CONCURRENCY: usize = 50;

/// Moves files between the local file system and storage containers.
#[derive(Clone)]
pub struct TransferEngine {
    storage: Arc<dyn ObjectStorage>,
    retry: RetryConfig,
}

impl TransferEngine {
    pub fn new(storage: Arc<dyn ObjectStorage>, retry: RetryConfig) -> Self {
        Self { storage, retry }
    }

    /// Uploads every file into `container` under its basename.
    ///
    /// At most `max_concurrency` uploads run at once. Every upload runs to
    /// completion (including retries) before failures are reported; uploaded
    /// blobs are kept even when the batch fails.
    pub async fn upload_all(
        &self,
        files: &[PathBuf],
        container: &str,
        max_concurrency: usize,
    ) -> Result<TransferSummary, TransferError> {
        let semaphore = Semaphore::new(max_concurrency.max(1));

        let uploads = files.iter().map(|path| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.map_err(|_| TransferError::Upload {
                    path: path.clone(),
                    source: StorageError::TaskFailed("transfer semaphore closed".into()),
                })?;

                let name = blob_name(path).ok_or_else(|| TransferError::Upload {
                    path: path.clone(),
                    source: StorageError::InvalidName(path.display().to_string()),
                })?;

                self.with_retry(Direction::Upload, &name, || {
                    self.storage.upload_blob(container, &name, path)
                })
                .await
                .map_err(|source| TransferError::Upload {
                    path: path.clone(),
                    source,
                })
            }
        });

        let results = join_all(uploads).await;
        let summary = summarize(Direction::Upload, results)?;
        debug!(
            "Uploaded {} files ({} bytes) to {}",
            summary.files, summary.bytes, container
        );
        Ok(summary)
    }

    /// Downloads every blob in `container` into `destination`.
    ///
    /// Local names are blob basenames. When a name was already written by this
    /// batch or exists on disk, the blob is saved as `name.{language}.ext`
    /// instead, then `name.{language}.2.ext` and so on until a name is free.
    pub async fn download_all(
        &self,
        container: &str,
        destination: &Path,
        language: &str,
        max_concurrency: usize,
    ) -> Result<TransferSummary, TransferError> {
        let blobs = self
            .storage
            .list_blobs(container)
            .await
            .map_err(|source| TransferError::Listing {
                container: container.to_string(),
                source,
            })?;

        tokio::fs::create_dir_all(destination)
            .await
            .map_err(|source| TransferError::Io {
                path: destination.to_path_buf(),
                source,
            })?;

        let plan = plan_download_paths(&blobs, destination, language).await;
        let semaphore = Semaphore::new(max_concurrency.max(1));

        let downloads = plan.iter().map(|(blob, path)| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.map_err(|_| TransferError::Download {
                    blob: blob.clone(),
                    path: path.clone(),
                    source: StorageError::TaskFailed("transfer semaphore closed".into()),
                })?;

                self.with_retry(Direction::Download, blob, || {
                    self.download_one(container, blob, path)
                })
                .await
                .map_err(|source| TransferError::Download {
                    blob: blob.clone(),
                    path: path.clone(),
                    source,
                })
            }
        });

        let results = join_all(downloads).await;
        let summary = summarize(Direction::Download, results)?;
        debug!(
            "Downloaded {} files ({} bytes) from {} into {}",
            summary.files,
            summary.bytes,
            container,
            destination.display()
        );
        Ok(summary)
    }

    async fn download_one(
        &self,
        container: &str,
        blob: &str,
        path: &Path,
    ) -> Result<u64, StorageError> {
        let mut stream = self.storage.download_blob(container, blob).await?;
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| StorageError::io(path, e))?;

        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| StorageError::io(path, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| StorageError::io(path, e))?;
        Ok(written)
    }

    async fn with_retry<F, Fut>(
        &self,
        direction: Direction,
        label: &str,
        mut op: F,
    ) -> Result<u64, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<u64, StorageError>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "{} of {} failed (attempt {}/{}), retrying in {:?}: {}",
                        direction.as_str(),
                        label,
                        attempt,
                        max_attempts,
                        delay,
                        e
                    );
                    metrics::TRANSFER_RETRIES
                        .with_label_values(&[direction.as_str()])
                        .inc();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Pairs each blob with its local destination, renaming on collision.
async fn plan_download_paths(
    blobs: &[BlobInfo],
    destination: &Path,
    language: &str,
) -> Vec<(String, PathBuf)> {
    let mut claimed: HashSet<String> = HashSet::new();
    let mut plan = Vec::with_capacity(blobs.len());

    for blob in blobs {
        let base = blob
            .name
            .rsplit('/')
            .next()
            .unwrap_or(blob.name.as_str())
            .to_string();

        let mut local = base.clone();
        let mut attempt = 1;
        while is_taken(&claimed, destination, &local).await {
            local = if attempt == 1 {
                with_language_suffix(&base, language)
            } else {
                with_language_suffix(&base, &format!("{}.{}", language, attempt))
            };
            attempt += 1;
        }
        if local != base {
            debug!("{} already present, saving as {}", base, local);
        }

        claimed.insert(local.clone());
        plan.push((blob.name.clone(), destination.join(local)));
    }

    plan
}

async fn is_taken(claimed: &HashSet<String>, destination: &Path, name: &str) -> bool {
    claimed.contains(name)
        || tokio::fs::try_exists(destination.join(name))
            .await
            .unwrap_or(false)
}

/// Inserts `.{language}` before the extension ("report.docx" -> "report.es.docx").
pub fn with_language_suffix(file_name: &str, language: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}.{}.{}", stem, language, ext),
        _ => format!("{}.{}", file_name, language),
    }
}

fn blob_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().to_string())
}

fn summarize(
    direction: Direction,
    results: Vec<Result<u64, TransferError>>,
) -> Result<TransferSummary, TransferError> {
    let total = results.len();
    let mut summary = TransferSummary::default();
    let mut failures = Vec::new();

    for result in results {
        match result {
            Ok(bytes) => {
                summary.files += 1;
                summary.bytes += bytes;
            }
            Err(e) => failures.push(e),
        }
    }

    metrics::FILES_TRANSFERRED
        .with_label_values(&[direction.as_str()])
        .inc_by(summary.files as u64);
    metrics::BYTES_TRANSFERRED
        .with_label_values(&[direction.as_str()])
        .inc_by(summary.bytes);

    if failures.is_empty() {
        return Ok(summary);
    }

    for failure in &failures {
        warn!("{}", failure);
    }
    let failed = failures.len();
    let first = failures.swap_remove(0);
    Err(TransferError::Batch {
        failed,
        total,
        completed: summary,
        first: Box::new(first),
    })
}
