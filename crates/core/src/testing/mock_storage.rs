//! Mock object storage for testing.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::storage::{
    BlobInfo, BlobStream, ContainerInfo, ContainerPermissions, ObjectStorage, StorageError,
};

/// URI scheme used by the mock.
pub const MOCK_SCHEME: &str = "mock://";

/// Internal state for a mock container.
#[derive(Debug, Clone)]
struct MockContainer {
    last_modified: DateTime<Utc>,
    blobs: BTreeMap<String, Vec<u8>>,
}

impl MockContainer {
    fn new(last_modified: DateTime<Utc>) -> Self {
        Self {
            last_modified,
            blobs: BTreeMap::new(),
        }
    }
}

/// Tracks transfers currently inside the mock.
#[derive(Debug, Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory implementation of the ObjectStorage trait.
///
/// Provides controllable behavior for testing:
/// - Inspect containers and blobs after a run
/// - Inject failures per container or per blob
/// - Slow transfers down to observe concurrency
///
/// # Example
///
/// ```rust,ignore
/// let storage = MockObjectStorage::new().with_delay(Duration::from_millis(10));
///
/// storage.add_container("src", Utc::now()).await;
/// storage.fail_upload("bad.docx", StorageError::Unavailable("503".into())).await;
///
/// // Run uploads...
///
/// assert_eq!(storage.blob_names("src").await, vec!["good.docx"]);
/// assert!(storage.max_in_flight() <= 4);
/// ```
#[derive(Debug)]
pub struct MockObjectStorage {
    /// Containers by name.
    containers: Arc<RwLock<HashMap<String, MockContainer>>>,
    /// Names passed to create_container_if_absent, in call order.
    created: Arc<RwLock<Vec<String>>>,
    /// Names passed to delete_container, in call order.
    delete_calls: Arc<RwLock<Vec<String>>>,
    /// Containers actually removed.
    deleted: Arc<RwLock<Vec<String>>>,
    /// One-shot failures for container creation, by container name.
    creation_errors: Arc<RwLock<HashMap<String, StorageError>>>,
    /// One-shot failures for container deletion, by container name.
    deletion_errors: Arc<RwLock<HashMap<String, StorageError>>>,
    /// One-shot failures for uploads, by blob name.
    upload_errors: Arc<RwLock<HashMap<String, StorageError>>>,
    /// When set, every deletion fails.
    fail_all_deletions: AtomicBool,
    /// Artificial latency per transfer.
    delay: Option<Duration>,
    in_flight: Arc<InFlight>,
}

impl Default for MockObjectStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MockObjectStorage {
    /// Create a new, empty mock storage.
    pub fn new() -> Self {
        Self {
            containers: Arc::new(RwLock::new(HashMap::new())),
            created: Arc::new(RwLock::new(Vec::new())),
            delete_calls: Arc::new(RwLock::new(Vec::new())),
            deleted: Arc::new(RwLock::new(Vec::new())),
            creation_errors: Arc::new(RwLock::new(HashMap::new())),
            deletion_errors: Arc::new(RwLock::new(HashMap::new())),
            upload_errors: Arc::new(RwLock::new(HashMap::new())),
            fail_all_deletions: AtomicBool::new(false),
            delay: None,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Delay every upload and download by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Extracts the container name from a URI produced by this mock.
    pub fn container_from_uri(uri: &str) -> Option<&str> {
        let rest = uri.strip_prefix(MOCK_SCHEME)?;
        let path = rest.split('?').next()?;
        path.split('/').next().filter(|name| !name.is_empty())
    }

    // =========================================================================
    // Test setup
    // =========================================================================

    /// Add an empty container with a given modification time.
    pub async fn add_container(&self, name: &str, last_modified: DateTime<Utc>) {
        self.containers
            .write()
            .await
            .insert(name.to_string(), MockContainer::new(last_modified));
    }

    /// Store a blob directly, creating the container if needed.
    pub async fn put_blob(&self, container: &str, name: &str, content: impl Into<Vec<u8>>) {
        let mut containers = self.containers.write().await;
        containers
            .entry(container.to_string())
            .or_insert_with(|| MockContainer::new(Utc::now()))
            .blobs
            .insert(name.to_string(), content.into());
    }

    /// Copy every blob of `from` into `to`. Returns the copied names.
    ///
    /// Missing containers copy nothing.
    pub async fn copy_blobs(&self, from: &str, to: &str, skip: &[String]) -> Vec<String> {
        let mut containers = self.containers.write().await;
        let Some(blobs) = containers.get(from).map(|c| c.blobs.clone()) else {
            return Vec::new();
        };
        let Some(target) = containers.get_mut(to) else {
            return Vec::new();
        };

        let mut copied = Vec::new();
        for (name, content) in blobs {
            if skip.contains(&name) {
                continue;
            }
            target.blobs.insert(name.clone(), content);
            copied.push(name);
        }
        copied
    }

    /// Make the next creation of `container` fail.
    pub async fn fail_container_creation(&self, container: &str, error: StorageError) {
        self.creation_errors
            .write()
            .await
            .insert(container.to_string(), error);
    }

    /// Make the next deletion of `container` fail.
    pub async fn fail_container_deletion(&self, container: &str, error: StorageError) {
        self.deletion_errors
            .write()
            .await
            .insert(container.to_string(), error);
    }

    /// Make every deletion fail from now on.
    pub fn fail_all_deletions(&self) {
        self.fail_all_deletions.store(true, Ordering::SeqCst);
    }

    /// Make the next upload of a blob named `name` fail.
    pub async fn fail_upload(&self, name: &str, error: StorageError) {
        self.upload_errors
            .write()
            .await
            .insert(name.to_string(), error);
    }

    // =========================================================================
    // Test assertions
    // =========================================================================

    pub async fn has_container(&self, name: &str) -> bool {
        self.containers.read().await.contains_key(name)
    }

    /// Names of all existing containers, sorted.
    pub async fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.containers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Blob names in a container, sorted. Empty for a missing container.
    pub async fn blob_names(&self, container: &str) -> Vec<String> {
        self.containers
            .read()
            .await
            .get(container)
            .map(|c| c.blobs.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn blob_content(&self, container: &str, name: &str) -> Option<Vec<u8>> {
        self.containers
            .read()
            .await
            .get(container)
            .and_then(|c| c.blobs.get(name).cloned())
    }

    /// Every container creation request, in order.
    pub async fn created_containers(&self) -> Vec<String> {
        self.created.read().await.clone()
    }

    /// Every container deletion request, including failed ones.
    pub async fn delete_calls(&self) -> Vec<String> {
        self.delete_calls.read().await.clone()
    }

    /// Containers that were actually deleted.
    pub async fn deleted_containers(&self) -> Vec<String> {
        self.deleted.read().await.clone()
    }

    /// Highest number of transfers observed at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.in_flight.peak.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    async fn store_upload(
        &self,
        container: &str,
        name: &str,
        local_path: &Path,
    ) -> Result<u64, StorageError> {
        self.simulate_latency().await;

        if let Some(error) = self.upload_errors.write().await.remove(name) {
            return Err(error);
        }

        let content = tokio::fs::read(local_path)
            .await
            .map_err(|e| StorageError::io(local_path, e))?;
        let size = content.len() as u64;

        let mut containers = self.containers.write().await;
        let entry = containers
            .get_mut(container)
            .ok_or_else(|| StorageError::ContainerNotFound {
                name: container.to_string(),
            })?;
        entry.blobs.insert(name.to_string(), content);
        entry.last_modified = Utc::now();
        Ok(size)
    }
}

#[async_trait]
impl ObjectStorage for MockObjectStorage {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create_container_if_absent(&self, name: &str) -> Result<(), StorageError> {
        self.created.write().await.push(name.to_string());

        if let Some(error) = self.creation_errors.write().await.remove(name) {
            return Err(error);
        }

        self.containers
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| MockContainer::new(Utc::now()));
        Ok(())
    }

    async fn delete_container(&self, name: &str) -> Result<(), StorageError> {
        self.delete_calls.write().await.push(name.to_string());

        if let Some(error) = self.deletion_errors.write().await.remove(name) {
            return Err(error);
        }
        if self.fail_all_deletions.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!(
                "deletion of {} refused",
                name
            )));
        }

        if self.containers.write().await.remove(name).is_none() {
            return Err(StorageError::ContainerNotFound {
                name: name.to_string(),
            });
        }
        self.deleted.write().await.push(name.to_string());
        Ok(())
    }

    async fn upload_blob(
        &self,
        container: &str,
        name: &str,
        local_path: &Path,
    ) -> Result<u64, StorageError> {
        self.in_flight.enter();
        let result = self.store_upload(container, name, local_path).await;
        self.in_flight.leave();
        result
    }

    async fn download_blob(&self, container: &str, name: &str) -> Result<BlobStream, StorageError> {
        self.in_flight.enter();
        self.simulate_latency().await;
        let content = self.blob_content(container, name).await;
        self.in_flight.leave();

        let content = content.ok_or_else(|| StorageError::BlobNotFound {
            container: container.to_string(),
            name: name.to_string(),
        })?;
        Ok(stream::iter(vec![Ok(content)]).boxed())
    }

    async fn list_blobs(&self, container: &str) -> Result<Vec<BlobInfo>, StorageError> {
        let containers = self.containers.read().await;
        let entry = containers
            .get(container)
            .ok_or_else(|| StorageError::ContainerNotFound {
                name: container.to_string(),
            })?;
        Ok(entry
            .blobs
            .iter()
            .map(|(name, content)| BlobInfo {
                name: name.clone(),
                size_bytes: content.len() as u64,
                last_modified: entry.last_modified,
            })
            .collect())
    }

    async fn list_containers(&self, prefix: &str) -> Result<Vec<ContainerInfo>, StorageError> {
        let mut listed: Vec<ContainerInfo> = self
            .containers
            .read()
            .await
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, c)| ContainerInfo {
                name: name.clone(),
                last_modified: c.last_modified,
            })
            .collect();
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listed)
    }

    fn generate_signed_uri(
        &self,
        container: &str,
        permissions: ContainerPermissions,
        expires_at: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        Ok(format!(
            "{}{}?sp={}&se={}&sig=mock",
            MOCK_SCHEME,
            container,
            permissions.as_code(),
            urlencoding::encode(&expires_at.to_rfc3339_opts(SecondsFormat::Secs, true))
        ))
    }

    fn direct_uri(&self, container: &str) -> String {
        format!("{}{}", MOCK_SCHEME, container)
    }
}
