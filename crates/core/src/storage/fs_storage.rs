//! File system object storage implementation.
//!
//! Containers are directories under a root directory and blobs are plain files
//! inside them. Signed URIs carry the permissions, the expiry and a SHA-256
//! signature over both, keyed with the configured signing key.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::error::StorageError;
use super::traits::ObjectStorage;
use super::types::{BlobInfo, BlobStream, ContainerInfo, ContainerPermissions};

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// File system based object storage.
pub struct FsObjectStorage {
    root: PathBuf,
    signing_key: String,
    chunk_size: usize,
}

impl FsObjectStorage {
    /// Creates a storage rooted at `root`; relative roots are made absolute.
    pub fn new(root: impl Into<PathBuf>, signing_key: impl Into<String>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self {
            root,
            signing_key: signing_key.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets the chunk size used when streaming blobs out.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Checks that a URI produced by `generate_signed_uri` is authentic and unexpired,
    /// and returns the permissions it grants.
    pub fn verify_signed_uri(&self, uri: &str) -> Option<ContainerPermissions> {
        let (base, query) = uri.split_once('?')?;
        let container = base.rsplit('/').next()?;

        let mut sp = None;
        let mut se = None;
        let mut sig = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("sp", v)) => sp = Some(v.to_string()),
                Some(("se", v)) => se = urlencoding::decode(v).ok().map(|s| s.into_owned()),
                Some(("sig", v)) => sig = Some(v.to_string()),
                _ => {}
            }
        }
        let (sp, se, sig) = (sp?, se?, sig?);

        if self.signature(container, &sp, &se) != sig {
            return None;
        }
        let expires_at = DateTime::parse_from_rfc3339(&se).ok()?;
        if expires_at.with_timezone(&Utc) <= Utc::now() {
            return None;
        }
        ContainerPermissions::from_code(&sp)
    }

    fn signature(&self, container: &str, permissions: &str, expiry: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_key.as_bytes());
        hasher.update(b"\n");
        hasher.update(container.as_bytes());
        hasher.update(b"\n");
        hasher.update(permissions.as_bytes());
        hasher.update(b"\n");
        hasher.update(expiry.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn container_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_container_name(name)?;
        Ok(self.root.join(name))
    }

    fn blob_path(&self, container: &str, name: &str) -> Result<PathBuf, StorageError> {
        validate_blob_name(name)?;
        Ok(self.container_path(container)?.join(name))
    }

    async fn ensure_container(&self, container: &str) -> Result<PathBuf, StorageError> {
        let path = self.container_path(container)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(path),
            Ok(_) => Err(StorageError::ContainerNotFound {
                name: container.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::ContainerNotFound {
                    name: container.to_string(),
                })
            }
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    fn uri_base(&self, container: &str) -> String {
        format!("file://{}/{}", self.root.display(), container)
    }
}

fn validate_container_name(name: &str) -> Result<(), StorageError> {
    let valid = (3..=63).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(format!("container '{}'", name)))
    }
}

fn validate_blob_name(name: &str) -> Result<(), StorageError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\');
    if invalid {
        Err(StorageError::InvalidName(format!("blob '{}'", name)))
    } else {
        Ok(())
    }
}

fn modified_at(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl ObjectStorage for FsObjectStorage {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn create_container_if_absent(&self, name: &str) -> Result<(), StorageError> {
        let path = self.container_path(name)?;
        fs::create_dir_all(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        debug!("Container ready: {}", path.display());
        Ok(())
    }

    async fn delete_container(&self, name: &str) -> Result<(), StorageError> {
        let path = self.ensure_container(name).await?;
        fs::remove_dir_all(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))
    }

    async fn upload_blob(
        &self,
        container: &str,
        name: &str,
        local_path: &Path,
    ) -> Result<u64, StorageError> {
        self.ensure_container(container).await?;
        let dest = self.blob_path(container, name)?;
        fs::copy(local_path, &dest)
            .await
            .map_err(|e| StorageError::io(local_path, e))
    }

    async fn download_blob(&self, container: &str, name: &str) -> Result<BlobStream, StorageError> {
        self.ensure_container(container).await?;
        let path = self.blob_path(container, name)?;
        let file = File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::BlobNotFound {
                    container: container.to_string(),
                    name: name.to_string(),
                }
            } else {
                StorageError::io(&path, e)
            }
        })?;

        let chunk_size = self.chunk_size;
        let stream = stream::unfold(Some((file, path)), move |state| async move {
            let Some((mut file, path)) = state else {
                return None;
            };
            let mut buffer = vec![0u8; chunk_size];
            match file.read(&mut buffer).await {
                Ok(0) => None,
                Ok(n) => {
                    buffer.truncate(n);
                    Some((Ok(buffer), Some((file, path))))
                }
                Err(e) => Some((Err(StorageError::io(&path, e)), None)),
            }
        });

        Ok(stream.boxed())
    }

    async fn list_blobs(&self, container: &str) -> Result<Vec<BlobInfo>, StorageError> {
        let path = self.ensure_container(container).await?;
        let mut entries = fs::read_dir(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        let mut blobs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&path, e))?
        {
            let meta = entry
                .metadata()
                .await
                .map_err(|e| StorageError::io(entry.path(), e))?;
            if !meta.is_file() {
                continue;
            }
            blobs.push(BlobInfo {
                name: entry.file_name().to_string_lossy().to_string(),
                size_bytes: meta.len(),
                last_modified: modified_at(&meta),
            });
        }

        blobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(blobs)
    }

    async fn list_containers(&self, prefix: &str) -> Result<Vec<ContainerInfo>, StorageError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.root, e)),
        };

        let mut containers = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.root, e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(prefix) {
                continue;
            }
            let meta = entry
                .metadata()
                .await
                .map_err(|e| StorageError::io(entry.path(), e))?;
            if meta.is_dir() {
                containers.push(ContainerInfo {
                    name,
                    last_modified: modified_at(&meta),
                });
            }
        }

        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }

    fn generate_signed_uri(
        &self,
        container: &str,
        permissions: ContainerPermissions,
        expires_at: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        validate_container_name(container)?;
        if self.signing_key.is_empty() {
            return Err(StorageError::Signing("no signing key configured".to_string()));
        }

        let sp = permissions.as_code();
        let se = expires_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let sig = self.signature(container, &sp, &se);

        Ok(format!(
            "{}?sp={}&se={}&sig={}",
            self.uri_base(container),
            sp,
            urlencoding::encode(&se),
            sig
        ))
    }

    fn direct_uri(&self, container: &str) -> String {
        self.uri_base(container)
    }
}
