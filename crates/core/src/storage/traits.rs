//! Trait definitions for the storage module.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageError;
use super::types::{BlobInfo, BlobStream, ContainerInfo, ContainerPermissions};

/// An object storage backend holding containers of named blobs.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Returns the name of this storage implementation.
    fn name(&self) -> &str;

    /// Creates the container unless it already exists.
    async fn create_container_if_absent(&self, name: &str) -> Result<(), StorageError>;

    /// Deletes the container and everything in it.
    async fn delete_container(&self, name: &str) -> Result<(), StorageError>;

    /// Uploads a local file as a blob, replacing any blob with the same name.
    ///
    /// Returns the number of bytes uploaded.
    async fn upload_blob(
        &self,
        container: &str,
        name: &str,
        local_path: &Path,
    ) -> Result<u64, StorageError>;

    /// Opens a blob for reading.
    async fn download_blob(&self, container: &str, name: &str) -> Result<BlobStream, StorageError>;

    /// Lists every blob in a container.
    async fn list_blobs(&self, container: &str) -> Result<Vec<BlobInfo>, StorageError>;

    /// Lists containers whose name starts with `prefix`.
    async fn list_containers(&self, prefix: &str) -> Result<Vec<ContainerInfo>, StorageError>;

    /// Produces a signed container URI valid until `expires_at`.
    fn generate_signed_uri(
        &self,
        container: &str,
        permissions: ContainerPermissions,
        expires_at: DateTime<Utc>,
    ) -> Result<String, StorageError>;

    /// Produces an unsigned container URI for identity-based access.
    fn direct_uri(&self, container: &str) -> String;
}
