//! Object storage for translation runs.
//!
//! This module provides the `ObjectStorage` trait, a file system backed
//! implementation, and the ephemeral container manager that gives every run
//! its own short-lived source, target and glossary containers.
//!
//! # Features
//!
//! - Container create/delete and blob upload/download
//! - Chunked streaming downloads
//! - Signed, permission-scoped, time-boxed container URIs
//! - Sweeping of containers abandoned by crashed runs
//!
//! # Example
//!
//! ```ignore
//! use doctr_core::storage::{EphemeralStorageManager, FsObjectStorage};
//!
//! let storage = Arc::new(FsObjectStorage::new("/var/lib/doctr", "secret"));
//! let manager = EphemeralStorageManager::new(storage, "doctr");
//!
//! let set = manager.plan_run_containers(&["es".to_string()], false);
//! manager.create_run_containers(&set).await?.join().await?;
//! // ... upload, translate, download ...
//! manager.delete_run_containers(&set).await;
//! ```

mod ephemeral;
mod error;
mod fs_storage;
mod traits;
mod types;

pub use ephemeral::{
    CleanupReport, ContainerSet, EphemeralStorageManager, PendingContainers, SweepPolicy,
    SweepReport, TargetContainer, RUN_TOKEN_LEN,
};
pub use error::StorageError;
pub use fs_storage::FsObjectStorage;
pub use traits::ObjectStorage;
pub use types::{blob_uri, AccessMode, BlobInfo, BlobStream, ContainerInfo, ContainerPermissions};
