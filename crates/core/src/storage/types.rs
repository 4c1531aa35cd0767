//! Types for object storage operations.

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::StorageError;

/// A stream of blob content chunks.
pub type BlobStream = BoxStream<'static, Result<Vec<u8>, StorageError>>;

/// A blob listed in a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    pub name: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

/// A container listed in the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub name: String,
    pub last_modified: DateTime<Utc>,
}

/// How the translation engine is granted access to a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Time-boxed, permission-scoped signed URI.
    SignedUri,
    /// Plain URI; the engine uses its own service identity.
    DirectIdentity,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::SignedUri => "signed_uri",
            AccessMode::DirectIdentity => "direct_identity",
        }
    }
}

/// Permissions embedded in a signed URI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerPermissions {
    pub read: bool,
    pub write: bool,
    pub list: bool,
    pub delete: bool,
}

impl ContainerPermissions {
    /// Read + list, granted on the source container.
    pub const SOURCE: Self = Self {
        read: true,
        write: false,
        list: true,
        delete: false,
    };

    /// Write + list, granted on target containers.
    pub const TARGET: Self = Self {
        read: false,
        write: true,
        list: true,
        delete: false,
    };

    /// Read only, granted on glossary blobs.
    pub const READ: Self = Self {
        read: true,
        write: false,
        list: false,
        delete: false,
    };

    /// Compact permission string in "rwdl" order.
    pub fn as_code(&self) -> String {
        let mut code = String::with_capacity(4);
        if self.read {
            code.push('r');
        }
        if self.write {
            code.push('w');
        }
        if self.delete {
            code.push('d');
        }
        if self.list {
            code.push('l');
        }
        code
    }

    /// Parses a permission string produced by [`as_code`](Self::as_code).
    pub fn from_code(code: &str) -> Option<Self> {
        let mut permissions = Self::default();
        for c in code.chars() {
            match c {
                'r' => permissions.read = true,
                'w' => permissions.write = true,
                'd' => permissions.delete = true,
                'l' => permissions.list = true,
                _ => return None,
            }
        }
        Some(permissions)
    }
}

/// Appends a blob name to a container URI, keeping any query string at the end.
pub fn blob_uri(container_uri: &str, blob_name: &str) -> String {
    let encoded = urlencoding::encode(blob_name);
    match container_uri.split_once('?') {
        Some((base, query)) => format!("{}/{}?{}", base.trim_end_matches('/'), encoded, query),
        None => format!("{}/{}", container_uri.trim_end_matches('/'), encoded),
    }
}
