use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::orchestrator::OrchestratorConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Translation engine configuration.
///
/// The section is optional at parse time so that a missing endpoint or key is
/// reported by `validate_config` as a missing setting instead of a parse error.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Document translation endpoint (e.g. "https://myres.cognitiveservices.azure.com")
    #[serde(default)]
    pub endpoint: String,
    /// Subscription key
    #[serde(default)]
    pub key: String,
    /// Resource region, sent with catalog requests when set
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint serving the supported-languages catalog
    #[serde(default = "default_languages_endpoint")]
    pub languages_endpoint: String,
    /// Custom translator category applied to every target
    #[serde(default)]
    pub category: Option<String>,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            key: String::new(),
            region: None,
            languages_endpoint: default_languages_endpoint(),
            category: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_languages_endpoint() -> String {
    "https://api.cognitive.microsofttranslator.com".to_string()
}

fn default_timeout() -> u32 {
    30
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Storage backend type
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory for the filesystem backend
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Key used to sign access URIs
    #[serde(default)]
    pub signing_key: String,
    /// Prefix shared by every run container name
    #[serde(default = "default_container_prefix")]
    pub container_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root: default_storage_root(),
            signing_key: String::new(),
            container_prefix: default_container_prefix(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("doctr-storage")
}

fn default_container_prefix() -> String {
    "doctr".to_string()
}

/// Available storage backends
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Filesystem,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub engine: SanitizedEngineConfig,
    pub storage: SanitizedStorageConfig,
    pub orchestrator: OrchestratorConfig,
}

/// Sanitized engine config (key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedEngineConfig {
    pub endpoint: String,
    pub key_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub timeout_secs: u32,
}

/// Sanitized storage config (signing key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStorageConfig {
    pub backend: String,
    pub root: PathBuf,
    pub signing_key_configured: bool,
    pub container_prefix: String,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            engine: SanitizedEngineConfig {
                endpoint: config.engine.endpoint.clone(),
                key_configured: !config.engine.key.is_empty(),
                region: config.engine.region.clone(),
                category: config.engine.category.clone(),
                timeout_secs: config.engine.timeout_secs,
            },
            storage: SanitizedStorageConfig {
                backend: match config.storage.backend {
                    StorageBackend::Filesystem => "filesystem".to_string(),
                },
                root: config.storage.root.clone(),
                signing_key_configured: !config.storage.signing_key.is_empty(),
                container_prefix: config.storage.container_prefix.clone(),
            },
            orchestrator: config.orchestrator.clone(),
        }
    }
}
