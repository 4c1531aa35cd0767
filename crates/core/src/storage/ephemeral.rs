//! Per-run ephemeral container lifecycle.
//!
//! Every run gets a random token; its containers are named
//! `{prefix}{token}{suffix}` where the suffix is `src` for the source container,
//! `gls` for the glossary container, and the normalized language code for
//! target containers. The same convention lets the sweeper recognize containers
//! left behind by runs that never reached cleanup.

use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metrics;

use super::error::StorageError;
use super::traits::ObjectStorage;
use super::types::{AccessMode, ContainerPermissions};

/// Length of the random per-run token embedded in container names.
pub const RUN_TOKEN_LEN: usize = 12;

const SOURCE_SUFFIX: &str = "src";
const GLOSSARY_SUFFIX: &str = "gls";

/// A target-language container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetContainer {
    pub language: String,
    pub name: String,
}

/// The containers owned by one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSet {
    pub token: String,
    pub source: String,
    pub targets: Vec<TargetContainer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glossary: Option<String>,
}

impl ContainerSet {
    /// Every container name in the set, source first.
    pub fn all_names(&self) -> Vec<&str> {
        let mut names = vec![self.source.as_str()];
        names.extend(self.targets.iter().map(|t| t.name.as_str()));
        if let Some(ref glossary) = self.glossary {
            names.push(glossary.as_str());
        }
        names
    }

    /// Container receiving output for `language`.
    pub fn target_for(&self, language: &str) -> Option<&str> {
        self.targets
            .iter()
            .find(|t| t.language == language)
            .map(|t| t.name.as_str())
    }
}

/// Container creations still running after the source container is ready.
pub struct PendingContainers {
    tasks: Vec<(String, JoinHandle<Result<(), StorageError>>)>,
}

impl PendingContainers {
    /// Waits for every pending creation and returns the first failure.
    pub async fn join(self) -> Result<(), StorageError> {
        let (names, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        let results = join_all(handles).await;

        let mut first_error = None;
        for (name, result) in names.into_iter().zip(results) {
            let outcome = match result {
                Ok(inner) => inner,
                Err(e) => Err(StorageError::TaskFailed(format!(
                    "creating container {}: {}",
                    name, e
                ))),
            };
            if let Err(e) = outcome {
                warn!("Failed to create container {}: {}", name, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Outcome of deleting a run's containers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    /// Container name and error message for each failed deletion.
    pub failed: Vec<(String, String)>,
}

/// Outcome of an abandoned-container sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Containers that matched the naming convention.
    pub examined: usize,
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// Decides which runs also sweep abandoned containers: one run in every `every_n_runs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepPolicy {
    /// 0 disables sweeping.
    pub every_n_runs: u64,
}

impl SweepPolicy {
    pub fn new(every_n_runs: u64) -> Self {
        Self { every_n_runs }
    }

    pub fn disabled() -> Self {
        Self { every_n_runs: 0 }
    }

    /// `run_number` counts runs from 1.
    pub fn should_sweep(&self, run_number: u64) -> bool {
        self.every_n_runs > 0 && run_number > 0 && run_number % self.every_n_runs == 0
    }
}

/// Creates, grants access to, and deletes per-run containers.
#[derive(Clone)]
pub struct EphemeralStorageManager {
    storage: Arc<dyn ObjectStorage>,
    prefix: String,
}

impl EphemeralStorageManager {
    pub fn new(storage: Arc<dyn ObjectStorage>, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Names a fresh container set for the given languages without touching storage.
    pub fn plan_run_containers(&self, languages: &[String], with_glossary: bool) -> ContainerSet {
        let token = generate_run_token();
        let name = |suffix: &str| format!("{}{}{}", self.prefix, token, suffix);

        ContainerSet {
            source: name(SOURCE_SUFFIX),
            targets: languages
                .iter()
                .map(|language| TargetContainer {
                    language: language.clone(),
                    name: name(&language_suffix(language)),
                })
                .collect(),
            glossary: with_glossary.then(|| name(GLOSSARY_SUFFIX)),
            token,
        }
    }

    /// Creates every container in the set.
    ///
    /// Target and glossary creations are spawned first and keep running in the
    /// background; this call only waits for the source container. Join the returned
    /// [`PendingContainers`] before handing the set to the engine.
    pub async fn create_run_containers(
        &self,
        set: &ContainerSet,
    ) -> Result<PendingContainers, StorageError> {
        let mut others: Vec<String> = set.targets.iter().map(|t| t.name.clone()).collect();
        others.extend(set.glossary.clone());

        let tasks = others
            .into_iter()
            .map(|name| {
                let storage = Arc::clone(&self.storage);
                let task_name = name.clone();
                let handle = tokio::spawn(async move {
                    storage.create_container_if_absent(&task_name).await
                });
                (name, handle)
            })
            .collect();
        let pending = PendingContainers { tasks };

        self.storage.create_container_if_absent(&set.source).await?;
        debug!(
            "Source container {} created, {} more pending",
            set.source,
            pending.len()
        );
        Ok(pending)
    }

    /// Produces the URI the engine uses to reach `container`.
    pub fn generate_access_uri(
        &self,
        container: &str,
        mode: AccessMode,
        permissions: ContainerPermissions,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        match mode {
            AccessMode::SignedUri => {
                self.storage
                    .generate_signed_uri(container, permissions, Utc::now() + ttl)
            }
            AccessMode::DirectIdentity => Ok(self.storage.direct_uri(container)),
        }
    }

    /// Deletes every container in the set in parallel. Failures are logged, never raised.
    pub async fn delete_run_containers(&self, set: &ContainerSet) -> CleanupReport {
        let names = set.all_names();
        let results = join_all(names.iter().map(|name| self.storage.delete_container(name))).await;

        let mut report = CleanupReport::default();
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(()) => {
                    metrics::CONTAINERS_DELETED.with_label_values(&["deleted"]).inc();
                    report.deleted.push(name.to_string());
                }
                Err(e) => {
                    metrics::CONTAINERS_DELETED.with_label_values(&["failed"]).inc();
                    warn!("Failed to delete container {}: {}", name, e);
                    report.failed.push((name.to_string(), e.to_string()));
                }
            }
        }

        debug!(
            "Cleanup for run {}: {} deleted, {} failed",
            set.token,
            report.deleted.len(),
            report.failed.len()
        );
        report
    }

    /// Deletes run containers whose last modification is older than `retention`.
    pub async fn sweep_abandoned(&self, retention: Duration) -> SweepReport {
        let containers = match self.storage.list_containers(&self.prefix).await {
            Ok(containers) => containers,
            Err(e) => {
                warn!("Abandoned container sweep could not list containers: {}", e);
                return SweepReport::default();
            }
        };

        let cutoff = Utc::now() - retention;
        let candidates: Vec<_> = containers
            .into_iter()
            .filter(|c| self.is_run_container(&c.name))
            .collect();
        let examined = candidates.len();
        let expired: Vec<String> = candidates
            .into_iter()
            .filter(|c| c.last_modified < cutoff)
            .map(|c| c.name)
            .collect();

        let results =
            join_all(expired.iter().map(|name| self.storage.delete_container(name))).await;

        let mut report = SweepReport {
            examined,
            ..Default::default()
        };
        for (name, result) in expired.into_iter().zip(results) {
            match result {
                Ok(()) => report.deleted.push(name),
                Err(e) => {
                    warn!("Failed to sweep container {}: {}", name, e);
                    report.failed.push(name);
                }
            }
        }

        metrics::CONTAINERS_SWEPT.inc_by(report.deleted.len() as u64);
        if !report.deleted.is_empty() {
            info!(
                "Swept {} abandoned containers older than {} days",
                report.deleted.len(),
                retention.num_days()
            );
        }
        report
    }

    /// Whether `name` follows the run container naming convention.
    pub fn is_run_container(&self, name: &str) -> bool {
        let Some(rest) = name.strip_prefix(&self.prefix) else {
            return false;
        };
        rest.len() > RUN_TOKEN_LEN
            && rest
                .chars()
                .take(RUN_TOKEN_LEN)
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    }
}

fn generate_run_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..RUN_TOKEN_LEN].to_string()
}

/// Container-safe form of a language code ("zh-Hans" -> "zhhans").
fn language_suffix(language: &str) -> String {
    language
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
