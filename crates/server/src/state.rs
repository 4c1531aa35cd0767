use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use doctr_core::{
    Config, ConfigError, ObjectStorage, RunOrchestrator, SanitizedConfig, TranslationEngine,
};

/// Shared application state
pub struct AppState {
    config: Config,
    engine: Arc<dyn TranslationEngine>,
    orchestrator: Arc<RunOrchestrator>,
    /// Cancellation handles of runs in progress, by run id.
    active_runs: RwLock<HashMap<String, CancellationToken>>,
}

impl AppState {
    pub fn new(
        config: Config,
        engine: Arc<dyn TranslationEngine>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Result<Self, ConfigError> {
        let orchestrator = RunOrchestrator::from_config(&config, Arc::clone(&engine), storage)?;
        Ok(Self {
            config,
            engine,
            orchestrator: Arc::new(orchestrator),
            active_runs: RwLock::new(HashMap::new()),
        })
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn engine(&self) -> &dyn TranslationEngine {
        self.engine.as_ref()
    }

    pub fn orchestrator(&self) -> Arc<RunOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// Registers a run and returns its cancellation token.
    ///
    /// Returns `None` when a run with the same id is already in progress.
    pub async fn register_run(&self, run_id: &str) -> Option<CancellationToken> {
        let mut runs = self.active_runs.write().await;
        if runs.contains_key(run_id) {
            return None;
        }
        let token = CancellationToken::new();
        runs.insert(run_id.to_string(), token.clone());
        Some(token)
    }

    pub async fn finish_run(&self, run_id: &str) {
        self.active_runs.write().await.remove(run_id);
    }

    /// Cancels a run in progress. Returns false for unknown ids.
    pub async fn cancel_run(&self, run_id: &str) -> bool {
        match self.active_runs.read().await.get(run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Ids of runs in progress, sorted.
    pub async fn active_runs(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active_runs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
