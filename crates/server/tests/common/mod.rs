//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with the in-memory engine and storage injected, so whole runs can be
//! driven over HTTP without a translation service.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use doctr_core::{
    load_config_from_str,
    testing::{MockObjectStorage, MockTranslationEngine},
    Config, ObjectStorage, TranslationEngine,
};
use doctr_server::state::AppState;

/// Re-export fixtures for test convenience
pub use doctr_core::testing::fixtures;

/// Configuration used by every fixture: fast polling, no sweeping.
const TEST_CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 8080

[engine]
endpoint = "https://doctr-test.cognitiveservices.azure.com"
key = "engine-secret"

[storage]
root = "/tmp/doctr-unused"
signing_key = "signing-secret"
container_prefix = "doctr"

[orchestrator]
poll_interval_ms = 5
status_retry_delay_ms = 1
sweep_every_n_runs = 0

[orchestrator.retry]
max_attempts = 2
initial_delay_ms = 1
max_delay_ms = 5
backoff_multiplier = 2.0
"#;

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_run() {
///     let fixture = TestFixture::new();
///     let inputs = fixture.write_inputs(&[("report.docx", 10)]);
///
///     let response = fixture.post("/api/v1/runs", fixture.run_body(&inputs, &["de"])).await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Shared state behind the router
    pub state: Arc<AppState>,
    /// Mock engine - script job statuses and outcomes
    pub engine: Arc<MockTranslationEngine>,
    /// Mock storage - inspect containers and inject failures
    pub storage: Arc<MockObjectStorage>,
    /// Input files for runs
    pub input_dir: TempDir,
    /// Root of per-language output directories
    pub output_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Create a test fixture with a custom configuration.
    pub fn with_config(config: Config) -> Self {
        let storage = Arc::new(MockObjectStorage::new());
        let engine = Arc::new(MockTranslationEngine::new().with_storage(Arc::clone(&storage)));

        let state = Arc::new(
            AppState::new(
                config,
                Arc::clone(&engine) as Arc<dyn TranslationEngine>,
                Arc::clone(&storage) as Arc<dyn ObjectStorage>,
            )
            .expect("Failed to create app state"),
        );
        let router = doctr_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            state,
            engine,
            storage,
            input_dir: TempDir::new().expect("Failed to create input dir"),
            output_dir: TempDir::new().expect("Failed to create output dir"),
        }
    }

    /// Writes input files of the given sizes and returns their paths.
    pub fn write_inputs(&self, files: &[(&str, usize)]) -> Vec<PathBuf> {
        files
            .iter()
            .map(|(name, size)| {
                let path = self.input_dir.path().join(name);
                std::fs::write(&path, vec![b'x'; *size]).expect("Failed to write input");
                path
            })
            .collect()
    }

    /// Builds a run request body targeting the fixture's output directory.
    pub fn run_body(&self, paths: &[PathBuf], languages: &[&str]) -> Value {
        json!({
            "paths": paths,
            "target_languages": languages,
            "output_template": format!("{}/{{lang}}", self.output_dir.path().display()),
        })
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        send(self.router.clone(), method, path, body).await
    }
}

/// Sends one request through a router.
///
/// Free-standing so a request can run in a spawned task while the test
/// keeps using the fixture.
pub async fn send(router: Router, method: &str, path: &str, body: Option<Value>) -> TestResponse {
    let mut request_builder = Request::builder().method(method).uri(path);

    let body = if let Some(json_body) = body {
        request_builder = request_builder.header("Content-Type", "application/json");
        Body::from(serde_json::to_vec(&json_body).unwrap())
    } else {
        Body::empty()
    };

    let request = request_builder.body(body).unwrap();

    let response = router
        .oneshot(request)
        .await
        .expect("Failed to send request");

    let status = response.status();
    let body_bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect body")
        .to_bytes();

    let text = String::from_utf8_lossy(&body_bytes).to_string();
    let body: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    TestResponse { status, body, text }
}

/// The configuration every fixture starts from.
pub fn test_config() -> Config {
    load_config_from_str(TEST_CONFIG).expect("Test config must parse")
}
