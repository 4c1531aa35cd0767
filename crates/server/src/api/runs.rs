//! Run API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use doctr_core::{RunContext, RunEventEnvelope, RunOutcome, RunRequest};

use super::handlers::ErrorResponse;
use crate::state::AppState;

/// Buffer size for a run's notification channel
const EVENT_BUFFER_SIZE: usize = 1024;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for starting a run
#[derive(Debug, Deserialize)]
pub struct CreateRunBody {
    /// Caller-chosen run id, used to cancel the run while it is in progress
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(flatten)]
    pub request: RunRequest,
}

/// Response for a finished run
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub outcome: RunOutcome,
    /// Notifications emitted by the run, in order
    pub events: Vec<RunEventEnvelope>,
}

/// Response for listing runs in progress
#[derive(Debug, Serialize)]
pub struct ActiveRunsResponse {
    pub runs: Vec<String>,
}

/// Simple message response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Execute a run and return its outcome.
///
/// The run continues to completion, cleanup included, even if the client
/// disconnects. A failed run is still a 200 response; see `outcome.success`.
pub async fn create_run(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateRunBody>,
) -> Result<Json<RunResponse>, impl IntoResponse> {
    let run_id = body
        .run_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let Some(cancel) = state.register_run(&run_id).await else {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!("Run already in progress: {}", run_id),
            }),
        ));
    };

    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER_SIZE);
    let collector = tokio::spawn(async move {
        let mut events = Vec::new();
        while let Some(envelope) = rx.recv().await {
            events.push(envelope);
        }
        events
    });

    let context = RunContext {
        run_id: Some(run_id.clone()),
        events: Some(tx),
        cancel,
    };
    let orchestrator = state.orchestrator();
    let request = body.request;
    let run = tokio::spawn(async move { orchestrator.run_with_context(request, context).await });

    let result = run.await;
    state.finish_run(&run_id).await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Run {} task failed: {}", run_id, e);
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Run {} aborted: {}", run_id, e),
                }),
            ));
        }
    };
    let events = collector.await.unwrap_or_default();

    info!(
        "Run {} finished via API (success: {})",
        outcome.run_id, outcome.success
    );
    Ok(Json(RunResponse { outcome, events }))
}

/// List runs in progress
pub async fn list_runs(State(state): State<Arc<AppState>>) -> Json<ActiveRunsResponse> {
    Json(ActiveRunsResponse {
        runs: state.active_runs().await,
    })
}

/// Cancel a run in progress
pub async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<MessageResponse>), impl IntoResponse> {
    if state.cancel_run(&id).await {
        info!("Cancellation requested for run {}", id);
        Ok((
            StatusCode::ACCEPTED,
            Json(MessageResponse {
                message: format!("Cancellation requested for run {}", id),
            }),
        ))
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Run not found: {}", id),
            }),
        ))
    }
}
