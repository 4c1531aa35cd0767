use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use doctr_core::engine::{FileFormat, LanguageInfo};
use doctr_core::SanitizedConfig;

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct LanguagesResponse {
    pub languages: Vec<LanguageInfo>,
}

#[derive(Debug, Serialize)]
pub struct FormatsResponse {
    pub formats: Vec<FileFormat>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// Languages the engine can translate into
pub async fn list_languages(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LanguagesResponse>, impl IntoResponse> {
    match state.engine().list_supported_languages().await {
        Ok(languages) => Ok(Json(LanguagesResponse { languages })),
        Err(e) => Err((
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

/// Document formats the engine accepts
pub async fn list_formats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FormatsResponse>, impl IntoResponse> {
    match state.engine().list_supported_formats().await {
        Ok(formats) => Ok(Json(FormatsResponse { formats })),
        Err(e) => Err((
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state).await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
