//! Azure Document Translation engine implementation.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::metrics;

use super::{
    DocumentCounts, DocumentOutcome, DocumentOutcomeStream, EngineError, ErrorInfo, FileFormat,
    JobPhase, JobStatus, LanguageInfo, TranslationEngine, TranslationRequest,
};

const BATCH_API_PATH: &str = "translator/text/batch/v1.1";
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const REGION_HEADER: &str = "Ocp-Apim-Subscription-Region";

/// Azure Document Translation client (batch API v1.1).
pub struct AzureTranslatorClient {
    http: AuthorizedHttp,
    endpoint: String,
    languages_endpoint: String,
}

/// Shared HTTP state, cloned into lazy document pagers.
#[derive(Clone)]
struct AuthorizedHttp {
    client: Client,
    key: String,
    region: Option<String>,
}

impl AuthorizedHttp {
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(KEY_HEADER, &self.key);
        match self.region {
            Some(ref region) if !region.is_empty() => request.header(REGION_HEADER, region),
            _ => request,
        }
    }

    /// Sends a request, recording metrics and mapping failures.
    async fn send(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<Response, EngineError> {
        let start = Instant::now();
        let result = self.authorize(request).send().await;
        metrics::ENGINE_REQUEST_DURATION
            .with_label_values(&[operation])
            .observe(start.elapsed().as_secs_f64());

        let outcome = match result {
            Ok(response) if response.status().is_success() => Ok(response),
            Ok(response) => Err(error_from_response(response).await),
            Err(e) => Err(EngineError::from(e)),
        };

        let status = if outcome.is_ok() { "success" } else { "error" };
        metrics::ENGINE_REQUESTS
            .with_label_values(&[operation, status])
            .inc();
        outcome
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        url: &str,
    ) -> Result<T, EngineError> {
        let response = self.send(operation, self.client.get(url)).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| EngineError::InvalidResponse(e.to_string()))
    }
}

impl AzureTranslatorClient {
    /// Create a new client.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| {
                EngineError::ConnectionFailed(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http: AuthorizedHttp {
                client,
                key: config.key.clone(),
                region: config.region.clone(),
            },
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            languages_endpoint: config.languages_endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn batches_url(&self) -> String {
        format!("{}/{}/batches", self.endpoint, BATCH_API_PATH)
    }

    fn batch_url(&self, job_id: &str) -> String {
        format!("{}/{}", self.batches_url(), urlencoding::encode(job_id))
    }
}

#[async_trait]
impl TranslationEngine for AzureTranslatorClient {
    fn name(&self) -> &str {
        "azure"
    }

    async fn submit_translation(
        &self,
        request: &TranslationRequest,
    ) -> Result<String, EngineError> {
        let body = BatchSubmission::from_request(request);
        let response = self
            .http
            .send("submit", self.http.client.post(self.batches_url()).json(&body))
            .await?;

        let location = response
            .headers()
            .get("operation-location")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                EngineError::InvalidResponse("submission response has no Operation-Location".into())
            })?;

        let job_id = job_id_from_location(location).ok_or_else(|| {
            EngineError::InvalidResponse(format!("unexpected Operation-Location: {}", location))
        })?;
        debug!(
            "Submitted batch {} with {} targets ({})",
            job_id,
            request.targets.len(),
            request.access_mode.as_str()
        );
        Ok(job_id)
    }

    async fn get_status(&self, job_id: &str) -> Result<JobStatus, EngineError> {
        let status: AzBatchStatus = self.http.get_json("status", &self.batch_url(job_id)).await?;
        Ok(status.into_job_status())
    }

    async fn cancel(&self, job_id: &str) -> Result<(), EngineError> {
        self.http
            .send("cancel", self.http.client.delete(self.batch_url(job_id)))
            .await?;
        debug!("Cancellation requested for batch {}", job_id);
        Ok(())
    }

    fn list_document_outcomes(&self, job_id: &str) -> DocumentOutcomeStream {
        let pager = DocumentPager {
            http: self.http.clone(),
            next: Some(format!("{}/documents", self.batch_url(job_id))),
            buffer: VecDeque::new(),
        };

        stream::unfold(Some(pager), |state| async move {
            let Some(mut pager) = state else {
                return None;
            };
            loop {
                if let Some(outcome) = pager.buffer.pop_front() {
                    return Some((Ok(outcome), Some(pager)));
                }
                let Some(url) = pager.next.take() else {
                    return None;
                };
                match pager.http.get_json::<AzDocumentPage>("documents", &url).await {
                    Ok(page) => {
                        pager
                            .buffer
                            .extend(page.value.into_iter().map(AzDocumentStatus::into_outcome));
                        pager.next = page.next_link.filter(|link| !link.is_empty());
                    }
                    Err(e) => {
                        warn!("Failed to fetch document page {}: {}", url, e);
                        return Some((Err(e), None));
                    }
                }
            }
        })
        .boxed()
    }

    async fn list_supported_languages(&self) -> Result<Vec<LanguageInfo>, EngineError> {
        let url = format!(
            "{}/languages?api-version=3.0&scope=translation",
            self.languages_endpoint
        );
        let catalog: AzLanguageCatalog = self.http.get_json("languages", &url).await?;

        let mut languages: Vec<LanguageInfo> = catalog
            .translation
            .into_iter()
            .map(|(code, entry)| LanguageInfo {
                code,
                name: entry.name,
                native_name: entry.native_name,
            })
            .collect();
        languages.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(languages)
    }

    async fn list_supported_formats(&self) -> Result<Vec<FileFormat>, EngineError> {
        let url = format!("{}/{}/documents/formats", self.endpoint, BATCH_API_PATH);
        let formats: AzFormatList = self.http.get_json("formats", &url).await?;
        Ok(formats
            .value
            .into_iter()
            .map(|f| FileFormat {
                format: f.format,
                file_extensions: f.file_extensions,
                content_types: f.content_types,
            })
            .collect())
    }
}

struct DocumentPager {
    http: AuthorizedHttp,
    next: Option<String>,
    buffer: VecDeque<DocumentOutcome>,
}

/// Extracts the job id from an `Operation-Location` URL (`.../batches/{id}`).
fn job_id_from_location(location: &str) -> Option<String> {
    let path = location.split('?').next().unwrap_or(location);
    let (_, id) = path.trim_end_matches('/').rsplit_once("/batches/")?;
    if id.is_empty() || id.contains('/') {
        return None;
    }
    Some(id.to_string())
}

/// Maps a non-success response to a coded error.
async fn error_from_response(response: Response) -> EngineError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error_from_body(status, &body)
}

/// Throttling and server errors are transient whatever their body says;
/// anything else keeps the engine's error code.
fn error_from_body(status: StatusCode, body: &str) -> EngineError {
    let envelope = serde_json::from_str::<AzErrorEnvelope>(body).ok();

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return match envelope {
            Some(envelope) => EngineError::Unavailable(format!(
                "HTTP {}: {}: {}",
                status, envelope.error.code, envelope.error.message
            )),
            None => EngineError::Unavailable(format!("HTTP {}", status)),
        };
    }

    match envelope {
        Some(envelope) => EngineError::Rejected {
            status: status.as_u16(),
            code: envelope.error.code,
            inner_code: envelope.error.inner_error.map(|inner| inner.code),
            message: envelope.error.message,
        },
        None => EngineError::Rejected {
            status: status.as_u16(),
            code: format!("Http{}", status.as_u16()),
            inner_code: None,
            message: body.chars().take(200).collect(),
        },
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct BatchSubmission {
    inputs: Vec<AzBatchInput>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AzBatchInput {
    source: AzSource,
    targets: Vec<AzTarget>,
    storage_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AzSource {
    source_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AzTarget {
    target_url: String,
    language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    glossaries: Vec<AzGlossary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AzGlossary {
    glossary_url: String,
    format: String,
}

impl BatchSubmission {
    fn from_request(request: &TranslationRequest) -> Self {
        let input = AzBatchInput {
            source: AzSource {
                source_url: request.source.uri.clone(),
                language: request.source.language.clone(),
            },
            targets: request
                .targets
                .iter()
                .map(|t| AzTarget {
                    target_url: t.uri.clone(),
                    language: t.language.clone(),
                    category: t.category.clone(),
                    glossaries: t
                        .glossaries
                        .iter()
                        .map(|g| AzGlossary {
                            glossary_url: g.uri.clone(),
                            format: g.format.clone(),
                        })
                        .collect(),
                })
                .collect(),
            storage_type: "Folder",
        };
        Self {
            inputs: vec![input],
        }
    }
}

#[derive(Debug, Deserialize)]
struct AzErrorEnvelope {
    error: AzError,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzError {
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    inner_error: Option<AzInnerError>,
}

#[derive(Debug, Deserialize)]
struct AzInnerError {
    code: String,
}

impl AzError {
    fn into_info(self) -> ErrorInfo {
        ErrorInfo {
            code: self.code,
            message: self.message,
            inner_code: self.inner_error.map(|inner| inner.code),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzBatchStatus {
    id: String,
    created_date_time_utc: DateTime<Utc>,
    last_action_date_time_utc: DateTime<Utc>,
    status: String,
    #[serde(default)]
    error: Option<AzError>,
    #[serde(default)]
    summary: AzSummary,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzSummary {
    #[serde(default)]
    total: u32,
    #[serde(default)]
    failed: u32,
    #[serde(default)]
    success: u32,
    #[serde(default)]
    in_progress: u32,
    #[serde(default)]
    not_yet_started: u32,
    #[serde(default)]
    cancelled: u32,
    #[serde(default)]
    total_character_charged: u64,
}

impl AzBatchStatus {
    fn into_job_status(self) -> JobStatus {
        JobStatus {
            job_id: self.id,
            phase: JobPhase::from_engine(&self.status),
            counts: DocumentCounts {
                total: self.summary.total,
                succeeded: self.summary.success,
                failed: self.summary.failed,
                in_progress: self.summary.in_progress,
                not_started: self.summary.not_yet_started,
                cancelled: self.summary.cancelled,
            },
            billed_units: self.summary.total_character_charged,
            created_at: self.created_date_time_utc,
            last_modified: self.last_action_date_time_utc,
            error: self.error.map(AzError::into_info),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AzDocumentPage {
    #[serde(default)]
    value: Vec<AzDocumentStatus>,
    #[serde(rename = "@nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzDocumentStatus {
    #[serde(default)]
    path: Option<String>,
    source_path: String,
    status: String,
    to: String,
    #[serde(default)]
    character_charged: u64,
    #[serde(default)]
    error: Option<AzError>,
}

impl AzDocumentStatus {
    fn into_outcome(self) -> DocumentOutcome {
        DocumentOutcome {
            source_path: self.source_path,
            target_path: self.path,
            target_language: self.to,
            phase: JobPhase::from_engine(&self.status),
            billed_units: self.character_charged,
            error: self.error.map(AzError::into_info),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AzLanguageCatalog {
    #[serde(default)]
    translation: std::collections::BTreeMap<String, AzLanguage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzLanguage {
    name: String,
    #[serde(default)]
    native_name: String,
}

#[derive(Debug, Deserialize)]
struct AzFormatList {
    #[serde(default)]
    value: Vec<AzFormat>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzFormat {
    format: String,
    #[serde(default)]
    file_extensions: Vec<String>,
    #[serde(default)]
    content_types: Vec<String>,
}
