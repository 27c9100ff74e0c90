//! Reality Defender API client.
//!
//! Submission is a two-step presigned upload: request a signed URL for the
//! file name, then `PUT` the bytes there. Results are read from the media
//! endpoint until the summary status leaves `ANALYZING`.

use super::http::{create_http_client, error_from_response, parse_json};
use super::{AnalysisClient, AnalysisError, AnalysisResult, ClientFactory, SubmitReceipt};
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

const API_KEY_HEADER: &str = "X-API-KEY";
const STATUS_ANALYZING: &str = "ANALYZING";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresignedResponse {
    response: SignedUrl,
    request_id: String,
    media_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedUrl {
    signed_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaResponse {
    #[serde(default)]
    results_summary: Option<ResultsSummary>,
}

#[derive(Debug, Deserialize)]
struct ResultsSummary {
    status: String,
    #[serde(default)]
    metadata: Option<SummaryMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryMetadata {
    #[serde(default)]
    final_score: Option<f64>,
}

/// Normalise a results summary; `None` while the analysis is still running.
fn terminal_result(summary: ResultsSummary) -> Option<AnalysisResult> {
    let status = summary.status.trim().to_ascii_uppercase();
    if status == STATUS_ANALYZING {
        return None;
    }

    let status = if status == "FAKE" {
        "MANIPULATED".to_string()
    } else {
        status
    };
    // The API reports percentages
    let score = summary
        .metadata
        .and_then(|m| m.final_score)
        .map(|score| score / 100.0);

    Some(AnalysisResult { status, score })
}

/// Client bound to one API key
pub struct RealityDefenderClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
    poll_delay: Duration,
}

impl RealityDefenderClient {
    /// Create a client sharing `http`'s connection pool
    #[must_use]
    pub fn new(http: HttpClient, base_url: &str, api_key: &str, poll_delay: Duration) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            poll_delay,
        }
    }

    async fn request_signed_url(
        &self,
        file_name: &str,
    ) -> Result<PresignedResponse, AnalysisError> {
        let response = self
            .http
            .post(format!("{}/api/files/aws-presigned", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&json!({ "fileName": file_name }))
            .send()
            .await
            .map_err(|e| AnalysisError::NetworkError(e.to_string()))?;

        parse_json(response).await
    }

    async fn upload_bytes(&self, signed_url: &str, bytes: Vec<u8>) -> Result<(), AnalysisError> {
        let response = self
            .http
            .put(signed_url)
            .body(bytes)
            .send()
            .await
            .map_err(|e| AnalysisError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    /// One result-status check; `Ok(None)` means not finished yet.
    async fn fetch_result(
        &self,
        request_id: &str,
    ) -> Result<Option<AnalysisResult>, AnalysisError> {
        let response = self
            .http
            .get(format!("{}/api/media/users/{request_id}", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| AnalysisError::NetworkError(e.to_string()))?;

        // The media record appears shortly after upload
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let media: MediaResponse = parse_json(response).await?;
        Ok(media.results_summary.and_then(terminal_result))
    }
}

#[async_trait::async_trait]
impl AnalysisClient for RealityDefenderClient {
    #[instrument(skip(self))]
    async fn submit(&self, path: &Path) -> Result<SubmitReceipt, AnalysisError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                AnalysisError::FileError(format!("no file name in {}", path.display()))
            })?;

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AnalysisError::FileError(e.to_string()))?;

        let presigned = self.request_signed_url(&file_name).await?;
        self.upload_bytes(&presigned.response.signed_url, bytes).await?;

        info!(
            request_id = %presigned.request_id,
            media_id = %presigned.media_id,
            "Media uploaded for analysis"
        );

        Ok(SubmitReceipt {
            request_id: presigned.request_id,
            media_id: presigned.media_id,
        })
    }

    #[instrument(skip(self))]
    async fn poll_for_result(
        &self,
        request_id: &str,
        max_attempts: u32,
    ) -> Result<AnalysisResult, AnalysisError> {
        for attempt in 1..=max_attempts {
            if let Some(result) = self.fetch_result(request_id).await? {
                debug!(attempt, status = %result.status, "Terminal result received");
                return Ok(result);
            }

            debug!(attempt, max_attempts, "Analysis still running");
            if attempt < max_attempts {
                tokio::time::sleep(self.poll_delay).await;
            }
        }

        Err(AnalysisError::PollExhausted {
            request_id: request_id.to_string(),
            attempts: max_attempts,
        })
    }
}

/// Builds [`RealityDefenderClient`]s that share one HTTP pool
pub struct RealityDefenderFactory {
    http: HttpClient,
    base_url: String,
    poll_delay: Duration,
}

impl RealityDefenderFactory {
    /// Create a factory for `base_url`; `timeout` applies per connect and per read
    #[must_use]
    pub fn new(base_url: &str, timeout: Duration, poll_delay: Duration) -> Self {
        Self {
            http: create_http_client(timeout),
            base_url: base_url.to_string(),
            poll_delay,
        }
    }
}

impl ClientFactory for RealityDefenderFactory {
    fn create(&self, api_key: &str) -> Arc<dyn AnalysisClient> {
        Arc::new(RealityDefenderClient::new(
            self.http.clone(),
            &self.base_url,
            api_key,
            self.poll_delay,
        ))
    }
}
