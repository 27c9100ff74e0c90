//! HTTP helpers shared by the analysis client
//!
//! Turns non-success responses into readable `AnalysisError`s without leaking
//! raw proxy HTML into logs.

use super::AnalysisError;
use reqwest::{Client as HttpClient, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

const MAX_ERROR_BODY_CHARS: usize = 500;

/// Creates an HTTP client for media transfers.
///
/// `timeout` bounds connecting and each read of the body, so a large upload
/// or download may take longer as long as it keeps making progress.
#[must_use]
pub fn create_http_client(timeout: Duration) -> HttpClient {
    HttpClient::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Converts a failed response into `AnalysisError::ApiError`.
pub async fn error_from_response(response: Response) -> AnalysisError {
    let status = response.status();
    let error_text = response.text().await.unwrap_or_default();
    AnalysisError::ApiError(clean_error_message(status.as_u16(), &error_text))
}

fn clean_error_message(status: u16, body: &str) -> String {
    let trimmed = body.trim_start();
    let is_html = trimmed.starts_with("<!DOCTYPE")
        || trimmed.starts_with("<html")
        || trimmed.starts_with("<HTML");

    if is_html {
        return format!("{status} (Server returned HTML error page)");
    }

    if body.chars().count() > MAX_ERROR_BODY_CHARS {
        let truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{status} - {truncated}... (truncated)")
    } else {
        format!("{status} - {body}")
    }
}

/// Checks the status and parses a JSON body.
///
/// # Errors
///
/// Returns `AnalysisError::ApiError` on non-success status codes and
/// `AnalysisError::JsonError` if the body does not match `T`.
pub async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, AnalysisError> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }

    response
        .json()
        .await
        .map_err(|e| AnalysisError::JsonError(e.to_string()))
}
