//! Analysis service seam
//!
//! [`AnalysisClient`] is the per-user handle the rest of the bot talks to;
//! [`ClientFactory`] builds one from an API key. The production implementation
//! lives in [`reality_defender`].

mod http;
/// HTTP client for the Reality Defender API
pub mod reality_defender;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub use http::create_http_client;
pub use reality_defender::{RealityDefenderClient, RealityDefenderFactory};

/// Errors that can occur while talking to the analysis service
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Error returned by the service's API
    #[error("API error: {0}")]
    ApiError(String),
    /// Error during network communication
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Error during JSON deserialization
    #[error("JSON error: {0}")]
    JsonError(String),
    /// Local media file could not be read
    #[error("File error: {0}")]
    FileError(String),
    /// Result still not terminal after the attempt budget
    #[error("No terminal result for {request_id} after {attempts} attempts")]
    PollExhausted {
        /// Request that was being polled
        request_id: String,
        /// Attempts made before giving up
        attempts: u32,
    },
}

/// Identifiers returned by a successful submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// Analysis request id, unique across the service
    pub request_id: String,
    /// Opaque media handle
    pub media_id: String,
}

/// Terminal result of one analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Service status, e.g. `AUTHENTIC`, `MANIPULATED`, `UNKNOWN`
    pub status: String,
    /// Confidence in `0.0..=1.0`, absent when the service reports none
    #[serde(default)]
    pub score: Option<f64>,
}

impl AnalysisResult {
    /// Build a result from a status and optional score
    #[must_use]
    pub fn new(status: impl Into<String>, score: Option<f64>) -> Self {
        Self {
            status: status.into(),
            score,
        }
    }

    /// Bucket the status into a verdict
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        Verdict::from_status(&self.status)
    }
}

/// Categorical outcome derived from a result status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Manipulated or synthetic content; carries the upper-cased status
    Detected(String),
    /// Content judged authentic
    Authentic,
    /// Anything else
    Indeterminate,
}

impl Verdict {
    /// Classify a raw service status (case-insensitive)
    #[must_use]
    pub fn from_status(status: &str) -> Self {
        let status = status.trim().to_ascii_uppercase();
        match status.as_str() {
            "MANIPULATED" | "ARTIFICIAL" | "FAKE" => Self::Detected(status),
            "AUTHENTIC" => Self::Authentic,
            _ => Self::Indeterminate,
        }
    }

    /// Emoji prefix for the completion message
    #[must_use]
    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Detected(_) => "⚠️",
            Self::Authentic => "✅",
            Self::Indeterminate => "❓",
        }
    }

    /// Human-readable label for the completion message
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Detected(status) => format!("{status} CONTENT DETECTED"),
            Self::Authentic => "Content appears authentic".to_string(),
            Self::Indeterminate => {
                "Could not determine content authenticity. Please try again later.".to_string()
            }
        }
    }
}

/// A client bound to one user's API key
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Upload a local media file for analysis
    async fn submit(&self, path: &Path) -> Result<SubmitReceipt, AnalysisError>;

    /// Wait for the terminal result of `request_id`, checking at most
    /// `max_attempts` times
    async fn poll_for_result(
        &self,
        request_id: &str,
        max_attempts: u32,
    ) -> Result<AnalysisResult, AnalysisError>;
}

/// Builds analysis clients from API keys
#[cfg_attr(test, mockall::automock)]
pub trait ClientFactory: Send + Sync {
    /// Construct a client for `api_key`; the key is not validated here
    fn create(&self, api_key: &str) -> Arc<dyn AnalysisClient>;
}
