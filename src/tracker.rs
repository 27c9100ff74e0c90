//! Request tracker
//!
//! In-memory table of analysis requests awaiting a result. Intake inserts
//! entries as `Pending`, the poller flips them to `InFlight` and the notifier
//! removes them. Every transition happens under one mutex.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::Mutex;

/// Lifecycle state of a tracked request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Submitted, no fetch started
    Pending,
    /// A result fetch is running
    InFlight,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::InFlight => f.write_str("processing"),
        }
    }
}

/// Chat context needed to deliver one analysis result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedRequest {
    /// Request id assigned by the analysis service
    pub request_id: String,
    /// Slack user who asked for the analysis
    pub user_id: String,
    /// Media handle returned on submission
    pub media_id: String,
    /// Channel of the analysed message
    pub channel_id: String,
    /// Thread the result is posted under
    pub thread_ts: Option<String>,
    /// Current lifecycle state
    pub status: RequestStatus,
}

impl TrackedRequest {
    /// New `Pending` request
    #[must_use]
    pub fn pending(
        request_id: impl Into<String>,
        user_id: impl Into<String>,
        media_id: impl Into<String>,
        channel_id: impl Into<String>,
        thread_ts: Option<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            user_id: user_id.into(),
            media_id: media_id.into(),
            channel_id: channel_id.into(),
            thread_ts,
            status: RequestStatus::Pending,
        }
    }
}

/// Table of tracked requests keyed by request id
#[derive(Default)]
pub struct RequestTracker {
    requests: Mutex<HashMap<String, TrackedRequest>>,
}

impl RequestTracker {
    /// Empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request, replacing any entry with the same id
    pub async fn insert(&self, request: TrackedRequest) {
        let mut requests = self.requests.lock().await;
        requests.insert(request.request_id.clone(), request);
    }

    /// Ids currently tracked, in no particular order
    pub async fn snapshot_ids(&self) -> Vec<String> {
        let requests = self.requests.lock().await;
        requests.keys().cloned().collect()
    }

    /// Copy of one entry
    pub async fn get(&self, request_id: &str) -> Option<TrackedRequest> {
        let requests = self.requests.lock().await;
        requests.get(request_id).cloned()
    }

    /// Move `request_id` from `Pending` to `InFlight`.
    ///
    /// Returns `false` when the entry is gone or already in flight, so at
    /// most one caller wins per request.
    pub async fn begin_fetch(&self, request_id: &str) -> bool {
        let mut requests = self.requests.lock().await;
        match requests.get_mut(request_id) {
            Some(request) if request.status == RequestStatus::Pending => {
                request.status = RequestStatus::InFlight;
                true
            }
            _ => false,
        }
    }

    /// Remove and return an entry
    pub async fn take(&self, request_id: &str) -> Option<TrackedRequest> {
        let mut requests = self.requests.lock().await;
        requests.remove(request_id)
    }

    /// Entries owned by `user_id`, sorted by request id
    pub async fn requests_for_user(&self, user_id: &str) -> Vec<TrackedRequest> {
        let mut owned: Vec<TrackedRequest> = {
            let requests = self.requests.lock().await;
            requests
                .values()
                .filter(|request| request.user_id == user_id)
                .cloned()
                .collect()
        };
        owned.sort_by(|a, b| a.request_id.cmp(&b.request_id));
        owned
    }

    /// Number of tracked requests
    pub async fn len(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// Whether nothing is tracked
    pub async fn is_empty(&self) -> bool {
        self.requests.lock().await.is_empty()
    }
}
