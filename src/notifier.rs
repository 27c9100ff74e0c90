//! Completion notifications
//!
//! Delivery is at most once per request: the tracked entry is removed before
//! the message is sent, and a second notify for the same id is a no-op.

use crate::analysis::AnalysisResult;
use crate::slack::{ChatSurface, OutgoingMessage};
use crate::tracker::RequestTracker;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Render the threaded completion message
#[must_use]
pub fn format_completion_message(
    result: &AnalysisResult,
    request_id: &str,
    user_id: &str,
) -> String {
    let verdict = result.verdict();
    let confidence = result.score.unwrap_or(0.0) * 100.0;
    format!(
        "{emoji} *Analysis Complete* - ID: `{request_id}`\n\
         <@{user_id}> Your content analysis is ready:\n\
         *Result:* {label}\n\
         *Confidence:* {confidence:.2}%",
        emoji = verdict.emoji(),
        label = verdict.label(),
    )
}

/// Posts completion messages
pub struct Notifier {
    surface: Arc<dyn ChatSurface>,
}

impl Notifier {
    /// Create a notifier posting through `surface`
    #[must_use]
    pub fn new(surface: Arc<dyn ChatSurface>) -> Self {
        Self { surface }
    }

    /// Deliver `result` for `request_id` and stop tracking it.
    ///
    /// Returns `false` if the request was no longer tracked. Delivery
    /// failures are logged and still count as handled.
    pub async fn notify(
        &self,
        tracker: &RequestTracker,
        request_id: &str,
        result: &AnalysisResult,
    ) -> bool {
        let Some(request) = tracker.take(request_id).await else {
            debug!(request_id, "Result for untracked request ignored");
            return false;
        };

        let message = OutgoingMessage {
            channel: request.channel_id,
            text: format_completion_message(result, request_id, &request.user_id),
            thread_ts: request.thread_ts,
        };

        match self.surface.post_message(&message).await {
            Ok(()) => info!(request_id, status = %result.status, "Analysis result delivered"),
            Err(e) => warn!(request_id, error = %e, "Failed to deliver analysis result"),
        }
        true
    }
}
