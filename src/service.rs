//! Analysis service
//!
//! Owns the credential registry and request tracker and exposes the
//! operations the Slack handlers and the poller need.

use crate::analysis::AnalysisResult;
use crate::intake::{extract_media_urls, AnalysisRequest, IntakeError, MediaIntake};
use crate::notifier::Notifier;
use crate::registry::CredentialRegistry;
use crate::tracker::RequestTracker;

/// Shared state and operations of the bot
pub struct AnalysisService {
    registry: CredentialRegistry,
    tracker: RequestTracker,
    intake: MediaIntake,
    notifier: Notifier,
}

impl AnalysisService {
    /// Assemble the service with an empty tracker
    #[must_use]
    pub fn new(registry: CredentialRegistry, intake: MediaIntake, notifier: Notifier) -> Self {
        Self {
            registry,
            tracker: RequestTracker::new(),
            intake,
            notifier,
        }
    }

    /// Credential registry
    #[must_use]
    pub fn registry(&self) -> &CredentialRegistry {
        &self.registry
    }

    /// Request tracker
    #[must_use]
    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    /// Register or replace `user_id`'s API key
    pub async fn register_user(&self, user_id: &str, api_key: &str) {
        self.registry.register(user_id, api_key).await;
    }

    /// Reject `request` early when it cannot be analysed.
    ///
    /// Only looks at the registry and the message, so it is fast enough to
    /// run before answering an interaction.
    ///
    /// # Errors
    ///
    /// `UserNotConfigured` or `UnsupportedContent`.
    pub async fn screen(&self, request: &AnalysisRequest) -> Result<(), IntakeError> {
        if !self.registry.is_registered(&request.user_id).await {
            return Err(IntakeError::UserNotConfigured(request.user_id.clone()));
        }
        if extract_media_urls(&request.message).is_empty() {
            return Err(IntakeError::UnsupportedContent);
        }
        Ok(())
    }

    /// Submit the media of `request`.
    ///
    /// # Errors
    ///
    /// See [`MediaIntake::submit`].
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<Vec<String>, IntakeError> {
        self.intake.submit(&self.registry, &self.tracker, request).await
    }

    /// Deliver a terminal result; `false` if it was already delivered
    pub async fn notify(&self, request_id: &str, result: &AnalysisResult) -> bool {
        self.notifier.notify(&self.tracker, request_id, result).await
    }

    /// Reply text for `/analysis-status`.
    ///
    /// An empty query lists the caller's active ids; otherwise the status of
    /// one id is shown if the caller owns it.
    pub async fn status_report(&self, user_id: &str, query: &str) -> String {
        let request_id = query.trim();

        if request_id.is_empty() {
            let ids: Vec<String> = self
                .tracker
                .requests_for_user(user_id)
                .await
                .into_iter()
                .map(|request| request.request_id)
                .collect();
            return if ids.is_empty() {
                "You have no active analyses.".to_string()
            } else {
                format!("Your active analyses: {}", ids.join(", "))
            };
        }

        match self.tracker.get(request_id).await {
            Some(request) if request.user_id == user_id => {
                format!("Analysis `{request_id}` status: {}", request.status)
            }
            Some(_) => "Analysis not found or you don't have permission to view it.".to_string(),
            None => format!("Analysis `{request_id}` not found or completed."),
        }
    }
}
