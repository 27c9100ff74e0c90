//! Event handlers
//!
//! Each handler is a boundary: failures are logged here and turned into a
//! user-facing reply, never propagated to the socket loop.

use super::events::{InboundEvent, MessageShortcut, SlashCommand, ANALYZE_CALLBACK_ID};
use super::views::{self, View};
use super::ChatSurface;
use crate::intake::{AnalysisRequest, IntakeError};
use crate::service::AnalysisService;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const SETUP_USAGE: &str = "Usage: `/setup-rd <your Reality Defender API key>`";

/// Routes inbound events to the analysis service
pub struct EventHandler {
    service: Arc<AnalysisService>,
    surface: Arc<dyn ChatSurface>,
}

impl EventHandler {
    /// Create a handler replying through `surface`
    #[must_use]
    pub fn new(service: Arc<AnalysisService>, surface: Arc<dyn ChatSurface>) -> Self {
        Self { service, surface }
    }

    /// Handle one event
    pub async fn handle(&self, event: InboundEvent) {
        match event {
            InboundEvent::SlashCommand(command) => self.handle_command(&command).await,
            InboundEvent::HomeOpened { user_id } => self.handle_home_opened(&user_id).await,
            InboundEvent::MessageShortcut(shortcut) => self.handle_shortcut(&shortcut).await,
            InboundEvent::Hello => info!("Slack Socket Mode hello received"),
            InboundEvent::Disconnect { reason } => {
                debug!(reason = %reason, "Disconnect envelope reached handler");
            }
            InboundEvent::Ignored(what) => debug!(what = %what, "Ignoring Slack event"),
        }
    }

    /// Reply text for a slash command
    pub async fn command_reply(&self, command: &SlashCommand) -> String {
        match command.command.as_str() {
            "/setup-rd" | "/configure-rd" => {
                let api_key = command.text.trim();
                if api_key.is_empty() {
                    return SETUP_USAGE.to_string();
                }
                self.service.register_user(&command.user_id, api_key).await;
                "Your user has been registered.".to_string()
            }
            "/analysis-status" => {
                self.service
                    .status_report(&command.user_id, &command.text)
                    .await
            }
            "/analyze" => "Command unavailable".to_string(),
            other => {
                debug!(command = other, "Unknown slash command");
                format!("Unknown command `{other}`")
            }
        }
    }

    #[instrument(skip_all, fields(command = %command.command, user_id = %command.user_id))]
    async fn handle_command(&self, command: &SlashCommand) {
        let reply = self.command_reply(command).await;
        if let Err(e) = self.surface.respond(&command.response_url, &reply).await {
            warn!(error = %e, "Failed to answer slash command");
        }
    }

    async fn handle_home_opened(&self, user_id: &str) {
        let view = if self.service.registry().is_registered(user_id).await {
            views::home_configured()
        } else {
            views::home_first_boot()
        };

        if let Err(e) = self.surface.publish_home(user_id, &view).await {
            warn!(user_id, error = %e, "Failed to publish App Home");
        }
    }

    #[instrument(skip_all, fields(user_id = %shortcut.user.id, channel_id = %shortcut.channel.id))]
    async fn handle_shortcut(&self, shortcut: &MessageShortcut) {
        if shortcut.callback_id != ANALYZE_CALLBACK_ID {
            debug!(callback_id = %shortcut.callback_id, "Ignoring unknown shortcut");
            return;
        }

        let request = AnalysisRequest::from_shortcut(shortcut);
        if let Err(e) = self.service.screen(&request).await {
            self.open_modal(&shortcut.trigger_id, &rejection_view(&e)).await;
            return;
        }

        // Answer inside the trigger's lifetime, before any download starts
        let view_id = self
            .open_modal(&shortcut.trigger_id, &views::analysis_acknowledged())
            .await;

        match self.service.analyze(&request).await {
            Ok(request_ids) => {
                info!(submitted = request_ids.len(), "Media submitted for analysis");
            }
            Err(e) => {
                warn!(error = %e, "Analysis request failed");
                let Some(view_id) = view_id else {
                    return;
                };
                if let Err(e) = self.surface.update_view(&view_id, &rejection_view(&e)).await {
                    warn!(error = %e, "Failed to update analysis modal");
                }
            }
        }
    }

    async fn open_modal(&self, trigger_id: &str, view: &View) -> Option<String> {
        match self.surface.open_view(trigger_id, view).await {
            Ok(view_id) => Some(view_id),
            Err(e) => {
                warn!(error = %e, "Failed to open modal");
                None
            }
        }
    }
}

fn rejection_view(error: &IntakeError) -> View {
    match error {
        IntakeError::UserNotConfigured(_) => views::user_unavailable(),
        IntakeError::UnsupportedContent => views::unsupported_content(),
        IntakeError::Download(_) | IntakeError::Submission(_) => views::analysis_failed(),
    }
}
