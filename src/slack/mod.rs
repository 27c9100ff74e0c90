//! Slack transport
//!
//! Web API client, Socket Mode connection, typed inbound events, view
//! builders and the handlers that route events into the analysis service.
//! Everything outside this module talks to Slack through [`ChatSurface`].

/// Web API client
pub mod api;
/// Inbound envelopes and event payloads
pub mod events;
/// Event handlers for commands, App Home and the message shortcut
pub mod handlers;
/// Socket Mode connection loop
pub mod socket;
/// Block Kit views
pub mod views;

use serde::Serialize;
use thiserror::Error;
use views::View;

pub use api::SlackClient;
pub use events::InboundEvent;
pub use handlers::EventHandler;
pub use socket::SocketModeClient;

/// Errors raised while talking to Slack
#[derive(Debug, Error)]
pub enum SlackError {
    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Slack answered with `ok: false`
    #[error("Slack API {method} failed: {error}")]
    Api {
        /// Web API method name
        method: String,
        /// Slack's error code
        error: String,
    },
    /// Non-success status from a plain HTTP endpoint such as a response URL
    #[error("Unexpected HTTP status {0}")]
    Status(u16),
    /// WebSocket connection failure
    #[error("WebSocket error: {0}")]
    WebSocket(String),
    /// Payload did not have the expected shape
    #[error("Malformed payload: {0}")]
    Payload(String),
}

/// A message to post into a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    /// Target channel id
    pub channel: String,
    /// `mrkdwn` text
    pub text: String,
    /// Parent message when replying in a thread
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

/// Outbound chat operations used by the bot
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ChatSurface: Send + Sync {
    /// Post a message (`chat.postMessage`)
    async fn post_message(&self, message: &OutgoingMessage) -> Result<(), SlackError>;

    /// Open a modal for an interaction (`views.open`), returning its view id
    async fn open_view(&self, trigger_id: &str, view: &View) -> Result<String, SlackError>;

    /// Replace the content of an open modal (`views.update`)
    async fn update_view(&self, view_id: &str, view: &View) -> Result<(), SlackError>;

    /// Publish a user's App Home tab (`views.publish`)
    async fn publish_home(&self, user_id: &str, view: &View) -> Result<(), SlackError>;

    /// Reply to a slash command through its response URL
    async fn respond(&self, response_url: &str, text: &str) -> Result<(), SlackError>;
}
