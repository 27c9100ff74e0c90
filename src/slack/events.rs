//! Inbound Socket Mode payloads
//!
//! Every websocket frame is an [`Envelope`]. [`InboundEvent::from_envelope`]
//! turns the ones the bot cares about into typed events, one parser per
//! envelope kind. Unknown fields are ignored throughout.

use super::SlackError;
use serde::Deserialize;
use serde_json::Value;

/// Callback id of the "analyze" message shortcut
pub const ANALYZE_CALLBACK_ID: &str = "analyze";

/// Raw Socket Mode frame
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    /// Id to echo back as acknowledgement
    #[serde(default)]
    pub envelope_id: Option<String>,
    /// `hello`, `disconnect`, `events_api`, `interactive`, `slash_commands`
    #[serde(rename = "type")]
    pub kind: String,
    /// Kind-specific payload
    #[serde(default)]
    pub payload: Option<Value>,
    /// Disconnect reason
    #[serde(default)]
    pub reason: Option<String>,
}

/// Slash command invocation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SlashCommand {
    /// Command name including the slash
    pub command: String,
    /// Everything after the command name
    #[serde(default)]
    pub text: String,
    /// Invoking user
    pub user_id: String,
    /// Channel the command was typed in
    #[serde(default)]
    pub channel_id: String,
    /// URL for delayed replies
    pub response_url: String,
}

/// `image` layout block inside a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MessageBlock {
    /// Block type; only `image` is of interest
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Externally hosted image
    #[serde(default)]
    pub image_url: Option<String>,
    /// Slack-hosted image
    #[serde(default)]
    pub slack_file: Option<SlackFileRef>,
}

/// Reference to a Slack-hosted file inside a block
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SlackFileRef {
    /// Direct URL
    #[serde(default)]
    pub url: Option<String>,
}

/// File attached to a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SlackFile {
    /// Short type such as `png` or `mp4`
    #[serde(default)]
    pub filetype: Option<String>,
    /// Authenticated download URL
    #[serde(default)]
    pub url_private_download: Option<String>,
    /// Authenticated view URL
    #[serde(default)]
    pub url_private: Option<String>,
}

/// Message a shortcut was invoked on
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SlackMessage {
    /// Message timestamp
    #[serde(default)]
    pub ts: Option<String>,
    /// Parent timestamp when the message is a thread reply
    #[serde(default)]
    pub thread_ts: Option<String>,
    /// Layout blocks
    #[serde(default)]
    pub blocks: Vec<MessageBlock>,
    /// Attached files
    #[serde(default)]
    pub files: Vec<SlackFile>,
}

/// Id-only reference used for users and channels
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IdRef {
    /// Slack id
    #[serde(default)]
    pub id: String,
}

/// Message shortcut (`message_action`) payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageShortcut {
    /// Shortcut identifier configured in the app manifest
    pub callback_id: String,
    /// Short-lived token for `views.open`
    pub trigger_id: String,
    /// Invoking user
    pub user: IdRef,
    /// Channel holding the message
    #[serde(default)]
    pub channel: IdRef,
    /// Timestamp of the message
    #[serde(default)]
    pub message_ts: Option<String>,
    /// The message itself
    #[serde(default)]
    pub message: SlackMessage,
}

impl MessageShortcut {
    /// Thread to reply under: the message's thread if it is a reply, else the
    /// message itself.
    #[must_use]
    pub fn thread_anchor(&self) -> Option<String> {
        self.message
            .thread_ts
            .clone()
            .or_else(|| self.message_ts.clone())
            .or_else(|| self.message.ts.clone())
    }
}

/// Typed inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Slash command
    SlashCommand(SlashCommand),
    /// A user opened the App Home tab
    HomeOpened {
        /// User who opened it
        user_id: String,
    },
    /// Message shortcut
    MessageShortcut(MessageShortcut),
    /// Connection greeting
    Hello,
    /// Slack asks the client to reconnect
    Disconnect {
        /// Reason given by Slack
        reason: String,
    },
    /// Anything else; carries a short description for logging
    Ignored(String),
}

impl InboundEvent {
    /// Parse an envelope into an event.
    ///
    /// # Errors
    ///
    /// Returns `SlackError::Payload` when a relevant payload is missing or
    /// does not deserialize.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, SlackError> {
        match envelope.kind.as_str() {
            "hello" => Ok(Self::Hello),
            "disconnect" => Ok(Self::Disconnect {
                reason: envelope
                    .reason
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            }),
            "slash_commands" => parse_slash_command(payload_of(envelope)?),
            "events_api" => parse_events_api(payload_of(envelope)?),
            "interactive" => parse_interactive(payload_of(envelope)?),
            other => Ok(Self::Ignored(format!("envelope type {other}"))),
        }
    }
}

fn payload_of(envelope: &Envelope) -> Result<&Value, SlackError> {
    envelope
        .payload
        .as_ref()
        .ok_or_else(|| SlackError::Payload(format!("{} envelope without payload", envelope.kind)))
}

fn deserialize<T: for<'de> Deserialize<'de>>(value: &Value) -> Result<T, SlackError> {
    T::deserialize(value).map_err(|e| SlackError::Payload(e.to_string()))
}

fn parse_slash_command(payload: &Value) -> Result<InboundEvent, SlackError> {
    deserialize(payload).map(InboundEvent::SlashCommand)
}

fn parse_events_api(payload: &Value) -> Result<InboundEvent, SlackError> {
    let event = payload
        .get("event")
        .ok_or_else(|| SlackError::Payload("events_api payload without event".to_string()))?;

    match event.get("type").and_then(Value::as_str) {
        Some("app_home_opened") => {
            let user_id = event
                .get("user")
                .and_then(Value::as_str)
                .ok_or_else(|| SlackError::Payload("app_home_opened without user".to_string()))?;
            Ok(InboundEvent::HomeOpened {
                user_id: user_id.to_string(),
            })
        }
        other => Ok(InboundEvent::Ignored(format!(
            "event {}",
            other.unwrap_or("<untyped>")
        ))),
    }
}

fn parse_interactive(payload: &Value) -> Result<InboundEvent, SlackError> {
    match payload.get("type").and_then(Value::as_str) {
        Some("message_action") => deserialize(payload).map(InboundEvent::MessageShortcut),
        other => Ok(InboundEvent::Ignored(format!(
            "interaction {}",
            other.unwrap_or("<untyped>")
        ))),
    }
}
