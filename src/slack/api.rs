//! Slack Web API client
//!
//! Thin JSON-over-HTTPS wrapper: every call is a POST with a bearer token and
//! Slack's `{"ok": bool, "error": ...}` envelope is checked before returning.

use super::views::View;
use super::{ChatSurface, OutgoingMessage, SlackError};
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use tracing::debug;

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Authenticated Web API client
pub struct SlackClient {
    http: HttpClient,
    api_base: String,
    bot_token: String,
    app_token: String,
}

impl SlackClient {
    /// Create a client for the given bot and app-level tokens
    #[must_use]
    pub fn new(http: HttpClient, bot_token: &str, app_token: &str) -> Self {
        Self {
            http,
            api_base: SLACK_API_BASE.to_string(),
            bot_token: bot_token.to_string(),
            app_token: app_token.to_string(),
        }
    }

    /// Point the client at another Web API root
    #[must_use]
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    /// Bot token, needed to download Slack-hosted files
    #[must_use]
    pub fn bot_token(&self) -> &str {
        &self.bot_token
    }

    /// Call `apps.connections.open` to get a Socket Mode URL.
    ///
    /// # Errors
    ///
    /// Returns `SlackError` if the request fails or Slack rejects the app token.
    pub async fn open_connection(&self) -> Result<String, SlackError> {
        let response = self
            .http
            .post(format!("{}/apps.connections.open", self.api_base))
            .bearer_auth(&self.app_token)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .send()
            .await?;

        let body = check_ok("apps.connections.open", response.json().await?)?;
        body.get("url")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| SlackError::Payload("no url in apps.connections.open response".into()))
    }

    /// POST a JSON body to a Web API method with the bot token.
    async fn api_post(&self, method: &str, body: &Value) -> Result<Value, SlackError> {
        debug!(method, "Calling Slack API");
        let response = self
            .http
            .post(format!("{}/{method}", self.api_base))
            .bearer_auth(&self.bot_token)
            .json(body)
            .send()
            .await?;

        check_ok(method, response.json().await?)
    }
}

fn check_ok(method: &str, body: Value) -> Result<Value, SlackError> {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(body);
    }
    let error = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    Err(SlackError::Api {
        method: method.to_string(),
        error,
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, SlackError> {
    serde_json::to_value(value).map_err(|e| SlackError::Payload(e.to_string()))
}

#[async_trait::async_trait]
impl ChatSurface for SlackClient {
    async fn post_message(&self, message: &OutgoingMessage) -> Result<(), SlackError> {
        self.api_post("chat.postMessage", &to_json(message)?).await?;
        Ok(())
    }

    async fn open_view(&self, trigger_id: &str, view: &View) -> Result<String, SlackError> {
        let body = json!({ "trigger_id": trigger_id, "view": to_json(view)? });
        let response = self.api_post("views.open", &body).await?;
        response
            .pointer("/view/id")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| SlackError::Payload("no view id in views.open response".into()))
    }

    async fn update_view(&self, view_id: &str, view: &View) -> Result<(), SlackError> {
        let body = json!({ "view_id": view_id, "view": to_json(view)? });
        self.api_post("views.update", &body).await?;
        Ok(())
    }

    async fn publish_home(&self, user_id: &str, view: &View) -> Result<(), SlackError> {
        let body = json!({ "user_id": user_id, "view": to_json(view)? });
        self.api_post("views.publish", &body).await?;
        Ok(())
    }

    async fn respond(&self, response_url: &str, text: &str) -> Result<(), SlackError> {
        let response = self
            .http
            .post(response_url)
            .json(&json!({ "response_type": "ephemeral", "text": text }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SlackError::Status(status.as_u16()))
        }
    }
}
