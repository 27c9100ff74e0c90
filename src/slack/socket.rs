//! Socket Mode connection loop.
//!
//! Opens a websocket from `apps.connections.open`, acknowledges every
//! envelope as soon as it arrives and hands the parsed event to the
//! [`EventHandler`] on its own tracked task. Dropped connections are
//! re-established with a capped exponential backoff.

use super::events::{Envelope, InboundEvent};
use super::handlers::EventHandler;
use super::{SlackClient, SlackError};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const STABLE_SESSION: Duration = Duration::from_secs(60);

/// How a websocket session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Cancellation requested
    Shutdown,
    /// Slack asked for a reconnect
    Reconnect,
    /// Stream ended or the server closed it
    Closed,
}

/// Socket Mode client
pub struct SocketModeClient {
    slack: Arc<SlackClient>,
    handler: Arc<EventHandler>,
    tasks: TaskTracker,
}

impl SocketModeClient {
    /// Create a client dispatching to `handler`
    #[must_use]
    pub fn new(slack: Arc<SlackClient>, handler: Arc<EventHandler>) -> Self {
        Self {
            slack,
            handler,
            tasks: TaskTracker::new(),
        }
    }

    /// Handle `event` on a tracked task
    pub fn dispatch(&self, event: InboundEvent) {
        let handler = Arc::clone(&self.handler);
        self.tasks.spawn(async move {
            handler.handle(event).await;
        });
    }

    /// Wait up to `timeout` for dispatched handlers to finish.
    ///
    /// Returns `false` if some were still running when the timeout elapsed.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tasks.close();
        let outstanding = self.tasks.len();
        if outstanding > 0 {
            info!(outstanding, "Waiting for in-flight Slack handlers");
        }
        tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok()
    }

    /// Keep a session open until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut backoff = INITIAL_BACKOFF;

        while !cancel.is_cancelled() {
            info!("Starting Slack Socket Mode client");
            let started = Instant::now();

            match self.session(&cancel).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Reconnect) => {
                    backoff = INITIAL_BACKOFF;
                    continue;
                }
                Ok(SessionEnd::Closed) => info!("Slack WebSocket closed"),
                Err(e) => warn!(error = %e, "Slack Socket Mode session failed"),
            }

            if started.elapsed() >= STABLE_SESSION {
                backoff = INITIAL_BACKOFF;
            }
            warn!(backoff_secs = backoff.as_secs(), "Reconnecting to Slack");

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }

        info!("Slack Socket Mode client stopped");
    }

    async fn session(&self, cancel: &CancellationToken) -> Result<SessionEnd, SlackError> {
        let url = self.slack.open_connection().await?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| SlackError::WebSocket(e.to_string()))?;
        info!("Slack WebSocket connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        loop {
            let frame = tokio::select! {
                () = cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
                frame = ws_rx.next() => frame,
            };

            let Some(frame) = frame else {
                return Ok(SessionEnd::Closed);
            };

            match frame.map_err(|e| SlackError::WebSocket(e.to_string()))? {
                Message::Text(text) => {
                    let envelope: Envelope = match serde_json::from_str(text.as_str()) {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            warn!(error = %e, "Failed to parse Slack envelope");
                            continue;
                        }
                    };

                    if let Some(envelope_id) = &envelope.envelope_id {
                        let ack = json!({ "envelope_id": envelope_id }).to_string();
                        if let Err(e) = ws_tx.send(Message::Text(ack.into())).await {
                            warn!(error = %e, "Failed to ack envelope");
                        }
                    }

                    match InboundEvent::from_envelope(&envelope) {
                        Ok(InboundEvent::Disconnect { reason }) => {
                            info!(reason = %reason, "Slack requested disconnect");
                            return Ok(SessionEnd::Reconnect);
                        }
                        Ok(event) => self.dispatch(event),
                        Err(e) => {
                            warn!(kind = %envelope.kind, error = %e, "Unreadable Slack envelope");
                        }
                    }
                }
                Message::Ping(data) => {
                    let _ = ws_tx.send(Message::Pong(data)).await;
                }
                Message::Close(_) => return Ok(SessionEnd::Closed),
                _ => {}
            }
        }
    }
}
