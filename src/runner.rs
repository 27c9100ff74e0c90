//! Process wiring
//!
//! Builds the service graph from [`Settings`], runs the Socket Mode client
//! and the result poller side by side, and shuts both down on Ctrl-C or
//! SIGTERM after their in-flight work drains.

use crate::analysis::{create_http_client, RealityDefenderFactory};
use crate::config::{Settings, SHUTDOWN_DRAIN_TIMEOUT_SECS};
use crate::intake::{HttpDownloader, MediaIntake};
use crate::notifier::Notifier;
use crate::poller::ResultPoller;
use crate::registry::CredentialRegistry;
use crate::service::AnalysisService;
use crate::slack::{EventHandler, SlackClient, SocketModeClient};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run the bot until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built or the download
/// directory cannot be created.
pub async fn run(settings: &Settings) -> anyhow::Result<()> {
    let http = reqwest::Client::builder()
        .timeout(settings.http_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    let download_dir = settings.download_dir();
    tokio::fs::create_dir_all(&download_dir)
        .await
        .with_context(|| format!("Failed to create download dir {}", download_dir.display()))?;

    let slack = Arc::new(SlackClient::new(
        http,
        &settings.slack_bot_token,
        &settings.slack_app_token,
    ));
    let factory = Arc::new(RealityDefenderFactory::new(
        &settings.rd_api_base_url,
        settings.http_timeout(),
        settings.result_poll_delay(),
    ));
    let downloader = Arc::new(HttpDownloader::new(
        create_http_client(settings.http_timeout()),
        slack.bot_token(),
    ));

    let service = Arc::new(AnalysisService::new(
        CredentialRegistry::new(factory),
        MediaIntake::new(downloader, download_dir),
        Notifier::new(slack.clone()),
    ));
    info!("Analysis service initialized.");

    let poller = Arc::new(ResultPoller::new(
        Arc::clone(&service),
        settings.poll_interval(),
        settings.max_poll_attempts,
    ));
    let socket = Arc::new(SocketModeClient::new(
        Arc::clone(&slack),
        Arc::new(EventHandler::new(Arc::clone(&service), slack)),
    ));

    let cancel = CancellationToken::new();
    let poller_task = {
        let poller = Arc::clone(&poller);
        let cancel = cancel.clone();
        tokio::spawn(async move { poller.run(cancel).await })
    };
    let socket_task = {
        let socket = Arc::clone(&socket);
        let cancel = cancel.clone();
        tokio::spawn(async move { socket.run(cancel).await })
    };

    info!("Bot is running...");
    shutdown_signal().await;
    info!("Shutdown signal received");
    cancel.cancel();

    if let Err(e) = socket_task.await {
        warn!(error = %e, "Socket Mode task ended abnormally");
    }
    if let Err(e) = poller_task.await {
        warn!(error = %e, "Poller task ended abnormally");
    }

    let drain_timeout = Duration::from_secs(SHUTDOWN_DRAIN_TIMEOUT_SECS);
    if !socket.drain(drain_timeout).await {
        warn!("Shutting down with Slack handlers still running");
    }
    if !poller.drain(drain_timeout).await {
        warn!("Shutting down with result fetches still running");
    }

    let discarded = service.tracker().len().await;
    info!(discarded, "Stopped, tracked requests are discarded");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
