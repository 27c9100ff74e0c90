use dotenvy::dotenv;
use rd_slack_bot::config::Settings;
use rd_slack_bot::logging::{init_logging, RedactionPatterns};
use rd_slack_bot::runner;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // reqwest and tungstenite both pull in rustls; pick the provider once
    let _ = rustls::crypto::ring::default_provider().install_default();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    let settings = match Settings::new() {
        Ok(settings) => {
            init_logging(patterns, settings.log_directive());
            info!("Configuration loaded successfully.");
            settings
        }
        Err(e) => {
            init_logging(patterns, "info");
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting Reality Defender Slack bot...");

    runner::run(&settings).await.map_err(|e| {
        error!("Bot stopped with error: {:#}", e);
        e
    })?;

    Ok(())
}
