//! Configuration and settings management
//!
//! Loads settings from optional config files and environment variables and
//! defines the service constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Name shown as the title of every view the bot opens
pub const APP_NAME: &str = "Reality Defender";

/// Production Reality Defender API
pub const DEFAULT_RD_API_BASE_URL: &str = "https://api.prd.realitydefender.xyz";
/// Seconds between two poller ticks
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
/// Result-status attempts before a fetch gives up
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;
/// Delay between two result-status attempts of a single fetch
pub const DEFAULT_RESULT_POLL_DELAY_MS: u64 = 5000;
/// Timeout applied to every outbound HTTP request
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
/// Upper bound on waiting for in-flight fetches at shutdown
pub const SHUTDOWN_DRAIN_TIMEOUT_SECS: u64 = 30;

/// Attachment `filetype` values accepted for analysis
pub const SUPPORTED_FILE_TYPES: &[&str] = &["jpg", "jpeg", "png", "mp4"];

/// Errors raised while loading or validating settings
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Config sources could not be read or deserialized
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    /// Required secrets are absent or empty
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
}

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    /// Slack Bot User OAuth token (`xoxb-...`)
    #[serde(default)]
    pub slack_bot_token: String,
    /// Slack app-level token used for Socket Mode (`xapp-...`)
    #[serde(default)]
    pub slack_app_token: String,
    /// Log verbosity (`debug`, `info`, `warning`, ...)
    #[serde(default)]
    pub log_level: Option<String>,

    /// Base URL of the Reality Defender API
    #[serde(default = "default_rd_api_base_url")]
    pub rd_api_base_url: String,
    /// Poller period in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Result-status attempts per fetch
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    /// Delay between result-status attempts in milliseconds
    #[serde(default = "default_result_poll_delay_ms")]
    pub result_poll_delay_ms: u64,
    /// Outbound HTTP timeout in seconds: whole request for Slack API calls,
    /// per connect and per read for media transfers
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Directory for temporary media downloads
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}

fn default_rd_api_base_url() -> String {
    DEFAULT_RD_API_BASE_URL.to_string()
}

const fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

const fn default_max_poll_attempts() -> u32 {
    DEFAULT_MAX_POLL_ATTEMPTS
}

const fn default_result_poll_delay_ms() -> u64 {
    DEFAULT_RESULT_POLL_DELAY_MS
}

const fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

impl Settings {
    /// Load settings from config files and the environment, then validate them.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Load` if a source cannot be read and
    /// `SettingsError::Missing` if a required secret is absent.
    pub fn new() -> Result<Self, SettingsError> {
        let settings: Self = build_config()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check that both Slack secrets are present.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Missing` naming every absent secret.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let required = [
            ("SLACK_BOT_TOKEN", &self.slack_bot_token),
            ("SLACK_APP_TOKEN", &self.slack_app_token),
        ];

        let missing: Vec<&'static str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SettingsError::Missing(missing))
        }
    }

    /// Poller period
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Delay between result-status attempts of one fetch
    #[must_use]
    pub fn result_poll_delay(&self) -> Duration {
        Duration::from_millis(self.result_poll_delay_ms)
    }

    /// Outbound HTTP timeout
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Directory where media is downloaded before submission
    #[must_use]
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Filter directive derived from `LOG_LEVEL`, defaulting to `info`.
    ///
    /// Python-style names (`WARNING`, `CRITICAL`) map onto tracing levels.
    #[must_use]
    pub fn log_directive(&self) -> &'static str {
        match self
            .log_level
            .as_deref()
            .map(str::trim)
            .map(str::to_ascii_uppercase)
            .as_deref()
        {
            Some("TRACE") => "trace",
            Some("DEBUG") => "debug",
            Some("WARN" | "WARNING") => "warn",
            Some("ERROR" | "CRITICAL") => "error",
            _ => "info",
        }
    }
}

/// Build the layered config source.
///
/// # Errors
///
/// Returns a `ConfigError` if a present source cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Local overrides, not checked into git
        .add_source(File::with_name("config/local").required(false))
        // Environment::default() maps UPPER_SNAKE_CASE to snake_case keys;
        // empty values are treated as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}
