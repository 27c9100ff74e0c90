#![deny(missing_docs)]
//! Reality Defender Slack bot.
//!
//! Users register an analysis API key, share media from a message through the
//! `analyze` shortcut, and receive the verdict as a threaded reply once the
//! analysis service finishes.

/// Reality Defender API client and the analysis seam.
pub mod analysis;
/// Configuration and settings management.
pub mod config;
/// Media URL extraction, download and submission.
pub mod intake;
/// Log initialisation with secret redaction.
pub mod logging;
/// Completion message formatting and delivery.
pub mod notifier;
/// Fixed-interval scan of tracked requests.
pub mod poller;
/// Per-user analysis client registry.
pub mod registry;
/// Process entrypoint wiring.
pub mod runner;
/// Service object owning the registry and request tables.
pub mod service;
/// Slack transport: Web API, Socket Mode, events and views.
pub mod slack;
/// In-flight analysis request table.
pub mod tracker;
