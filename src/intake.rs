//! Media intake
//!
//! Resolves the media URLs in a shortcut's message, downloads each one to a
//! temporary file, submits it with the requester's analysis client and
//! records a `Pending` tracked request per accepted submission.

use crate::analysis::AnalysisError;
use crate::config::SUPPORTED_FILE_TYPES;
use crate::registry::CredentialRegistry;
use crate::slack::events::{MessageShortcut, SlackMessage};
use crate::tracker::{RequestTracker, TrackedRequest};
use chrono::Local;
use futures_util::StreamExt;
use lazy_regex::lazy_regex;
use reqwest::{Client as HttpClient, Url};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

static RE_UNSAFE_FILENAME_CHARS: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"[^A-Za-z0-9._-]");

const MAX_SEGMENT_CHARS: usize = 100;
const FALLBACK_SEGMENT: &str = "media";

/// Errors that stop an analysis request
#[derive(Debug, Error)]
pub enum IntakeError {
    /// Requester has not registered an API key
    #[error("User {0} has no registered API key")]
    UserNotConfigured(String),
    /// Nothing in the message can be analysed
    #[error("No supported media in message")]
    UnsupportedContent,
    /// Fetching the media failed
    #[error("Download failed: {0}")]
    Download(String),
    /// The analysis service rejected the upload
    #[error("Submission failed: {0}")]
    Submission(#[from] AnalysisError),
}

/// One user's request to analyse the media of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    /// Requesting user
    pub user_id: String,
    /// Channel to report back to
    pub channel_id: String,
    /// Thread to report under
    pub thread_ts: Option<String>,
    /// Message carrying the media
    pub message: SlackMessage,
}

impl AnalysisRequest {
    /// Build a request from a message shortcut
    #[must_use]
    pub fn from_shortcut(shortcut: &MessageShortcut) -> Self {
        Self {
            user_id: shortcut.user.id.clone(),
            channel_id: shortcut.channel.id.clone(),
            thread_ts: shortcut.thread_anchor(),
            message: shortcut.message.clone(),
        }
    }
}

/// Candidate media URLs in discovery order: image blocks first, then
/// attached files of a supported type.
#[must_use]
pub fn extract_media_urls(message: &SlackMessage) -> Vec<String> {
    let block_urls = message
        .blocks
        .iter()
        .filter(|block| block.kind == "image")
        .filter_map(|block| {
            block
                .image_url
                .clone()
                .or_else(|| block.slack_file.as_ref().and_then(|file| file.url.clone()))
        });

    let file_urls = message
        .files
        .iter()
        .filter(|file| {
            file.filetype.as_deref().is_some_and(|filetype| {
                SUPPORTED_FILE_TYPES.contains(&filetype.to_ascii_lowercase().as_str())
            })
        })
        .filter_map(|file| {
            file.url_private_download
                .clone()
                .or_else(|| file.url_private.clone())
        });

    block_urls
        .chain(file_urls)
        .filter(|url| !url.is_empty())
        .collect()
}

/// Filesystem-safe version of the last path segment of `url`
#[must_use]
pub fn sanitize_segment(url: &str) -> String {
    let path = url.split(&['?', '#'][..]).next().unwrap_or_default();
    let segment = path.rsplit('/').next().unwrap_or_default();
    let cleaned = RE_UNSAFE_FILENAME_CHARS.replace_all(segment, "_");
    let truncated: String = cleaned
        .trim_start_matches('.')
        .chars()
        .take(MAX_SEGMENT_CHARS)
        .collect();

    if truncated.is_empty() {
        FALLBACK_SEGMENT.to_string()
    } else {
        truncated
    }
}

/// Unique temporary file name: `<timestamp>_<uuid>_<segment>`
#[must_use]
pub fn temp_file_name(url: &str) -> String {
    format!(
        "{}_{}_{}",
        Local::now().format("%Y%m%d_%H%M%S"),
        Uuid::new_v4().simple(),
        sanitize_segment(url)
    )
}

fn is_slack_hosted(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed.host_str().map(|host| {
                host == "slack.com"
                    || host.ends_with(".slack.com")
                    || host.ends_with(".slack-edge.com")
            })
        })
        .unwrap_or(false)
}

/// Fetches media into local files
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Write the body at `url` to `dest`
    async fn download(&self, url: &str, dest: &Path) -> Result<(), IntakeError>;
}

/// Streams media over HTTP, authenticating against Slack-hosted URLs
pub struct HttpDownloader {
    http: HttpClient,
    bot_token: String,
}

impl HttpDownloader {
    /// Create a downloader using `bot_token` for Slack-hosted files
    #[must_use]
    pub fn new(http: HttpClient, bot_token: &str) -> Self {
        Self {
            http,
            bot_token: bot_token.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl MediaDownloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<(), IntakeError> {
        let mut request = self.http.get(url);
        if is_slack_hosted(url) {
            request = request.bearer_auth(&self.bot_token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IntakeError::Download(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(IntakeError::Download(format!("HTTP {status}")));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| IntakeError::Download(e.to_string()))?;
        let mut stream = response.bytes_stream();
        let mut written = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| IntakeError::Download(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| IntakeError::Download(e.to_string()))?;
            written += chunk.len();
        }
        file.flush()
            .await
            .map_err(|e| IntakeError::Download(e.to_string()))?;

        debug!(path = %dest.display(), bytes = written, "Media downloaded");
        Ok(())
    }
}

async fn remove_temp_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove temporary media file");
        }
    }
}

/// Download-and-submit pipeline
pub struct MediaIntake {
    downloader: Arc<dyn MediaDownloader>,
    download_dir: PathBuf,
}

impl MediaIntake {
    /// Create an intake writing temporary files into `download_dir`
    #[must_use]
    pub fn new(downloader: Arc<dyn MediaDownloader>, download_dir: PathBuf) -> Self {
        Self {
            downloader,
            download_dir,
        }
    }

    /// Submit every media item of `request` and track the results.
    ///
    /// Returns the new request ids in submission order.
    ///
    /// # Errors
    ///
    /// `UserNotConfigured` before anything is downloaded, `UnsupportedContent`
    /// when the message has no eligible media, and `Download` or `Submission`
    /// for the first item that fails. Items submitted before a failure stay
    /// tracked.
    pub async fn submit(
        &self,
        registry: &CredentialRegistry,
        tracker: &RequestTracker,
        request: &AnalysisRequest,
    ) -> Result<Vec<String>, IntakeError> {
        let client = registry
            .lookup(&request.user_id)
            .await
            .ok_or_else(|| IntakeError::UserNotConfigured(request.user_id.clone()))?;

        let urls = extract_media_urls(&request.message);
        if urls.is_empty() {
            return Err(IntakeError::UnsupportedContent);
        }

        let mut request_ids = Vec::with_capacity(urls.len());
        for url in &urls {
            let path = self.download_dir.join(temp_file_name(url));

            if let Err(e) = self.downloader.download(url, &path).await {
                remove_temp_file(&path).await;
                return Err(e);
            }

            let submitted = client.submit(&path).await;
            remove_temp_file(&path).await;
            let receipt = submitted?;

            tracker
                .insert(TrackedRequest::pending(
                    receipt.request_id.clone(),
                    request.user_id.clone(),
                    receipt.media_id,
                    request.channel_id.clone(),
                    request.thread_ts.clone(),
                ))
                .await;

            info!(
                request_id = %receipt.request_id,
                user_id = %request.user_id,
                "Tracking analysis request"
            );
            request_ids.push(receipt.request_id);
        }

        Ok(request_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        AnalysisClient, MockAnalysisClient, MockClientFactory, SubmitReceipt,
    };
    use crate::slack::events::{MessageBlock, SlackFile, SlackFileRef};
    use crate::tracker::RequestStatus;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn image_block(url: &str) -> MessageBlock {
        MessageBlock {
            kind: "image".to_string(),
            image_url: Some(url.to_string()),
            slack_file: None,
        }
    }

    fn file(filetype: &str, download: Option<&str>, private: Option<&str>) -> SlackFile {
        SlackFile {
            filetype: Some(filetype.to_string()),
            url_private_download: download.map(ToString::to_string),
            url_private: private.map(ToString::to_string),
        }
    }

    fn request_with(message: SlackMessage) -> AnalysisRequest {
        AnalysisRequest {
            user_id: "U1".to_string(),
            channel_id: "C1".to_string(),
            thread_ts: Some("1700.01".to_string()),
            message,
        }
    }

    fn registry_with(client: MockAnalysisClient) -> CredentialRegistry {
        let client: Arc<dyn AnalysisClient> = Arc::new(client);
        let mut factory = MockClientFactory::new();
        factory
            .expect_create()
            .returning(move |_| Arc::clone(&client));
        CredentialRegistry::new(Arc::new(factory))
    }

    fn writing_downloader(calls: Arc<AtomicUsize>) -> MockMediaDownloader {
        let mut downloader = MockMediaDownloader::new();
        downloader.expect_download().returning(move |_, dest| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::fs::write(dest, b"media").map_err(|e| IntakeError::Download(e.to_string()))
        });
        downloader
    }

    #[test]
    fn test_extract_blocks_then_supported_files() {
        let message = SlackMessage {
            blocks: vec![
                MessageBlock {
                    kind: "rich_text".to_string(),
                    ..MessageBlock::default()
                },
                image_block("https://x/y/photo.png"),
                MessageBlock {
                    kind: "image".to_string(),
                    image_url: None,
                    slack_file: Some(SlackFileRef {
                        url: Some("https://files.slack.com/a.jpg".to_string()),
                    }),
                },
            ],
            files: vec![
                file("pdf", Some("https://files.slack.com/doc.pdf"), None),
                file("MP4", None, Some("https://files.slack.com/clip.mp4")),
                file(
                    "jpeg",
                    Some("https://files.slack.com/download/b.jpeg"),
                    Some("https://files.slack.com/b.jpeg"),
                ),
            ],
            ..SlackMessage::default()
        };

        assert_eq!(
            extract_media_urls(&message),
            vec![
                "https://x/y/photo.png",
                "https://files.slack.com/a.jpg",
                "https://files.slack.com/clip.mp4",
                "https://files.slack.com/download/b.jpeg",
            ]
        );
    }

    #[test]
    fn test_extract_nothing_from_text_message() {
        assert!(extract_media_urls(&SlackMessage::default()).is_empty());
    }

    #[test]
    fn test_sanitize_segment_examples() {
        assert_eq!(sanitize_segment("https://x/y/photo.png"), "photo.png");
        assert_eq!(sanitize_segment("https://x/y/my photo (1).png?t=abc"), "my_photo__1_.png");
        assert_eq!(sanitize_segment("https://x/y/"), "media");
        assert_eq!(sanitize_segment("https://x/../.."), "media");
    }

    #[test]
    fn test_temp_file_name_is_unique() {
        let a = temp_file_name("https://x/y/photo.png");
        let b = temp_file_name("https://x/y/photo.png");
        assert_ne!(a, b);
        assert!(a.ends_with("_photo.png"));
    }

    #[test]
    fn test_only_slack_hosts_get_the_token() {
        assert!(is_slack_hosted("https://files.slack.com/files-pri/T1/a.png"));
        assert!(is_slack_hosted("https://slack.com/x"));
        assert!(!is_slack_hosted("https://x/y/photo.png"));
        assert!(!is_slack_hosted("https://slack.com.evil.example/a.png"));
        assert!(!is_slack_hosted("not a url"));
    }

    proptest! {
        #[test]
        fn prop_sanitized_segment_is_safe(url in ".{0,300}") {
            let segment = sanitize_segment(&url);
            prop_assert!(!segment.is_empty());
            prop_assert!(segment.chars().count() <= MAX_SEGMENT_CHARS);
            prop_assert!(!segment.starts_with('.'));
            prop_assert!(segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
        }
    }

    #[tokio::test]
    async fn test_unconfigured_user_is_rejected_before_download() {
        let mut factory = MockClientFactory::new();
        factory.expect_create().never();
        let registry = CredentialRegistry::new(Arc::new(factory));
        let tracker = RequestTracker::new();

        let mut downloader = MockMediaDownloader::new();
        downloader.expect_download().never();
        let intake = MediaIntake::new(Arc::new(downloader), std::env::temp_dir());

        let message = SlackMessage {
            blocks: vec![image_block("https://x/y/photo.png")],
            ..SlackMessage::default()
        };
        let result = intake.submit(&registry, &tracker, &request_with(message)).await;

        assert!(matches!(result, Err(IntakeError::UserNotConfigured(user)) if user == "U1"));
        assert!(tracker.is_empty().await);
    }

    #[tokio::test]
    async fn test_no_media_is_unsupported() {
        let registry = registry_with(MockAnalysisClient::new());
        registry.register("U1", "k1").await;
        let tracker = RequestTracker::new();

        let mut downloader = MockMediaDownloader::new();
        downloader.expect_download().never();
        let intake = MediaIntake::new(Arc::new(downloader), std::env::temp_dir());

        let result = intake
            .submit(&registry, &tracker, &request_with(SlackMessage::default()))
            .await;
        assert!(matches!(result, Err(IntakeError::UnsupportedContent)));
        assert!(tracker.is_empty().await);
    }

    #[tokio::test]
    async fn test_successful_submission_tracks_pending_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));

        let mut client = MockAnalysisClient::new();
        client.expect_submit().times(1).returning(|path| {
            assert!(path.exists(), "file must exist while submitting");
            Ok(SubmitReceipt {
                request_id: "req-1".to_string(),
                media_id: "med-1".to_string(),
            })
        });
        let registry = registry_with(client);
        registry.register("U1", "k1").await;
        let tracker = RequestTracker::new();

        let downloads = Arc::new(AtomicUsize::new(0));
        let intake = MediaIntake::new(
            Arc::new(writing_downloader(Arc::clone(&downloads))),
            dir.path().to_path_buf(),
        );

        let message = SlackMessage {
            blocks: vec![image_block("https://x/y/photo.png")],
            ..SlackMessage::default()
        };
        let ids = intake
            .submit(&registry, &tracker, &request_with(message))
            .await
            .unwrap_or_else(|e| panic!("submission should succeed: {e}"));

        assert_eq!(ids, vec!["req-1"]);
        assert_eq!(downloads.load(Ordering::SeqCst), 1);

        let tracked = tracker.get("req-1").await;
        let Some(tracked) = tracked else {
            panic!("request should be tracked");
        };
        assert_eq!(tracked.status, RequestStatus::Pending);
        assert_eq!(tracked.user_id, "U1");
        assert_eq!(tracked.media_id, "med-1");
        assert_eq!(tracked.channel_id, "C1");
        assert_eq!(tracked.thread_ts.as_deref(), Some("1700.01"));

        let leftovers = std::fs::read_dir(dir.path())
            .map(|entries| entries.count())
            .unwrap_or(usize::MAX);
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_failed_submission_aborts_batch_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));

        let submissions = Arc::new(AtomicUsize::new(0));
        let mut client = MockAnalysisClient::new();
        let counter = Arc::clone(&submissions);
        client.expect_submit().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(SubmitReceipt {
                    request_id: "req-1".to_string(),
                    media_id: "med-1".to_string(),
                })
            } else {
                Err(AnalysisError::ApiError("500 - boom".to_string()))
            }
        });
        let registry = registry_with(client);
        registry.register("U1", "k1").await;
        let tracker = RequestTracker::new();

        let downloads = Arc::new(AtomicUsize::new(0));
        let intake = MediaIntake::new(
            Arc::new(writing_downloader(Arc::clone(&downloads))),
            dir.path().to_path_buf(),
        );

        let message = SlackMessage {
            blocks: vec![
                image_block("https://x/y/a.png"),
                image_block("https://x/y/b.png"),
                image_block("https://x/y/c.png"),
            ],
            ..SlackMessage::default()
        };
        let result = intake.submit(&registry, &tracker, &request_with(message)).await;

        assert!(matches!(result, Err(IntakeError::Submission(_))));
        assert_eq!(downloads.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.snapshot_ids().await, vec!["req-1"]);
        let leftovers = std::fs::read_dir(dir.path())
            .map(|entries| entries.count())
            .unwrap_or(usize::MAX);
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_download_failure_is_reported() {
        let mut client = MockAnalysisClient::new();
        client.expect_submit().never();
        let registry = registry_with(client);
        registry.register("U1", "k1").await;
        let tracker = RequestTracker::new();

        let mut downloader = MockMediaDownloader::new();
        downloader
            .expect_download()
            .times(1)
            .returning(|_, _| Err(IntakeError::Download("HTTP 403 Forbidden".to_string())));
        let intake = MediaIntake::new(Arc::new(downloader), std::env::temp_dir());

        let message = SlackMessage {
            blocks: vec![image_block("https://x/y/photo.png")],
            ..SlackMessage::default()
        };
        let result = intake.submit(&registry, &tracker, &request_with(message)).await;
        assert!(matches!(result, Err(IntakeError::Download(_))));
        assert!(tracker.is_empty().await);
    }
}
