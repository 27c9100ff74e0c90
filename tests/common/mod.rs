//! Hand-written fakes shared by the integration tests.
#![allow(dead_code)]

use rd_slack_bot::analysis::{
    AnalysisClient, AnalysisError, AnalysisResult, ClientFactory, SubmitReceipt,
};
use rd_slack_bot::intake::{IntakeError, MediaDownloader, MediaIntake};
use rd_slack_bot::notifier::Notifier;
use rd_slack_bot::registry::CredentialRegistry;
use rd_slack_bot::service::AnalysisService;
use rd_slack_bot::slack::views::View;
use rd_slack_bot::slack::{ChatSurface, OutgoingMessage, SlackError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Ordered record of side effects across fakes
pub type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
pub struct FakeDownloader {
    pub urls: Mutex<Vec<String>>,
    pub delay: Duration,
    pub fail: bool,
    pub journal: Journal,
}

#[async_trait::async_trait]
impl MediaDownloader for FakeDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<(), IntakeError> {
        self.urls.lock().expect("lock").push(url.to_string());
        tokio::time::sleep(self.delay).await;
        self.journal
            .lock()
            .expect("lock")
            .push(format!("downloaded {url}"));
        if self.fail {
            return Err(IntakeError::Download("HTTP 403 Forbidden".to_string()));
        }
        tokio::fs::write(dest, b"fake media")
            .await
            .map_err(|e| IntakeError::Download(e.to_string()))
    }
}

pub struct FakeAnalysisClient {
    pub submitted: Mutex<Vec<PathBuf>>,
    pub polls: AtomicUsize,
    next_id: AtomicUsize,
    outcome: Result<AnalysisResult, ()>,
}

impl FakeAnalysisClient {
    pub fn returning(result: AnalysisResult) -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            polls: AtomicUsize::new(0),
            next_id: AtomicUsize::new(1),
            outcome: Ok(result),
        }
    }

    pub fn exhausting() -> Self {
        Self {
            outcome: Err(()),
            ..Self::returning(AnalysisResult::new("UNKNOWN", None))
        }
    }
}

#[async_trait::async_trait]
impl AnalysisClient for FakeAnalysisClient {
    async fn submit(&self, path: &Path) -> Result<SubmitReceipt, AnalysisError> {
        assert!(path.exists(), "submitted file must exist");
        self.submitted.lock().expect("lock").push(path.to_path_buf());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(SubmitReceipt {
            request_id: format!("req-{n}"),
            media_id: format!("media-{n}"),
        })
    }

    async fn poll_for_result(
        &self,
        request_id: &str,
        max_attempts: u32,
    ) -> Result<AnalysisResult, AnalysisError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone().map_err(|()| AnalysisError::PollExhausted {
            request_id: request_id.to_string(),
            attempts: max_attempts,
        })
    }
}

pub struct FakeFactory {
    pub client: Arc<FakeAnalysisClient>,
    pub keys: Mutex<Vec<String>>,
}

impl ClientFactory for FakeFactory {
    fn create(&self, api_key: &str) -> Arc<dyn AnalysisClient> {
        self.keys.lock().expect("lock").push(api_key.to_string());
        self.client.clone()
    }
}

#[derive(Default)]
pub struct FakeChat {
    pub messages: Mutex<Vec<OutgoingMessage>>,
    pub views: Mutex<Vec<(String, View)>>,
    pub updates: Mutex<Vec<(String, View)>>,
    pub homes: Mutex<Vec<(String, View)>>,
    pub responses: Mutex<Vec<(String, String)>>,
    pub journal: Journal,
}

#[async_trait::async_trait]
impl ChatSurface for FakeChat {
    async fn post_message(&self, message: &OutgoingMessage) -> Result<(), SlackError> {
        self.messages.lock().expect("lock").push(message.clone());
        Ok(())
    }

    async fn open_view(&self, trigger_id: &str, view: &View) -> Result<String, SlackError> {
        let mut views = self.views.lock().expect("lock");
        views.push((trigger_id.to_string(), view.clone()));
        self.journal
            .lock()
            .expect("lock")
            .push(format!("views.open {trigger_id}"));
        Ok(format!("V{}", views.len()))
    }

    async fn update_view(&self, view_id: &str, view: &View) -> Result<(), SlackError> {
        self.updates
            .lock()
            .expect("lock")
            .push((view_id.to_string(), view.clone()));
        self.journal
            .lock()
            .expect("lock")
            .push(format!("views.update {view_id}"));
        Ok(())
    }

    async fn publish_home(&self, user_id: &str, view: &View) -> Result<(), SlackError> {
        self.homes
            .lock()
            .expect("lock")
            .push((user_id.to_string(), view.clone()));
        Ok(())
    }

    async fn respond(&self, response_url: &str, text: &str) -> Result<(), SlackError> {
        self.responses
            .lock()
            .expect("lock")
            .push((response_url.to_string(), text.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub service: Arc<AnalysisService>,
    pub downloader: Arc<FakeDownloader>,
    pub client: Arc<FakeAnalysisClient>,
    pub factory: Arc<FakeFactory>,
    pub chat: Arc<FakeChat>,
    pub journal: Journal,
    pub download_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(client: FakeAnalysisClient) -> Self {
        Self::with_downloader(client, FakeDownloader::default())
    }

    /// Harness whose downloader takes `delay` per file
    pub fn with_download_delay(client: FakeAnalysisClient, delay: Duration) -> Self {
        Self::with_downloader(
            client,
            FakeDownloader {
                delay,
                ..FakeDownloader::default()
            },
        )
    }

    /// Harness whose downloader rejects every file
    pub fn with_failing_downloads(client: FakeAnalysisClient) -> Self {
        Self::with_downloader(
            client,
            FakeDownloader {
                fail: true,
                ..FakeDownloader::default()
            },
        )
    }

    fn with_downloader(client: FakeAnalysisClient, downloader: FakeDownloader) -> Self {
        let download_dir = tempfile::tempdir().expect("tempdir");
        let journal = Journal::default();
        let downloader = Arc::new(FakeDownloader {
            journal: Arc::clone(&journal),
            ..downloader
        });
        let client = Arc::new(client);
        let factory = Arc::new(FakeFactory {
            client: Arc::clone(&client),
            keys: Mutex::new(Vec::new()),
        });
        let chat = Arc::new(FakeChat {
            journal: Arc::clone(&journal),
            ..FakeChat::default()
        });

        let service = Arc::new(AnalysisService::new(
            CredentialRegistry::new(factory.clone()),
            MediaIntake::new(downloader.clone(), download_dir.path().to_path_buf()),
            Notifier::new(chat.clone()),
        ));

        Self {
            service,
            downloader,
            client,
            factory,
            chat,
            journal,
            download_dir,
        }
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().expect("lock").clone()
    }

    pub fn leftover_files(&self) -> usize {
        std::fs::read_dir(self.download_dir.path())
            .expect("read download dir")
            .count()
    }
}
