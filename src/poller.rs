//! Result poller
//!
//! Every period the poller scans the tracker. Each `Pending` request whose
//! owner still has a credential is moved to `InFlight` and a fetch task is
//! spawned that waits for the terminal result and hands it to the notifier.

use crate::service::AnalysisService;
use crate::tracker::RequestStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Periodic scanner that starts result fetches
pub struct ResultPoller {
    service: Arc<AnalysisService>,
    period: Duration,
    max_attempts: u32,
    tasks: TaskTracker,
}

impl ResultPoller {
    /// Create a poller ticking every `period`
    #[must_use]
    pub fn new(service: Arc<AnalysisService>, period: Duration, max_attempts: u32) -> Self {
        Self {
            service,
            period,
            max_attempts,
            tasks: TaskTracker::new(),
        }
    }

    /// Run one scan and return how many fetches were started.
    pub async fn tick(&self) -> usize {
        let tracker = self.service.tracker();
        let mut spawned = 0;

        for request_id in tracker.snapshot_ids().await {
            let Some(request) = tracker.get(&request_id).await else {
                continue;
            };
            if request.status != RequestStatus::Pending {
                continue;
            }

            let Some(client) = self.service.registry().lookup(&request.user_id).await else {
                debug!(
                    request_id = %request_id,
                    user_id = %request.user_id,
                    "Owner has no credential, leaving pending"
                );
                continue;
            };

            // Another scan may have claimed it between the read and here
            if !tracker.begin_fetch(&request_id).await {
                continue;
            }

            let service = Arc::clone(&self.service);
            let max_attempts = self.max_attempts;
            self.tasks.spawn(async move {
                match client.poll_for_result(&request_id, max_attempts).await {
                    Ok(result) => {
                        service.notify(&request_id, &result).await;
                    }
                    Err(e) => {
                        warn!(
                            request_id = %request_id,
                            error = %e,
                            "Result fetch failed, request stays in flight"
                        );
                    }
                }
            });
            spawned += 1;
        }

        spawned
    }

    /// Tick until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(period_secs = self.period.as_secs(), "Result poller started");
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let spawned = self.tick().await;
                    if spawned > 0 {
                        debug!(spawned, "Started result fetches");
                    }
                }
            }
        }
        info!("Result poller stopped");
    }

    /// Stop accepting fetches and wait up to `timeout` for running ones.
    ///
    /// Returns `false` if fetches were still running at the deadline.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tasks.close();
        let outstanding = self.tasks.len();
        if outstanding > 0 {
            info!(outstanding, "Waiting for in-flight result fetches");
        }
        tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        AnalysisClient, AnalysisError, AnalysisResult, MockAnalysisClient, MockClientFactory,
    };
    use crate::intake::{MediaIntake, MockMediaDownloader};
    use crate::notifier::Notifier;
    use crate::registry::CredentialRegistry;
    use crate::slack::{MockChatSurface, OutgoingMessage};
    use crate::tracker::TrackedRequest;

    fn build(factory: MockClientFactory, surface: MockChatSurface) -> ResultPoller {
        let service = AnalysisService::new(
            CredentialRegistry::new(Arc::new(factory)),
            MediaIntake::new(Arc::new(MockMediaDownloader::new()), std::env::temp_dir()),
            Notifier::new(Arc::new(surface)),
        );
        ResultPoller::new(Arc::new(service), Duration::from_millis(10), 3)
    }

    fn factory_with<F>(poll: F) -> MockClientFactory
    where
        F: Fn(&str, u32) -> Result<AnalysisResult, AnalysisError> + Clone + Send + Sync + 'static,
    {
        let mut factory = MockClientFactory::new();
        factory.expect_create().returning(move |_| {
            let poll = poll.clone();
            let mut client = MockAnalysisClient::new();
            client
                .expect_poll_for_result()
                .returning(move |id, attempts| poll(id, attempts));
            Arc::new(client) as Arc<dyn AnalysisClient>
        });
        factory
    }

    #[tokio::test]
    async fn test_idle_tick_spawns_nothing() {
        let poller = build(MockClientFactory::new(), MockChatSurface::new());
        assert_eq!(poller.tick().await, 0);
        assert!(poller.drain(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_unregistered_owner_stays_pending() {
        let poller = build(MockClientFactory::new(), MockChatSurface::new());
        let tracker = poller.service.tracker();
        tracker
            .insert(TrackedRequest::pending("r1", "U1", "m1", "C1", None))
            .await;

        assert_eq!(poller.tick().await, 0);
        let status = tracker.get("r1").await.map(|r| r.status);
        assert_eq!(status, Some(RequestStatus::Pending));
    }

    #[tokio::test]
    async fn test_pending_request_is_fetched_and_notified_once() {
        let factory = factory_with(|id, attempts| {
            assert_eq!(id, "r1");
            assert_eq!(attempts, 3);
            Ok(AnalysisResult::new("AUTHENTIC", Some(0.15)))
        });
        let mut surface = MockChatSurface::new();
        surface
            .expect_post_message()
            .withf(|message: &OutgoingMessage| {
                message.channel == "C1" && message.text.contains("15.00%")
            })
            .times(1)
            .returning(|_| Ok(()));

        let poller = build(factory, surface);
        poller.service.register_user("U1", "k1").await;
        poller
            .service
            .tracker()
            .insert(TrackedRequest::pending("r1", "U1", "m1", "C1", Some("1.0".into())))
            .await;

        assert_eq!(poller.tick().await, 1);
        // Already in flight, so a second scan does nothing
        assert_eq!(poller.tick().await, 0);

        assert!(poller.drain(Duration::from_secs(5)).await);
        assert!(poller.service.tracker().is_empty().await);
    }

    #[tokio::test]
    async fn test_fetch_error_leaves_request_in_flight() {
        let factory = factory_with(|id, attempts| {
            Err(AnalysisError::PollExhausted {
                request_id: id.to_string(),
                attempts,
            })
        });
        let mut surface = MockChatSurface::new();
        surface.expect_post_message().never();

        let poller = build(factory, surface);
        poller.service.register_user("U1", "k1").await;
        let tracker = poller.service.tracker();
        tracker
            .insert(TrackedRequest::pending("r1", "U1", "m1", "C1", None))
            .await;

        assert_eq!(poller.tick().await, 1);
        assert!(poller.drain(Duration::from_secs(5)).await);

        let status = tracker.get("r1").await.map(|r| r.status);
        assert_eq!(status, Some(RequestStatus::InFlight));
        assert_eq!(poller.tick().await, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let poller = build(MockClientFactory::new(), MockChatSurface::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), poller.run(cancel))
            .await
            .unwrap_or_else(|_| panic!("run should return after cancel"));
    }
}
