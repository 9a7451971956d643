//! Harvest pipeline: host signals → observer → sanitizer → router.
//!
//! One task owns the [`FeedObserver`] and reacts to [`FeedSignal`]s, the
//! periodic sweep, the post-navigation settle sweep, and the one-shot
//! hydration retries. Everything the observer emits is sanitized and
//! recorded through the [`Router`], so title updates go through the lane.

use std::collections::VecDeque;

use thyself_observer::{AdapterRegistry, FeedObserver, Observation};
use thyself_shared::{HarvestConfig, RawCandidate};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tracing::{debug, info, instrument, warn};

use crate::router::Router;
use crate::sanitizer::sanitize;

/// Buffer of the signal channel returned by [`HarvestPipeline::spawn`].
const SIGNAL_BUFFER: usize = 256;

/// Host-side events driving the observer.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedSignal {
    /// The tab navigated (full load or in-page).
    Navigate { url: String },
    /// The document changed; carries the new snapshot.
    Mutation { html: String },
    /// These item keys entered the viewport.
    Visible { keys: Vec<String> },
    /// Process everything now.
    Sweep,
}

/// Counters for one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestStats {
    /// Candidates produced by the observer.
    pub emitted: usize,
    /// Candidates that survived sanitization and were recorded.
    pub accepted: usize,
    pub rejected: usize,
    /// Items whose title was empty on first sight.
    pub deferred: usize,
    /// Retries actually attempted.
    pub retried: usize,
}

pub struct HarvestPipeline {
    observer: FeedObserver,
    router: Router,
    config: HarvestConfig,
    retries: VecDeque<(Instant, String)>,
    stats: HarvestStats,
}

impl HarvestPipeline {
    pub fn new(router: Router, config: HarvestConfig) -> Self {
        let observer = FeedObserver::with_registry(AdapterRegistry::new(), config.platform.clone());
        Self {
            observer,
            router,
            config,
            retries: VecDeque::new(),
            stats: HarvestStats::default(),
        }
    }

    /// Run on a new task. Dropping every sender stops the pipeline.
    pub fn spawn(self) -> (mpsc::Sender<FeedSignal>, JoinHandle<HarvestStats>) {
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        (tx, tokio::spawn(self.run(rx)))
    }

    /// Process signals until the channel closes. Retries still queued at
    /// that point are attempted once before returning.
    #[instrument(skip_all, fields(platform = %self.config.platform))]
    pub async fn run(mut self, mut signals: mpsc::Receiver<FeedSignal>) -> HarvestStats {
        let period = self.config.sweep_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut settle: Option<Instant> = None;

        info!(
            sweep_ms = period.as_millis() as u64,
            retry_ms = self.config.hydrate_retry.as_millis() as u64,
            "harvest pipeline started"
        );

        loop {
            let retry_due = self.retries.front().map(|(at, _)| *at);
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(FeedSignal::Navigate { url }) => {
                        self.observer.navigate(&url);
                        self.retries.clear();
                        settle = Some(Instant::now() + self.config.nav_settle);
                    }
                    Some(FeedSignal::Mutation { html }) => {
                        let discovered = self.observer.apply_mutation(html);
                        debug!(discovered = discovered.len(), "mutation");
                    }
                    Some(FeedSignal::Visible { keys }) => {
                        let observations = self.observer.on_visible(&keys);
                        self.handle(observations).await;
                    }
                    Some(FeedSignal::Sweep) => {
                        let observations = self.observer.sweep();
                        self.handle(observations).await;
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    let observations = self.observer.sweep();
                    self.handle(observations).await;
                }
                _ = sleep_until(settle.unwrap_or_else(Instant::now)), if settle.is_some() => {
                    settle = None;
                    debug!(page = %self.observer.page_key(), "navigation settled");
                    let observations = self.observer.sweep();
                    self.handle(observations).await;
                }
                _ = sleep_until(retry_due.unwrap_or_else(Instant::now)), if retry_due.is_some() => {
                    if let Some((_, key)) = self.retries.pop_front() {
                        self.retry(&key).await;
                    }
                }
            }
        }

        while let Some((_, key)) = self.retries.pop_front() {
            self.retry(&key).await;
        }

        info!(
            emitted = self.stats.emitted,
            accepted = self.stats.accepted,
            rejected = self.stats.rejected,
            deferred = self.stats.deferred,
            "harvest pipeline stopped"
        );
        self.stats
    }

    async fn handle(&mut self, observations: Vec<Observation>) {
        for observation in observations {
            match observation {
                Observation::Emitted(candidate) => self.emit(candidate).await,
                Observation::Deferred(key) => {
                    self.stats.deferred += 1;
                    let due = Instant::now() + self.config.hydrate_retry;
                    self.retries.push_back((due, key));
                }
            }
        }
    }

    async fn retry(&mut self, key: &str) {
        self.stats.retried += 1;
        if let Some(candidate) = self.observer.retry(key) {
            self.emit(candidate).await;
        }
    }

    async fn emit(&mut self, candidate: RawCandidate) {
        self.stats.emitted += 1;
        let Some(event) = sanitize(&candidate) else {
            self.stats.rejected += 1;
            return;
        };
        match self.router.record(event).await {
            Ok(()) => self.stats.accepted += 1,
            Err(e) => {
                self.stats.rejected += 1;
                warn!(item_id = %candidate.item_id, error = %e, "failed to record event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::Value;
    use thyself_shared::{AppConfig, Event, TitleBatchEntry};

    use super::*;
    use crate::router::test_support::test_router;

    const HOME: &str = "https://www.youtube.com/";

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/html/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    /// Timers long enough that only explicit signals do anything.
    fn quiet_config() -> HarvestConfig {
        HarvestConfig {
            sweep_interval: Duration::from_secs(60),
            hydrate_retry: Duration::from_secs(60),
            nav_settle: Duration::from_secs(60),
            ..HarvestConfig::default()
        }
    }

    async fn titles(router: &Router) -> Vec<String> {
        let entries: Vec<TitleBatchEntry> = router
            .handle("GET_TITLES", Value::Null)
            .await
            .into_data()
            .unwrap();
        let mut titles: Vec<String> = entries.into_iter().map(|e| e.title).collect();
        titles.sort();
        titles
    }

    fn navigate() -> FeedSignal {
        FeedSignal::Navigate { url: HOME.into() }
    }

    fn mutation(html: impl Into<String>) -> FeedSignal {
        FeedSignal::Mutation { html: html.into() }
    }

    #[tokio::test]
    async fn sweep_records_sanitized_events() {
        let (router, _) = test_router().await;
        let (tx, handle) = HarvestPipeline::new(router.clone(), quiet_config()).spawn();

        tx.send(navigate()).await.unwrap();
        tx.send(mutation(load_fixture("home_grid.html"))).await.unwrap();
        tx.send(FeedSignal::Sweep).await.unwrap();
        drop(tx);
        let stats = handle.await.unwrap();

        assert_eq!(stats.emitted, 4);
        assert_eq!(stats.accepted, 4);
        assert_eq!(stats.deferred, 1);
        // The queued retry runs on shutdown and finds nothing.
        assert_eq!(stats.retried, 1);

        assert_eq!(
            titles(&router).await,
            vec![
                "Breaking News Today",
                "Cat learns piano",
                "Cooking Pasta at Home",
                "Learning Rust Ownership",
            ]
        );

        let recent: Vec<Event> = router
            .handle("GET_RECENT", Value::Null)
            .await
            .into_data()
            .unwrap();
        assert_eq!(recent.len(), 4);
        assert!(recent.iter().all(|e| e.href.starts_with("https://www.youtube.com/")));
    }

    #[tokio::test]
    async fn deferred_item_is_retried_after_hydration() {
        let (router, _) = test_router().await;
        let config = HarvestConfig {
            hydrate_retry: Duration::from_millis(20),
            ..quiet_config()
        };
        let (tx, handle) = HarvestPipeline::new(router.clone(), config).spawn();

        let empty = r#"
            <ytd-rich-item-renderer>
              <a id="thumbnail" href="/watch?v=LATE0000001"></a>
              <yt-formatted-string id="video-title"></yt-formatted-string>
            </ytd-rich-item-renderer>
        "#;
        let hydrated = r#"
            <ytd-rich-item-renderer>
              <a id="thumbnail" href="/watch?v=LATE0000001"></a>
              <yt-formatted-string id="video-title">Late Arrival</yt-formatted-string>
            </ytd-rich-item-renderer>
        "#;
        tx.send(navigate()).await.unwrap();
        tx.send(mutation(empty)).await.unwrap();
        tx.send(FeedSignal::Sweep).await.unwrap();
        tx.send(mutation(hydrated)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(titles(&router).await, vec!["Late Arrival"]);

        drop(tx);
        let stats = handle.await.unwrap();
        assert_eq!(stats.deferred, 1);
        assert_eq!(stats.retried, 1);
        assert_eq!(stats.accepted, 1);
    }

    #[tokio::test]
    async fn navigation_settle_triggers_a_sweep() {
        let (router, _) = test_router().await;
        let config = HarvestConfig {
            nav_settle: Duration::from_millis(20),
            ..quiet_config()
        };
        let (tx, handle) = HarvestPipeline::new(router.clone(), config).spawn();

        tx.send(navigate()).await.unwrap();
        tx.send(mutation(load_fixture("watch_compact.html"))).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            titles(&router).await,
            vec!["Building a Parser in Rust", "Lofi Radio 24/7"]
        );

        drop(tx);
        assert_eq!(handle.await.unwrap().accepted, 2);
    }

    #[tokio::test]
    async fn only_visible_items_are_processed() {
        let (router, _) = test_router().await;
        let (tx, handle) = HarvestPipeline::new(router.clone(), quiet_config()).spawn();

        tx.send(navigate()).await.unwrap();
        tx.send(mutation(load_fixture("home_grid.html"))).await.unwrap();
        tx.send(FeedSignal::Visible {
            keys: vec!["feed_item:GRID0000001".into(), "feed_item:NOPE".into()],
        })
        .await
        .unwrap();
        drop(tx);
        let stats = handle.await.unwrap();

        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.deferred, 0);
        assert_eq!(titles(&router).await, vec!["Learning Rust Ownership"]);
    }

    #[tokio::test]
    async fn navigation_starts_a_fresh_session() {
        let (router, _) = test_router().await;
        let (tx, handle) = HarvestPipeline::new(router.clone(), quiet_config()).spawn();

        tx.send(navigate()).await.unwrap();
        tx.send(mutation(load_fixture("shorts_shelf.html"))).await.unwrap();
        tx.send(FeedSignal::Sweep).await.unwrap();
        tx.send(FeedSignal::Sweep).await.unwrap();
        // Same page again: the new session sees the items anew.
        tx.send(navigate()).await.unwrap();
        tx.send(FeedSignal::Sweep).await.unwrap();
        drop(tx);
        let stats = handle.await.unwrap();

        assert_eq!(stats.emitted, 4);
        // Re-sightings refresh the existing title entries.
        assert_eq!(
            titles(&router).await,
            vec!["Cat learns piano", "Quick pasta hack"]
        );
    }

    #[tokio::test]
    async fn zero_sweep_interval_does_not_stop_the_pipeline() {
        let (router, _) = test_router().await;
        let mut app = AppConfig::default();
        app.observer.sweep_interval_ms = 0;
        let (tx, handle) = HarvestPipeline::new(router.clone(), HarvestConfig::from(&app)).spawn();

        tx.send(navigate()).await.unwrap();
        tx.send(mutation(load_fixture("watch_compact.html"))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(tx);

        let stats = handle.await.expect("pipeline task must not panic");
        assert_eq!(stats.accepted, 2);
    }
}
