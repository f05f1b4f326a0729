//! Periodic feed polling and delivery.
//!
//! Each pass loads the active feeds, fetches their entries, filters out
//! anything already in the ledger, renders the rest and hands them to the
//! delivery sink. Failures are contained to the feed or entry they occur in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::domain::{Destination, FeedConfig, FeedEntry};
use crate::fetcher::FeedSource;
use crate::render::render;
use crate::store::{FeedCatalog, Ledger};
use crate::transport::DeliverySink;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
}

/// Counters for one poll pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub feeds: usize,
    pub delivered: usize,
    pub already_sent: usize,
    pub failed_feeds: usize,
    pub failed_entries: usize,
}

pub struct Poller {
    catalog: Arc<dyn FeedCatalog + Send + Sync>,
    ledger: Arc<dyn Ledger + Send + Sync>,
    source: Arc<dyn FeedSource + Send + Sync>,
    sink: Arc<dyn DeliverySink + Send + Sync>,
    interval: Duration,
    poll_on_start: bool,
    polling: AtomicBool,
    span: Span,
}

impl Poller {
    pub fn new(
        catalog: Arc<dyn FeedCatalog + Send + Sync>,
        ledger: Arc<dyn Ledger + Send + Sync>,
        source: Arc<dyn FeedSource + Send + Sync>,
        sink: Arc<dyn DeliverySink + Send + Sync>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            source,
            sink,
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            poll_on_start: false,
            polling: AtomicBool::new(false),
            span: info_span!("poller"),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_poll_on_start(mut self, poll_on_start: bool) -> Self {
        self.poll_on_start = poll_on_start;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn state(&self) -> PollerState {
        if self.polling.load(Ordering::SeqCst) {
            PollerState::Polling
        } else {
            PollerState::Idle
        }
    }

    /// Tick until `shutdown` changes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let span = self.span.clone();
        async move {
            info!("Poller started (interval: {}s)", self.interval.as_secs());

            let mut timer = interval(self.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately.
            timer.tick().await;

            if self.poll_on_start {
                self.poll_once().await;
            }

            loop {
                tokio::select! {
                    _ = timer.tick() => {}
                    _ = shutdown.changed() => break,
                }
                self.poll_once().await;
            }

            info!("Poller stopped");
        }
        .instrument(span)
        .await
    }

    /// Run a single pass. Returns `None` if another pass was already running.
    pub async fn poll_once(&self) -> Option<PollSummary> {
        if self
            .polling
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Previous poll pass still running; skipping this tick");
            return None;
        }

        let summary = self.pass().instrument(self.span.clone()).await;
        self.polling.store(false, Ordering::SeqCst);
        Some(summary)
    }

    async fn pass(&self) -> PollSummary {
        let start = Utc::now();
        let mut summary = PollSummary::default();

        let feeds = match self.catalog.active_feeds() {
            Ok(feeds) => feeds,
            Err(e) => {
                error!("Failed to load active feeds: {}", e);
                return summary;
            }
        };

        if feeds.is_empty() {
            debug!("No active feeds");
            return summary;
        }

        for feed in &feeds {
            summary.feeds += 1;
            self.poll_feed(feed, &mut summary).await;
        }

        let elapsed = Utc::now().signed_duration_since(start);
        info!(
            "Poll complete: {} feeds, {} delivered, {} failed feeds, {} failed entries ({:.1}s)",
            summary.feeds,
            summary.delivered,
            summary.failed_feeds,
            summary.failed_entries,
            elapsed.num_milliseconds() as f64 / 1000.0
        );
        summary
    }

    async fn poll_feed(&self, feed: &FeedConfig, summary: &mut PollSummary) {
        let Some(destination) = self.resolve_destination(feed) else {
            summary.failed_feeds += 1;
            return;
        };

        let entries = match self.source.fetch_entries(&feed.url).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to fetch feed {}: {}", feed.url, e);
                summary.failed_feeds += 1;
                return;
            }
        };

        for entry in &entries {
            self.process_entry(feed, &destination, entry, summary).await;
        }
    }

    fn resolve_destination(&self, feed: &FeedConfig) -> Option<Destination> {
        let Some(destination_id) = feed.destination_id else {
            warn!("Feed {} has no destination; skipping", feed.url);
            return None;
        };

        match self.catalog.destination(destination_id) {
            Ok(Some(destination)) => Some(destination),
            Ok(None) => {
                warn!(
                    "Destination {} for feed {} not found; skipping",
                    destination_id, feed.url
                );
                None
            }
            Err(e) => {
                error!("Failed to resolve destination for feed {}: {}", feed.url, e);
                None
            }
        }
    }

    async fn process_entry(
        &self,
        feed: &FeedConfig,
        destination: &Destination,
        entry: &FeedEntry,
        summary: &mut PollSummary,
    ) {
        match self.ledger.has_been_sent(feed.id, &entry.guid) {
            Ok(true) => {
                summary.already_sent += 1;
                return;
            }
            Ok(false) => {}
            Err(e) => {
                error!("Ledger lookup failed for {} in {}: {}", entry.guid, feed.url, e);
                summary.failed_entries += 1;
                return;
            }
        }

        let rendered = render(&feed.format, entry);
        if let Err(e) = self.sink.deliver(destination, &rendered).await {
            error!(
                "Failed to deliver '{}' to {}: {}",
                entry.display_title(),
                destination.channel_id,
                e
            );
            summary.failed_entries += 1;
            return;
        }

        summary.delivered += 1;
        info!(
            "Sent '{}' from {} to {}",
            entry.display_title(),
            feed.url,
            destination.channel_id
        );

        // A failure here means the entry may be delivered again next tick.
        if let Err(e) = self.ledger.record_sent(feed.id, &entry.guid, &entry.title) {
            error!("Failed to record {} for {}: {}", entry.guid, feed.url, e);
            summary.failed_entries += 1;
        }
    }
}
