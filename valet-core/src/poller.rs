// ABOUTME: Generic background feed poller: fetch since checkpoint, deliver, sleep.
// ABOUTME: Errors back off without advancing the checkpoint; stop is cooperative and synchronous.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::metrics;

/// Cursor marking the boundary of already-delivered feed items.
///
/// Owned exclusively by one poller; advances only after a full
/// fetch-and-deliver cycle succeeds and never regresses. In-memory only:
/// a restarted process re-observes from `Origin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkpoint {
    /// Nothing delivered yet
    Origin,
    /// Everything up to and including this instant has been delivered
    Timestamp(DateTime<Utc>),
    /// Everything up to and including this item id has been delivered
    LastId(String),
}

impl Checkpoint {
    pub fn is_origin(&self) -> bool {
        matches!(self, Self::Origin)
    }

    /// Timestamp cursor value, if this is a timestamp checkpoint
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Item-id cursor value, if this is a last-id checkpoint
    pub fn as_last_id(&self) -> Option<&str> {
        match self {
            Self::LastId(id) => Some(id),
            _ => None,
        }
    }
}

/// One fetch cycle's output: new items in delivery order, plus the
/// checkpoint the poller should hold once all of them are delivered.
/// When nothing is new, `checkpoint` echoes the cursor that was passed in.
#[derive(Debug)]
pub struct FetchBatch<T> {
    pub items: Vec<T>,
    pub checkpoint: Checkpoint,
}

impl<T> FetchBatch<T> {
    /// A batch with no new items, keeping the current cursor
    pub fn empty(since: &Checkpoint) -> Self {
        Self {
            items: Vec::new(),
            checkpoint: since.clone(),
        }
    }
}

/// A feed the poller observes.
///
/// `poll` must be side-effect-free with respect to checkpoint state; the
/// poller owns the cursor and advances it only after delivery succeeds.
#[async_trait]
pub trait FeedSource: Send + 'static {
    type Item: Send + 'static;

    /// Feed name for logging and metrics
    fn name(&self) -> &str;

    /// Fetch items newer than `since`, in delivery order
    async fn poll(&mut self, since: &Checkpoint) -> Result<FetchBatch<Self::Item>>;
}

/// Delivery callback for fetched items.
///
/// Delivery is at-least-once: a failed cycle is retried from the same
/// checkpoint, so implementations must be idempotent or dedupe by item
/// identity.
#[async_trait]
pub trait Deliver<T>: Send + Sync + 'static {
    async fn deliver(&self, item: T) -> Result<()>;
}

/// Polling cadence. `backoff` applies after a failed cycle and must be at
/// least `interval`.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub backoff: Duration,
}

impl PollerConfig {
    pub fn new(interval: Duration, backoff: Duration) -> Result<Self> {
        if backoff < interval {
            bail!(
                "poller backoff ({:?}) must be at least the poll interval ({:?})",
                backoff,
                interval
            );
        }
        Ok(Self { interval, backoff })
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            backoff: Duration::from_secs(300),
        }
    }
}

/// Handle to one running feed poller task.
///
/// Created via `spawn`; the loop runs until `stop` is called. `stop` is
/// cooperative (an in-flight fetch or delivery is never aborted) but
/// observably synchronous: it wakes a sleeping loop promptly and returns
/// only once the task has actually exited.
pub struct BackgroundPoller {
    name: String,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundPoller {
    /// Spawn the polling loop for `source`, delivering each fetched item
    /// through `deliver`.
    pub fn spawn<S, D>(source: S, deliver: D, config: PollerConfig) -> Self
    where
        S: FeedSource,
        D: Deliver<S::Item>,
    {
        let name = source.name().to_string();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(source, deliver, config, shutdown_rx));
        Self {
            name,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Feed name this poller observes
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request the loop to exit and wait until it has
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                tracing::error!(feed = %self.name, error = %err, "poller task terminated abnormally");
            }
        }
        tracing::info!(feed = %self.name, "feed poller stopped");
    }
}

async fn run_loop<S, D>(
    mut source: S,
    deliver: D,
    config: PollerConfig,
    mut shutdown: watch::Receiver<bool>,
) where
    S: FeedSource,
    D: Deliver<S::Item>,
{
    let feed = source.name().to_string();
    let mut checkpoint = Checkpoint::Origin;
    tracing::info!(
        feed = %feed,
        interval_secs = config.interval.as_secs(),
        backoff_secs = config.backoff.as_secs(),
        "feed poller started"
    );

    loop {
        if *shutdown.borrow() {
            break;
        }

        let wait = match run_cycle(&mut source, &deliver, &mut checkpoint).await {
            Ok(0) => config.interval,
            Ok(delivered) => {
                tracing::debug!(feed = %feed, delivered, "poll cycle delivered new items");
                metrics::record_feed_items(&feed, delivered);
                config.interval
            }
            Err(err) => {
                // Checkpoint untouched: the failed batch is re-fetched and
                // re-delivered after the backoff window.
                tracing::warn!(feed = %feed, error = %err, "poll cycle failed; backing off");
                metrics::record_feed_error(&feed);
                config.backoff
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => {}
        }
    }
}

/// One fetch-and-deliver cycle. The checkpoint advances only if the fetch
/// and every delivery succeed.
async fn run_cycle<S, D>(source: &mut S, deliver: &D, checkpoint: &mut Checkpoint) -> Result<usize>
where
    S: FeedSource,
    D: Deliver<S::Item>,
{
    let batch = source.poll(checkpoint).await.context("fetch failed")?;
    let count = batch.items.len();
    for item in batch.items {
        deliver.deliver(item).await.context("delivery failed")?;
    }
    *checkpoint = batch.checkpoint;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_backoff_shorter_than_interval_rejected() {
        let result = PollerConfig::new(Duration::from_secs(300), Duration::from_secs(60));
        assert!(result.is_err());
    }

    #[test]
    fn test_backoff_equal_to_interval_accepted() {
        let config = PollerConfig::new(Duration::from_secs(60), Duration::from_secs(60)).unwrap();
        assert_eq!(config.interval, config.backoff);
    }

    #[test]
    fn test_checkpoint_accessors() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(Checkpoint::Origin.is_origin());
        assert_eq!(Checkpoint::Timestamp(ts).as_timestamp(), Some(ts));
        assert_eq!(Checkpoint::LastId("p9".into()).as_last_id(), Some("p9"));
        assert_eq!(Checkpoint::Origin.as_timestamp(), None);
    }

    #[test]
    fn test_empty_batch_keeps_cursor() {
        let since = Checkpoint::LastId("p3".into());
        let batch: FetchBatch<()> = FetchBatch::empty(&since);
        assert!(batch.items.is_empty());
        assert_eq!(batch.checkpoint, since);
    }
}
