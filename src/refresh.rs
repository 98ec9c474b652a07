use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::db::SentimentStore;
use crate::error::StoreResult;
use crate::models::{DateWindow, Snapshot};
use crate::sentiment;

/// Latest published snapshot. The refresh loop is the only writer.
///
/// Readers get an `Arc` that stays valid while a newer snapshot is swapped in.
#[derive(Debug, Default)]
pub struct SnapshotCell {
    inner: RwLock<Arc<Snapshot>>,
}

impl SnapshotCell {
    pub fn current(&self) -> Arc<Snapshot> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn publish(&self, snapshot: Snapshot) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(snapshot);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub phrases: usize,
    pub tweets: i64,
}

/// Recompute every watched phrase for `today` and publish the result.
///
/// Nothing is published unless every phrase succeeds.
pub async fn run_cycle(
    store: &dyn SentimentStore,
    cell: &SnapshotCell,
    today: NaiveDate,
) -> StoreResult<CycleStats> {
    let tweets = store.sum_tweets_across_all_entries().await?;
    let phrases = store.find_all_phrases_sorted().await?;
    let window = DateWindow::day(today);

    let mut sentiments = Vec::with_capacity(phrases.len());
    for phrase in &phrases {
        sentiments.push(sentiment::compute_sentiment(store, phrase, window).await?);
    }

    cell.publish(Snapshot { tweets, sentiments });
    Ok(CycleStats {
        phrases: phrases.len(),
        tweets,
    })
}

pub struct RefreshLoop {
    store: Arc<dyn SentimentStore>,
    cell: Arc<SnapshotCell>,
    delay: Duration,
}

impl RefreshLoop {
    pub fn new(store: Arc<dyn SentimentStore>, cell: Arc<SnapshotCell>, delay: Duration) -> Self {
        Self { store, cell, delay }
    }

    /// Run cycles back to back, `delay` apart, until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        info!("refresh loop started delay={}ms", self.delay.as_millis());
        let mut cycle = 0u64;

        loop {
            cycle = cycle.saturating_add(1);
            let today = Utc::now().date_naive();

            tokio::select! {
                _ = shutdown.cancelled() => break,
                outcome = run_cycle(self.store.as_ref(), &self.cell, today) => match outcome {
                    Ok(stats) => debug!(
                        "refresh cycle {} published phrases={} tweets={}",
                        cycle, stats.phrases, stats.tweets
                    ),
                    Err(e) => error!("refresh cycle {} aborted, keeping previous snapshot: {}", cycle, e),
                },
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        info!("refresh loop stopped after {} cycles", cycle);
    }
}
