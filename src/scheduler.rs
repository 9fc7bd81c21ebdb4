use crate::sync::FeedSync;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Fires a sync cycle on every wall-clock multiple of `interval`,
/// the way `*/15 * * * *` does for a 15 minute interval.
pub struct Scheduler {
    sync: Arc<FeedSync>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(sync: Arc<FeedSync>, interval: Duration) -> Self {
        Self { sync, interval }
    }

    /// Runs until the task is dropped. Each tick is fire-and-forget; the
    /// sync's own in-flight guard drops ticks that overlap a running cycle.
    pub async fn run(self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        loop {
            let now = Utc::now();
            let next = next_tick(now, self.interval);
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::debug!(next = %next, "Waiting for next feed check");
            tokio::time::sleep(wait).await;

            tracing::info!("Starting scheduled feed check");
            let sync = Arc::clone(&self.sync);
            tokio::spawn(async move { sync.tick().await });
        }
    }
}

/// First boundary strictly after `now` that is a multiple of `interval`
/// since the Unix epoch.
pub fn next_tick(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let step = interval.as_millis().max(1) as i64;
    let now_ms = now.timestamp_millis();
    let next_ms = (now_ms.div_euclid(step) + 1) * step;
    DateTime::from_timestamp_millis(next_ms).unwrap_or(now)
}
