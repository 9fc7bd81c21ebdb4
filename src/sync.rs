use crate::enricher::Enricher;
use crate::error::SyncError;
use crate::fetcher::FeedSource;
use crate::models::{EnrichedItem, FeedItem};
use crate::notifier::{render_message, Notifier};
use crate::state::WatermarkStore;
use chrono::Local;
use tokio::sync::Mutex;

/// Result of one polling cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was still running; this trigger was dropped.
    Skipped,
    /// Nothing newer than the watermark.
    UpToDate,
    Delivered(CycleReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Messages the endpoint accepted.
    pub delivered: usize,
    /// Messages the endpoint refused. They are not resent.
    pub rejected: usize,
    /// Guid the watermark was advanced to.
    pub watermark: String,
}

/// Returns the items newer than `watermark`, in feed order (newest first).
///
/// The cut is the position of the watermark guid. A missing watermark, or one
/// that has rotated out of the fetched window, makes every item new.
pub fn new_items<'a>(items: &'a [FeedItem], watermark: Option<&str>) -> &'a [FeedItem] {
    let cut = watermark
        .and_then(|w| items.iter().position(|item| item.guid == w))
        .unwrap_or(items.len());
    &items[..cut]
}

/// Drives one load → fetch → diff → enrich → notify → persist cycle.
pub struct FeedSync {
    source: Box<dyn FeedSource>,
    enricher: Box<dyn Enricher>,
    notifier: Box<dyn Notifier>,
    store: Box<dyn WatermarkStore>,
    in_flight: Mutex<()>,
}

impl FeedSync {
    pub fn new(
        source: Box<dyn FeedSource>,
        enricher: Box<dyn Enricher>,
        notifier: Box<dyn Notifier>,
        store: Box<dyn WatermarkStore>,
    ) -> Self {
        Self {
            source,
            enricher,
            notifier,
            store,
            in_flight: Mutex::new(()),
        }
    }

    /// Runs a cycle and logs its outcome. Errors never escape, so the
    /// scheduler keeps ticking.
    pub async fn tick(&self) {
        match self.run_cycle().await {
            Ok(CycleOutcome::Skipped) => {
                tracing::warn!("Previous feed check still running, skipping this trigger")
            }
            Ok(CycleOutcome::UpToDate) => tracing::info!("No new items found since last check"),
            Ok(CycleOutcome::Delivered(report)) => tracing::info!(
                delivered = report.delivered,
                rejected = report.rejected,
                watermark = %report.watermark,
                "Feed check completed successfully"
            ),
            Err(e) => tracing::error!(error = %e, "Feed check failed, will retry on next trigger"),
        }
    }

    /// Runs one cycle unless another is already in flight.
    ///
    /// Any fatal error leaves the watermark at its pre-cycle value, so the
    /// unprocessed batch is picked up again next time. Items delivered before
    /// the failure may be delivered twice.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, SyncError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            return Ok(CycleOutcome::Skipped);
        };

        tracing::info!("Starting feed check");
        let watermark = self.store.load();

        let items = self.source.fetch().await?;
        tracing::info!(count = items.len(), "Found items in feed");

        let fresh = new_items(&items, watermark.as_deref());
        let Some(newest) = fresh.first() else {
            return Ok(CycleOutcome::UpToDate);
        };
        tracing::info!(count = fresh.len(), "Processing new items");

        let mut delivered = 0;
        let mut rejected = 0;

        // Oldest first so the chat reads chronologically
        for item in fresh.iter().rev() {
            tracing::info!(guid = %item.guid, title = %item.title, "Processing item");

            let details = self.enricher.enrich(item).await;
            let entry = EnrichedItem {
                item: item.clone(),
                details,
            };
            let message = render_message(&entry, &Local);

            match self.notifier.notify(&message).await {
                Ok(()) => {
                    tracing::info!(guid = %item.guid, "Message sent successfully");
                    delivered += 1;
                }
                Err(e) if !e.is_fatal() => {
                    tracing::error!(guid = %item.guid, error = %e, "Message rejected");
                    rejected += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.store.save(&newest.guid)?;

        Ok(CycleOutcome::Delivered(CycleReport {
            delivered,
            rejected,
            watermark: newest.guid.clone(),
        }))
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
