//! Idempotency retention sweeper
//!
//! Webhook keys only need to outlive the CRMs' redelivery window. The
//! sweeper deletes records older than the retention period on a fixed
//! interval until told to stop.

use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use domain_sync::{SyncError, WebhookIdempotencyGuard};

/// Periodically purges old idempotency records
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    guard: WebhookIdempotencyGuard,
    retention: chrono::Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(guard: WebhookIdempotencyGuard, retention: chrono::Duration, interval: Duration) -> Self {
        Self {
            guard,
            retention,
            interval,
        }
    }

    /// Runs one purge, returning how many records were deleted
    pub async fn sweep_once(&self) -> Result<u64, SyncError> {
        self.guard.purge_older_than(self.retention, Utc::now()).await
    }

    /// Sweeps on every tick until `shutdown` turns true or its sender drops
    ///
    /// The first sweep runs immediately. A failed sweep is logged and retried
    /// on the next tick.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            retention_days = self.retention.num_days(),
            interval_secs = self.interval.as_secs(),
            "retention sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(0) => debug!("retention sweep found nothing to purge"),
                        Ok(deleted) => info!(deleted, "retention sweep purged records"),
                        Err(e) => warn!(error = %e, "retention sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("retention sweeper stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
