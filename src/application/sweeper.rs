use super::engine::OrderEngine;
use crate::error::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of one sweep over dispatched orders.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub completed: usize,
    /// Orders somebody else settled or moved first.
    pub skipped: usize,
    pub failed: usize,
}

/// Completes dispatched orders whose grace period ran out, on the buyer's
/// behalf. Safe to run concurrently with itself and with buyers confirming:
/// settlement happens at most once per order.
pub struct AutoCompletionTimer {
    engine: Arc<OrderEngine>,
    interval: Duration,
}

impl AutoCompletionTimer {
    pub fn new(engine: Arc<OrderEngine>) -> Self {
        let interval = engine.config().sweep_interval();
        Self { engine, interval }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = self.engine.now();
        let due = self.engine.due_for_auto_completion(now).await?;
        let mut report = SweepReport {
            scanned: due.len(),
            ..SweepReport::default()
        };

        for order in due {
            match self.engine.auto_complete(&order.id).await {
                Ok(_) => report.completed += 1,
                Err(e) if e.is_benign() => {
                    debug!(order_id = %order.id, reason = %e, "skipped");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "auto-completion failed");
                    report.failed += 1;
                }
            }
        }

        debug!(
            scanned = report.scanned,
            completed = report.completed,
            skipped = report.skipped,
            failed = report.failed,
            "sweep finished"
        );
        Ok(report)
    }

    /// Sweeps every interval until `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        tokio::pin!(shutdown);
        info!(interval_secs = self.interval.as_secs(), "auto-completion timer started");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        warn!(error = %e, "sweep failed");
                    }
                }
            }
        }
        info!("auto-completion timer stopped");
    }
}
