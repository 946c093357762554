use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::ReconcileConfig;
use crate::dispatch::{DispatchQueue, JobMessage};
use crate::store::{JobStore, StoreError};

/// Outcome of a single reconciliation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Stale queued records examined
    pub scanned: usize,
    /// Records whose message was missing and has been published again
    pub republished: usize,
    /// Records that could not be checked or published this round
    pub failed: usize,
}

/// Repairs the gap left when a job was recorded but never published.
///
/// Each sweep looks at `queued` records older than the grace interval and
/// republishes any whose message is no longer on its dispatch queue. Dispatch
/// is therefore at-least-once: if a worker pops the original message between
/// the check and the republish, two workers may receive the same id. Only one
/// of them can win the conditional `queued -> processing` update; the other
/// sees an invalid transition and drops the message.
pub struct Reconciler {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn DispatchQueue>,
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn DispatchQueue>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    /// Check every stale queued job once, a page of `batch_size` at a time.
    ///
    /// Paging continues past jobs whose message is still live, so a backlog
    /// of one type cannot hide a stuck job behind it.
    pub async fn sweep_once(&self) -> Result<SweepReport, StoreError> {
        let grace = chrono::Duration::from_std(self.config.grace)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = Utc::now() - grace;
        let page_size = self.config.batch_size.max(1);

        let mut report = SweepReport::default();
        let mut after = None;

        loop {
            let page = self
                .store
                .list_stale_queued(cutoff, after, page_size)
                .await?;
            report.scanned += page.len();

            for stale in &page {
                self.repair(&stale.message, &mut report).await;
            }

            match page.last() {
                Some(last) if page.len() == page_size => after = Some(last.cursor()),
                _ => break,
            }
        }

        Ok(report)
    }

    async fn repair(&self, msg: &JobMessage, report: &mut SweepReport) {
        match self.queue.contains(&msg.job_type, msg.job_id).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(job_id = %msg.job_id, error = %e, "Failed to inspect dispatch queue");
                report.failed += 1;
                return;
            }
        }

        match self.queue.enqueue(msg.job_id, &msg.job_type).await {
            Ok(()) => {
                tracing::info!(job_id = %msg.job_id, job_type = %msg.job_type, "Republished stuck job");
                report.republished += 1;
            }
            Err(e) => {
                tracing::warn!(job_id = %msg.job_id, error = %e, "Failed to republish stuck job");
                report.failed += 1;
            }
        }
    }

    /// Sweep on the configured interval until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let period = self.config.interval.max(Duration::from_millis(10));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            interval_ms = period.as_millis() as u64,
            grace_ms = self.config.grace.as_millis() as u64,
            "Starting reconciliation loop"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Reconciliation loop stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report.republished > 0 || report.failed > 0 => {
                            tracing::info!(
                                scanned = report.scanned,
                                republished = report.republished,
                                failed = report.failed,
                                "Reconciliation sweep finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Reconciliation sweep failed"),
                    }
                }
            }
        }
    }
}
