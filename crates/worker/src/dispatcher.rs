//! Background job dispatcher.
//!
//! A single long-lived task that polls for queued jobs and runs them,
//! one at a time, until the cancellation token is triggered. Claim
//! conflicts with other worker processes resolve inside the executor's
//! compare-and-set and simply no-op here.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use oncoflow_pipeline::store::{JobStore, StoreError};

use crate::executor::{ExecutionOutcome, Executor};

/// Default polling interval for the dispatcher loop.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Polls the queue and feeds claimed jobs to the executor.
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    executor: Executor,
    poll_interval: Duration,
}

impl Dispatcher {
    /// Create a dispatcher with the default 1-second poll interval.
    pub fn new(store: Arc<dyn JobStore>, executor: Executor) -> Self {
        Self {
            store,
            executor,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the dispatcher loop until the cancellation token is triggered.
    ///
    /// A job in flight finishes before shutdown completes; there is no
    /// mid-run cancellation.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Job dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.drain_queue(&cancel).await {
                        tracing::error!(error = %e, "Dispatch cycle failed");
                    }
                }
            }
        }
    }

    /// One dispatch cycle: run queued jobs until the queue is empty or
    /// shutdown is requested.
    async fn drain_queue(&self, cancel: &CancellationToken) -> Result<(), StoreError> {
        while !cancel.is_cancelled() {
            let Some(job) = self.store.find_next_queued().await? else {
                return Ok(());
            };
            let job_id = job.id;
            match self.executor.execute(job).await? {
                ExecutionOutcome::Completed | ExecutionOutcome::Failed => {}
                // A lost claim means another worker owns the record; its
                // status change removes it from the next queue poll.
                ExecutionOutcome::Skipped => {
                    tracing::debug!(job_id, "Skipped job during dispatch");
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}
