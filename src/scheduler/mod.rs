//! Scheduler module: one tick probes every target and records the outcome.

mod aggregate;
mod executor;
mod stats;
mod trigger;
mod uptime;

pub use aggregate::*;
pub use executor::*;
pub use stats::*;
pub use trigger::*;
pub use uptime::*;

use crate::db::TargetStore;
use crate::probe::Prober;

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

/// What a call to [`Dispatcher::run_tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickReport {
    /// Another tick was still running on this dispatcher.
    Skipped,
    /// The target list could not be loaded; nothing was probed.
    Aborted,
    Completed {
        targets: usize,
        updated: usize,
        failed: usize,
    },
}

/// Fans a tick out over all targets.
pub struct Dispatcher {
    store: Arc<dyn TargetStore>,
    prober: Arc<dyn Prober>,
    writer: StatsWriter,
    running: Mutex<()>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn TargetStore>, prober: Arc<dyn Prober>) -> Self {
        Self {
            writer: StatsWriter::new(store.clone()),
            store,
            prober,
            running: Mutex::new(()),
        }
    }

    /// Probe every target once and record the results.
    ///
    /// At most `scheduler_width` targets are probed at a time. Returns once
    /// every target has been written, or immediately if a tick is already running.
    pub async fn run_tick(&self) -> TickReport {
        let _running = match self.running.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("Skipping tick: previous tick still running");
                return TickReport::Skipped;
            }
        };

        tracing::info!("Starting probe tick");

        let targets = match self.store.list_targets() {
            Ok(t) => t,
            Err(e) => {
                tracing::error!("Failed to retrieve targets: {}", e);
                return TickReport::Aborted;
            }
        };

        if targets.is_empty() {
            tracing::info!("No targets to probe");
            return TickReport::Completed { targets: 0, updated: 0, failed: 0 };
        }

        let width = match self.store.scheduler_width() {
            Ok(w) => w.min(Semaphore::MAX_PERMITS),
            Err(e) => {
                tracing::warn!("Failed to get scheduler width, using 1: {}", e);
                1
            }
        };

        tracing::info!("Processing {} targets with scheduler width {}", targets.len(), width);

        let semaphore = Arc::new(Semaphore::new(width));
        let total = targets.len();

        let handles: Vec<_> = targets
            .into_iter()
            .map(|target| {
                let semaphore = semaphore.clone();
                let prober = self.prober.clone();
                let writer = self.writer.clone();

                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();

                    tracing::debug!(
                        "Probing {} ({}) with {} attempts",
                        target.address,
                        target.probe_mode,
                        target.attempt_count
                    );

                    let results = run_attempts(prober, &target).await;
                    let outcome = ProbeOutcome::from_results(&results);

                    match writer.apply(&target, &outcome, Utc::now()) {
                        Ok(()) => {
                            tracing::info!(
                                "Completed {} -> status: {}, avg latency: {}ms ({} attempts, {} succeeded)",
                                target.address,
                                outcome.representative_status,
                                outcome.avg_latency_ms,
                                outcome.attempts,
                                outcome.success_count
                            );
                            true
                        }
                        Err(e) => {
                            tracing::error!("Failed to update DB for {}: {}", target.address, e);
                            false
                        }
                    }
                })
            })
            .collect();

        let mut updated = 0;
        for handle in handles {
            match handle.await {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(e) => tracing::error!("Target task failed: {}", e),
            }
        }

        tracing::info!("Probe tick finished: {}/{} targets updated", updated, total);

        TickReport::Completed {
            targets: total,
            updated,
            failed: total - updated,
        }
    }
}
