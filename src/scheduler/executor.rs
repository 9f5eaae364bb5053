//! Runs every attempt for one target concurrently and waits for all of them.

use crate::db::Target;
use crate::probe::{ProbeResult, Prober};

use std::sync::Arc;
use tokio::sync::Semaphore;

/// Run `target.attempt_count` attempts against `target`.
///
/// At most `attempt_count` attempts are in flight at once. Returns one result
/// per attempt, in submission order, after every attempt has finished.
pub async fn run_attempts(prober: Arc<dyn Prober>, target: &Target) -> Vec<ProbeResult> {
    let attempts = target.attempt_count.max(1) as usize;
    let semaphore = Arc::new(Semaphore::new(attempts));

    let handles: Vec<_> = (0..attempts)
        .map(|index| {
            let prober = prober.clone();
            let semaphore = semaphore.clone();
            let address = target.address.clone();
            let mode = target.probe_mode;

            tokio::spawn(async move {
                // The semaphore is never closed, so acquire cannot fail
                let _permit = semaphore.acquire_owned().await.ok();
                let result = prober.probe(mode, &address).await;

                tracing::debug!(
                    "Attempt {} for {} -> status: {}, latency: {}ms",
                    index + 1,
                    address,
                    result.status,
                    result.latency_ms
                );
                result
            })
        })
        .collect();

    let mut results = Vec::with_capacity(attempts);
    for handle in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::error!("Attempt task for {} failed: {}", target.address, e);
                results.push(ProbeResult::network_error(0));
            }
        }
    }

    results
}
