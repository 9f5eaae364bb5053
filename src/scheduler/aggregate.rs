//! Reduction of a target's attempt results into one per-tick outcome.

use crate::probe::ProbeResult;

/// Aggregated result of every attempt against one target in one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// `floor(sum(latency) / attempts)` over all attempts, failed ones included.
    pub avg_latency_ms: i64,
    /// At least one attempt got a response (status > 0).
    pub has_success: bool,
    /// Status of the last responding attempt in submission order, 0 if none.
    pub representative_status: u16,
    /// Attempts that returned exactly 200.
    pub success_count: usize,
    pub attempts: usize,
}

/// Human-readable label pair stored with each history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub status: &'static str,
    pub description: &'static str,
}

impl ProbeOutcome {
    /// Aggregate results given in submission order.
    ///
    /// When several attempts respond, the one submitted last supplies the
    /// representative status, so the result does not depend on completion order.
    pub fn from_results(results: &[ProbeResult]) -> Self {
        let mut total_latency: i64 = 0;
        let mut representative_status = 0;
        let mut has_success = false;
        let mut success_count = 0;

        for result in results {
            total_latency = total_latency.saturating_add(result.latency_ms);

            if result.is_success() {
                representative_status = result.status;
                has_success = true;
                if result.status == 200 {
                    success_count += 1;
                }
            }
        }

        let avg_latency_ms = if results.is_empty() {
            0
        } else {
            total_latency.div_euclid(results.len() as i64)
        };

        Self {
            avg_latency_ms,
            has_success,
            representative_status,
            success_count,
            attempts: results.len(),
        }
    }

    /// Up only when something answered and the representative status is 200.
    pub fn is_up(&self) -> bool {
        self.has_success && self.representative_status == 200
    }

    pub fn verdict(&self) -> Verdict {
        classify(self.representative_status, self.has_success)
    }
}

/// Map a representative status to its label and description.
pub fn classify(status: u16, has_success: bool) -> Verdict {
    let (status, description) = match (has_success, status) {
        (false, _) => ("Down", "Network Error"),
        (true, 200) => ("Up", "Succeed"),
        (true, 429) => ("Up", "Too Many Requests"),
        (true, _) => ("Up", "Warning"),
    };
    Verdict { status, description }
}
