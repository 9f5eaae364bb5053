//! Persists a tick's outcome to the target row and the history log.

use crate::db::{DbError, HistoryRecord, Target, TargetStore};

use super::aggregate::ProbeOutcome;
use super::uptime::{next_first_up, UptimeState};

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Applies aggregated outcomes through the storage collaborator.
#[derive(Clone)]
pub struct StatsWriter {
    store: Arc<dyn TargetStore>,
}

impl StatsWriter {
    pub fn new(store: Arc<dyn TargetStore>) -> Self {
        Self { store }
    }

    /// Write `outcome` for `target` as observed at `checked_at`.
    ///
    /// The history row is only appended once the stats update has succeeded.
    pub fn apply(
        &self,
        target: &Target,
        outcome: &ProbeOutcome,
        checked_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let first_up_time = next_first_up(
            UptimeState::from_last_status(target.last_status),
            UptimeState::from_up(outcome.is_up()),
            target.first_up_time,
            checked_at,
        );

        if outcome.has_success {
            self.store.update_probe_stats(
                target.id,
                outcome.representative_status,
                outcome.avg_latency_ms,
                checked_at,
                first_up_time,
            )?;
        } else {
            self.store.update_probe_network_error(
                target.id,
                outcome.avg_latency_ms,
                checked_at,
                first_up_time,
            )?;
        }

        let verdict = outcome.verdict();
        self.store.add_probe_history(&HistoryRecord {
            target_id: target.id,
            latency_ms: outcome.avg_latency_ms,
            timestamp: checked_at,
            status_code: outcome.representative_status,
            status: verdict.status.to_string(),
            description: verdict.description.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ProbeMode, Store};
    use crate::probe::ProbeResult;
    use chrono::{Duration, TimeZone};
    use tempfile::NamedTempFile;

    fn setup() -> (NamedTempFile, Arc<Store>, StatsWriter, i64) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let mut target = Target {
            address: "example.com".to_string(),
            probe_mode: ProbeMode::Http,
            attempt_count: 2,
            ..Default::default()
        };
        let id = store.add_target(&mut target).unwrap();
        let writer = StatsWriter::new(store.clone());
        (tmp, store, writer, id)
    }

    #[test]
    fn test_down_to_up_sets_anchor_and_counters() {
        let (_tmp, store, writer, id) = setup();
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();

        let mut target = store.get_target(id).unwrap();
        // A stale anchor on a down target must not survive the transition
        target.first_up_time = Some(now - Duration::days(2));

        let outcome = ProbeOutcome::from_results(&[
            ProbeResult::status(200, 20),
            ProbeResult::status(200, 41),
        ]);
        writer.apply(&target, &outcome, now).unwrap();

        let t = store.get_target(id).unwrap();
        assert_eq!(t.last_status, 200);
        assert_eq!(t.last_latency_ms, 30);
        assert_eq!(t.first_up_time, Some(now));
        assert_eq!(t.total_probe_count, 1);
        assert_eq!(t.total_latency_sum, 30);

        let history = store.get_probe_history(id, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, "Up");
        assert_eq!(history[0].description, "Succeed");
        assert_eq!(history[0].latency_ms, 30);
        assert_eq!(history[0].timestamp, now);
    }

    #[test]
    fn test_up_to_up_keeps_anchor() {
        let (_tmp, store, writer, id) = setup();
        let first = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        let later = first + Duration::minutes(5);
        let outcome = ProbeOutcome::from_results(&[ProbeResult::status(200, 10)]);

        writer.apply(&store.get_target(id).unwrap(), &outcome, first).unwrap();
        writer.apply(&store.get_target(id).unwrap(), &outcome, later).unwrap();

        let t = store.get_target(id).unwrap();
        assert_eq!(t.first_up_time, Some(first));
        assert_eq!(t.last_checked, Some(later));
        assert_eq!(t.total_probe_count, 2);
    }

    #[test]
    fn test_up_to_down_clears_anchor_and_keeps_counters() {
        let (_tmp, store, writer, id) = setup();
        let first = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        let later = first + Duration::minutes(1);

        let up = ProbeOutcome::from_results(&[ProbeResult::status(200, 10)]);
        writer.apply(&store.get_target(id).unwrap(), &up, first).unwrap();

        let down = ProbeOutcome::from_results(&[
            ProbeResult::network_error(5000),
            ProbeResult::network_error(5002),
        ]);
        writer.apply(&store.get_target(id).unwrap(), &down, later).unwrap();

        let t = store.get_target(id).unwrap();
        assert_eq!(t.last_status, 0);
        assert_eq!(t.last_latency_ms, 5001);
        assert_eq!(t.first_up_time, None);
        assert_eq!(t.total_probe_count, 1);
        assert_eq!(t.total_latency_sum, 10);

        let history = store.get_probe_history(id, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status_code, 0);
        assert_eq!(history[0].status, "Down");
        assert_eq!(history[0].description, "Network Error");
    }

    #[test]
    fn test_non_200_success_is_down_but_counted() {
        let (_tmp, store, writer, id) = setup();
        let now = Utc::now();
        let outcome = ProbeOutcome::from_results(&[ProbeResult::status(429, 12)]);

        writer.apply(&store.get_target(id).unwrap(), &outcome, now).unwrap();

        let t = store.get_target(id).unwrap();
        assert_eq!(t.last_status, 429);
        assert_eq!(t.first_up_time, None);
        assert_eq!(t.total_probe_count, 1);
        assert_eq!(store.get_probe_history(id, 1).unwrap()[0].description, "Too Many Requests");
    }

    #[test]
    fn test_failed_update_skips_history() {
        let (_tmp, store, writer, id) = setup();
        let target = store.get_target(id).unwrap();
        store.delete_target(id).unwrap();

        let outcome = ProbeOutcome::from_results(&[ProbeResult::status(200, 10)]);
        let result = writer.apply(&target, &outcome, Utc::now());

        assert!(matches!(result, Err(DbError::NotFound)));
        assert_eq!(store.count_probe_history().unwrap(), 0);
    }
}
