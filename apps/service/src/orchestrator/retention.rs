//! Retention of heartbeat and failure rows.
//!
//! A monitor with `keep_data_for_days` set and at least one heartbeat has
//! every row older than `now - keep_data_for_days` removed from both event
//! tables. Each monitor/table pair is purged independently so one failing
//! delete does not hold back the rest of the pass.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::database::Database;
use crate::database::models::{EventTable, Monitor};
use crate::error::MonitorError;

/// Rows removed from one table for one monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub monitor_id: i64,
    pub table: EventTable,
    pub count: u64,
}

#[derive(Debug, Default)]
pub struct RetentionReport {
    pub deleted: Vec<Deletion>,
    /// Monitors without a retention window or without any heartbeat
    pub skipped: usize,
    pub errors: Vec<(Arc<Monitor>, MonitorError)>,
}

impl RetentionReport {
    pub fn total_deleted(&self) -> u64 {
        self.deleted.iter().map(|deletion| deletion.count).sum()
    }
}

/// Rows created strictly before this instant are expired
pub fn retention_cutoff(now: DateTime<Utc>, keep_data_for_days: u32) -> DateTime<Utc> {
    now - Duration::days(i64::from(keep_data_for_days))
}

/// Deletes expired event rows
pub struct RetentionCollector {
    database: Arc<dyn Database>,
}

enum MonitorPass {
    Skipped,
    Done { deleted: Vec<Deletion>, errors: Vec<MonitorError> },
}

impl RetentionCollector {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self { database }
    }

    /// Run one pass over `monitors`. Never fails as a whole; per-monitor
    /// problems are collected in the report.
    pub async fn collect(&self, monitors: &[Arc<Monitor>], now: DateTime<Utc>) -> RetentionReport {
        let passes = join_all(monitors.iter().map(|monitor| self.collect_monitor(monitor, now))).await;

        let mut report = RetentionReport::default();
        for (monitor, pass) in monitors.iter().zip(passes) {
            match pass {
                MonitorPass::Skipped => report.skipped += 1,
                MonitorPass::Done { deleted, errors } => {
                    report.deleted.extend(deleted);
                    report.errors.extend(errors.into_iter().map(|error| (Arc::clone(monitor), error)));
                }
            }
        }

        if report.errors.is_empty() {
            debug!(deleted = report.total_deleted(), skipped = report.skipped, "Retention pass completed");
        } else {
            warn!(
                deleted = report.total_deleted(),
                errors = report.errors.len(),
                "Retention pass completed with errors"
            );
        }

        report
    }

    async fn collect_monitor(&self, monitor: &Monitor, now: DateTime<Utc>) -> MonitorPass {
        // 0 counts as unset
        let Some(days) = monitor.keep_data_for_days.filter(|days| *days > 0) else {
            return MonitorPass::Skipped;
        };

        match self.database.get_heart_beats(monitor.id, 1).await {
            Ok(beats) if beats.is_empty() => return MonitorPass::Skipped,
            Ok(_) => {}
            Err(source) => {
                return MonitorPass::Done {
                    deleted: Vec::new(),
                    errors: vec![MonitorError::Retention {
                        monitor_id: monitor.id,
                        table: EventTable::HeartBeats,
                        source,
                    }],
                };
            }
        }

        let cutoff = retention_cutoff(now, days);
        let (heart_beats, failures) = tokio::join!(
            self.purge(monitor.id, EventTable::HeartBeats, cutoff),
            self.purge(monitor.id, EventTable::Failures, cutoff),
        );

        let mut deleted = Vec::new();
        let mut errors = Vec::new();
        for (table, outcome) in [(EventTable::HeartBeats, heart_beats), (EventTable::Failures, failures)] {
            match outcome {
                Ok(0) => {}
                Ok(count) => deleted.push(Deletion { monitor_id: monitor.id, table, count }),
                Err(error) => errors.push(error),
            }
        }

        MonitorPass::Done { deleted, errors }
    }

    async fn purge(&self, monitor_id: i64, table: EventTable, cutoff: DateTime<Utc>) -> Result<u64, MonitorError> {
        let retention_error = |source| MonitorError::Retention { monitor_id, table, source };

        let ids = self
            .database
            .get_expired_event_ids(table, monitor_id, cutoff)
            .await
            .map_err(retention_error)?;

        if ids.is_empty() {
            return Ok(0);
        }

        info!(monitor_id, %table, count = ids.len(), "Deleting expired rows");
        self.database.delete_events(table, &ids).await.map_err(retention_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::NewMonitor;
    use crate::monitoring::testing::MemoryDatabase;

    fn monitor(id: i64, keep_data_for_days: Option<u32>) -> Arc<Monitor> {
        let mut monitor = NewMonitor::new(format!("monitor-{id}"), "https://example.com");
        monitor.heart_beat_interval = 1;
        monitor.keep_data_for_days = keep_data_for_days;
        Arc::new(monitor.into_monitor(id, Utc::now()))
    }

    #[test]
    fn test_cutoff_uses_whole_days() {
        let now = Utc::now();
        assert_eq!(now - retention_cutoff(now, 1), Duration::milliseconds(86_400_000));
        assert_eq!(now - retention_cutoff(now, 30), Duration::days(30));
    }

    #[tokio::test]
    async fn test_deletes_old_heart_beats_and_keeps_recent() {
        let database = Arc::new(MemoryDatabase::default());
        let now = Utc::now();
        for _ in 0..5 {
            database.seed(EventTable::HeartBeats, 1, now - Duration::days(3));
        }
        let recent: Vec<_> = (0..2).map(|_| database.seed(EventTable::HeartBeats, 1, now)).collect();

        let collector = RetentionCollector::new(database.clone());
        let report = collector.collect(&[monitor(1, Some(1))], now).await;

        assert_eq!(report.total_deleted(), 5);
        assert!(report.errors.is_empty());
        let remaining: Vec<_> = database.rows(EventTable::HeartBeats).iter().map(|row| row.id).collect();
        assert_eq!(remaining, recent);
    }

    #[tokio::test]
    async fn test_second_pass_deletes_nothing() {
        let database = Arc::new(MemoryDatabase::default());
        let now = Utc::now();
        database.seed(EventTable::HeartBeats, 1, now);
        database.seed(EventTable::HeartBeats, 1, now - Duration::days(10));
        database.seed(EventTable::Failures, 1, now - Duration::days(10));

        let collector = RetentionCollector::new(database.clone());
        let monitors = [monitor(1, Some(2))];

        assert_eq!(collector.collect(&monitors, now).await.total_deleted(), 2);
        let second = collector.collect(&monitors, now).await;
        assert_eq!(second.total_deleted(), 0);
        assert!(second.deleted.is_empty());
    }

    #[tokio::test]
    async fn test_monitor_without_retention_is_untouched() {
        let database = Arc::new(MemoryDatabase::default());
        let now = Utc::now();
        database.seed(EventTable::HeartBeats, 1, now - Duration::days(400));
        database.seed(EventTable::Failures, 1, now - Duration::days(400));

        let collector = RetentionCollector::new(database.clone());
        let report = collector.collect(&[monitor(1, None), monitor(1, Some(0))], now).await;

        assert_eq!(report.skipped, 2);
        assert_eq!(report.total_deleted(), 0);
        assert_eq!(database.rows(EventTable::HeartBeats).len(), 1);
        assert_eq!(database.rows(EventTable::Failures).len(), 1);
    }

    #[tokio::test]
    async fn test_monitor_without_heart_beat_is_skipped() {
        let database = Arc::new(MemoryDatabase::default());
        let now = Utc::now();
        database.seed(EventTable::Failures, 1, now - Duration::days(30));

        let report = RetentionCollector::new(database.clone()).collect(&[monitor(1, Some(1))], now).await;

        assert_eq!(report.skipped, 1);
        assert_eq!(database.rows(EventTable::Failures).len(), 1);
    }

    #[tokio::test]
    async fn test_rows_at_or_after_cutoff_are_preserved() {
        let database = Arc::new(MemoryDatabase::default());
        let now = Utc::now();
        let cutoff = retention_cutoff(now, 1);
        let expired = database.seed(EventTable::HeartBeats, 1, cutoff - Duration::seconds(1));
        let at_cutoff = database.seed(EventTable::HeartBeats, 1, cutoff);
        let after_cutoff = database.seed(EventTable::HeartBeats, 1, cutoff + Duration::seconds(1));

        RetentionCollector::new(database.clone()).collect(&[monitor(1, Some(1))], now).await;

        let remaining: Vec<_> = database.rows(EventTable::HeartBeats).iter().map(|row| row.id).collect();
        assert!(!remaining.contains(&expired));
        assert_eq!(remaining, vec![at_cutoff, after_cutoff]);
    }

    #[tokio::test]
    async fn test_delete_failure_is_isolated() {
        let database = Arc::new(MemoryDatabase::default());
        let now = Utc::now();
        let old = now - Duration::days(5);
        for monitor_id in [1, 2] {
            database.seed(EventTable::HeartBeats, monitor_id, now);
            database.seed(EventTable::HeartBeats, monitor_id, old);
            database.seed(EventTable::Failures, monitor_id, old);
        }
        database.fail_deletes_for(EventTable::HeartBeats);

        let report = RetentionCollector::new(database.clone())
            .collect(&[monitor(1, Some(1)), monitor(2, Some(1))], now)
            .await;

        assert_eq!(report.errors.len(), 2);
        assert!(report.errors.iter().all(|(_, error)| matches!(
            error,
            MonitorError::Retention { table: EventTable::HeartBeats, .. }
        )));
        assert_eq!(report.total_deleted(), 2);
        assert!(database.rows(EventTable::Failures).is_empty());
        assert_eq!(database.rows(EventTable::HeartBeats).len(), 4);
    }
}
