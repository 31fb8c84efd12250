use std::sync::Arc;

use tracing::debug;

use super::types::{CheckResult, MonitorSnapshot};
use crate::database::models::Monitor;
use crate::database::{Database, StoreError};

/// Persists classified outcomes and rebuilds the monitor's snapshot
#[derive(Clone)]
pub struct OutcomeRecorder {
    database: Arc<dyn Database>,
    heart_beat_history: usize,
}

impl OutcomeRecorder {
    pub fn new(database: Arc<dyn Database>, heart_beat_history: usize) -> Self {
        Self { database, heart_beat_history: heart_beat_history.max(1) }
    }

    /// Insert exactly one row for `result`, then reload the snapshot.
    /// A failed insert is returned as-is and no reload is attempted.
    pub async fn record(&self, monitor: &Arc<Monitor>, result: &CheckResult) -> Result<MonitorSnapshot, StoreError> {
        let table = result.table();
        let id = self.database.insert_event(table, &result.to_new_event()).await?;
        debug!(monitor_id = monitor.id, %table, row_id = id, "Recorded check result");

        self.snapshot(monitor).await
    }

    /// Load recent heartbeats (newest first) and every failure of `monitor`
    pub async fn snapshot(&self, monitor: &Arc<Monitor>) -> Result<MonitorSnapshot, StoreError> {
        let heart_beats = self.database.get_heart_beats(monitor.id, self.heart_beat_history).await?;
        let failures = self.database.get_failures(monitor.id).await?;

        Ok(MonitorSnapshot::new(Arc::clone(monitor), heart_beats, failures))
    }
}
