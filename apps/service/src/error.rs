use thiserror::Error;

use crate::database::StoreError;
use crate::database::models::EventTable;
use crate::monitoring::checker::ProbeError;

/// Everything a tick or retention pass can report. None of these stop a
/// monitor's timer.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Out-of-range status or transport error; recorded as a failure row
    #[error("monitor {monitor_id} is down{}: {reason}", status_suffix(.status_code))]
    ClassifiedFailure {
        monitor_id: i64,
        status_code: Option<u16>,
        reason: String,
    },

    /// Malformed configuration or unexpected probe error; not recorded
    #[error("probe error: {0}")]
    UnclassifiedProbe(#[from] ProbeError),

    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("retention failed for monitor {monitor_id} ({table}): {source}")]
    Retention {
        monitor_id: i64,
        table: EventTable,
        #[source]
        source: StoreError,
    },

    /// Rejected before scheduling
    #[error("invalid monitor {monitor_id}: {reason}")]
    InvalidMonitor { monitor_id: i64, reason: String },
}

impl MonitorError {
    /// Whether the underlying outcome was persisted as a failure row
    pub fn is_recorded(&self) -> bool {
        matches!(self, MonitorError::ClassifiedFailure { .. })
    }
}

fn status_suffix(status_code: &Option<u16>) -> String {
    status_code.map(|code| format!(" (status {code})")).unwrap_or_default()
}
