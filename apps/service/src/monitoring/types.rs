use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::{EventTable, Failure, HeartBeat, Monitor, NewEvent};
use crate::error::MonitorError;

/// Status of a monitoring check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Up,
    Down,
    Unknown,
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorStatus::Up => write!(f, "up"),
            MonitorStatus::Down => write!(f, "down"),
            MonitorStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classified result of one probe, ready to be persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub monitor_id: i64,

    /// When the probe finished
    pub timestamp: DateTime<Utc>,

    /// `Up` for an accepted status code, `Down` for a classified failure
    pub status: MonitorStatus,

    /// Response time in milliseconds
    pub response_time_ms: u64,

    /// HTTP status code, absent when no response was received
    pub status_code: Option<u16>,

    /// Why the probe counts as a failure
    pub error_message: Option<String>,
}

impl CheckResult {
    /// Create a new check result
    pub fn new(monitor_id: i64, response_time_ms: u64) -> Self {
        Self {
            monitor_id,
            timestamp: Utc::now(),
            status: MonitorStatus::Unknown,
            response_time_ms,
            status_code: None,
            error_message: None,
        }
    }

    /// Mark the check as successful
    pub fn success(mut self, status_code: u16) -> Self {
        self.status = MonitorStatus::Up;
        self.status_code = Some(status_code);
        self
    }

    /// Mark the check as a classified failure
    pub fn failure(mut self, status_code: Option<u16>, error: String) -> Self {
        self.status = MonitorStatus::Down;
        self.status_code = status_code;
        self.error_message = Some(error);
        self
    }

    pub fn is_up(&self) -> bool {
        self.status == MonitorStatus::Up
    }

    /// Table this result belongs to
    pub fn table(&self) -> EventTable {
        if self.is_up() { EventTable::HeartBeats } else { EventTable::Failures }
    }

    pub fn to_new_event(&self) -> NewEvent {
        NewEvent {
            monitor_id: self.monitor_id,
            status_code: self.status_code,
            response_time: self.response_time_ms,
            created_at: self.timestamp,
        }
    }
}

/// A monitor together with its recently recorded history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSnapshot {
    pub monitor: Arc<Monitor>,
    /// Newest first
    pub heart_beats: Vec<HeartBeat>,
    pub last_heart_beat: Option<HeartBeat>,
    /// Oldest first
    pub failures: Vec<Failure>,
}

impl MonitorSnapshot {
    pub fn new(monitor: Arc<Monitor>, heart_beats: Vec<HeartBeat>, failures: Vec<Failure>) -> Self {
        let last_heart_beat = heart_beats.iter().max_by_key(|beat| beat.id).cloned();
        Self { monitor, heart_beats, last_heart_beat, failures }
    }

    pub fn last_failure(&self) -> Option<&Failure> {
        self.failures.iter().max_by_key(|failure| failure.id)
    }

    /// Status implied by whichever of the last heartbeat and last failure is newer
    pub fn status(&self) -> MonitorStatus {
        match (&self.last_heart_beat, self.last_failure()) {
            (None, None) => MonitorStatus::Unknown,
            (Some(_), None) => MonitorStatus::Up,
            (None, Some(_)) => MonitorStatus::Down,
            (Some(beat), Some(failure)) => {
                if beat.created_at > failure.created_at {
                    MonitorStatus::Up
                } else {
                    MonitorStatus::Down
                }
            }
        }
    }
}

/// What a tick (or a retention pass) reports to the presentation layer
#[derive(Debug)]
pub enum MonitorEvent {
    /// Heartbeat recorded
    Success { snapshot: MonitorSnapshot },

    /// Anything else. `snapshot` is set when a classified failure was recorded.
    Error {
        monitor: Arc<Monitor>,
        snapshot: Option<MonitorSnapshot>,
        error: MonitorError,
    },
}
