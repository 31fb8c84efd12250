use chrono::{DateTime, Duration, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// SQLite `CURRENT_TIMESTAMP` layout. Every `created_at` is written and
/// compared in this format, always in UTC.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Monitor model - a configured HTTP target with its probing and retention policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: i64,
    pub name: String,
    /// Probe type, `http` or `https`
    pub monitor_type: String,
    pub method: String,
    pub url: String,
    /// Seconds between two ticks
    pub heart_beat_interval: u64,
    /// Stored but not interpreted yet
    pub min_fail_attempts: u32,
    pub max_redirects: u32,
    pub min_acceptable_status_code: u16,
    pub max_acceptable_status_code: u16,
    /// JSON object text, absent or blank for none
    pub headers: Option<String>,
    /// JSON text, absent or blank for none
    pub body: Option<String>,
    /// Retention window, `None` keeps everything
    pub keep_data_for_days: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Monitor {
    /// Whether `status_code` falls inside the inclusive acceptance range
    pub fn accepts(&self, status_code: u16) -> bool {
        (self.min_acceptable_status_code..=self.max_acceptable_status_code).contains(&status_code)
    }
}

/// Fields needed to insert a monitor row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMonitor {
    pub name: String,
    pub monitor_type: String,
    pub method: String,
    pub url: String,
    pub heart_beat_interval: u64,
    pub min_fail_attempts: u32,
    pub max_redirects: u32,
    pub min_acceptable_status_code: u16,
    pub max_acceptable_status_code: u16,
    pub headers: Option<String>,
    pub body: Option<String>,
    pub keep_data_for_days: Option<u32>,
}

impl NewMonitor {
    /// A GET monitor accepting 2xx, probed every 60 seconds
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            monitor_type: "http".to_string(),
            method: "GET".to_string(),
            url: url.into(),
            heart_beat_interval: 60,
            min_fail_attempts: 1,
            max_redirects: 5,
            min_acceptable_status_code: 200,
            max_acceptable_status_code: 299,
            headers: None,
            body: None,
            keep_data_for_days: None,
        }
    }

    /// Attach a database id, producing the row as it would be loaded back
    pub fn into_monitor(self, id: i64, created_at: DateTime<Utc>) -> Monitor {
        Monitor {
            id,
            name: self.name,
            monitor_type: self.monitor_type,
            method: self.method,
            url: self.url,
            heart_beat_interval: self.heart_beat_interval,
            min_fail_attempts: self.min_fail_attempts,
            max_redirects: self.max_redirects,
            min_acceptable_status_code: self.min_acceptable_status_code,
            max_acceptable_status_code: self.max_acceptable_status_code,
            headers: self.headers,
            body: self.body,
            keep_data_for_days: self.keep_data_for_days,
            created_at,
        }
    }
}

/// The two append-only event tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTable {
    HeartBeats,
    Failures,
}

impl EventTable {
    pub fn as_str(self) -> &'static str {
        match self {
            EventTable::HeartBeats => "monitor_heart_beats",
            EventTable::Failures => "monitor_failures",
        }
    }
}

impl std::fmt::Display for EventTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted probe outcome. Heartbeats and failures share this shape;
/// heartbeats always carry a status code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeEvent {
    pub id: i64,
    pub monitor_id: i64,
    pub status_code: Option<u16>,
    /// Milliseconds
    pub response_time: u64,
    pub created_at: DateTime<Utc>,
}

pub type HeartBeat = ProbeEvent;
pub type Failure = ProbeEvent;

/// Fields needed to append an event row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub monitor_id: i64,
    pub status_code: Option<u16>,
    pub response_time: u64,
    pub created_at: DateTime<Utc>,
}

/// Render a timestamp the way it is stored
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Stored timestamps have whole-second resolution. A cutoff with a fractional
/// part is rounded up so every stored value older than it compares as older.
pub fn format_cutoff(cutoff: DateTime<Utc>) -> String {
    let whole = cutoff.trunc_subsecs(0);
    let ceiling = if whole < cutoff { whole + Duration::seconds(1) } else { whole };
    format_timestamp(ceiling)
}

/// Parse a stored timestamp. Falls back to RFC 3339 for rows written by
/// other tools.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw.trim()).ok().map(|dt| dt.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_accepts_is_inclusive() {
        let monitor = NewMonitor::new("api", "https://example.com").into_monitor(1, Utc::now());
        assert!(monitor.accepts(200));
        assert!(monitor.accepts(299));
        assert!(!monitor.accepts(199));
        assert!(!monitor.accepts(300));
        assert!(!monitor.accepts(404));
    }

    #[test]
    fn test_timestamp_format_matches_sqlite() {
        let time = Utc.with_ymd_and_hms(2024, 1, 5, 7, 8, 9).unwrap();
        assert_eq!(format_timestamp(time), "2024-01-05 07:08:09");
        assert_eq!(parse_timestamp("2024-01-05 07:08:09"), Some(time));
        assert_eq!(parse_timestamp("2024-01-05T07:08:09Z"), Some(time));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_cutoff_rounds_up_fractional_seconds() {
        let whole = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(format_cutoff(whole), "2024-01-01 12:00:00");
        assert_eq!(format_cutoff(whole + Duration::milliseconds(600)), "2024-01-01 12:00:01");
        assert_eq!(format_cutoff(whole - Duration::milliseconds(1)), "2024-01-01 12:00:00");
    }

    #[test]
    fn test_formatted_timestamps_sort_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2024, 9, 30, 23, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 10, 1, 0, 0, 0).unwrap();
        assert!(format_timestamp(earlier) < format_timestamp(later));
    }

    #[test]
    fn test_event_serializes_timestamp() {
        let event = ProbeEvent {
            id: 1,
            monitor_id: 2,
            status_code: Some(200),
            response_time: 15,
            created_at: Utc.with_ymd_and_hms(2024, 1, 5, 7, 8, 9).unwrap(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["created_at"], "2024-01-05T07:08:09Z");
        assert_eq!(serde_json::from_value::<ProbeEvent>(json).unwrap(), event);
    }

    #[test]
    fn test_event_table_names() {
        assert_eq!(EventTable::HeartBeats.to_string(), "monitor_heart_beats");
        assert_eq!(EventTable::Failures.as_str(), "monitor_failures");
    }
}
