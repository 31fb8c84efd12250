//! Monitor configuration checks.
//!
//! `validate_monitor` runs before scheduling and only rejects what would make
//! a timer meaningless or a request impossible to build. Any inclusive status
//! range is allowed. Header/body payloads are left to the checker so that a
//! malformed payload surfaces on every tick. `validate_new_monitor` is the
//! stricter check applied when a monitor is created.

use std::time::Duration;

use reqwest::Method;
use tokio::time::Instant;
use url::Url;

use super::checker::{parse_body, parse_headers};
use crate::database::models::{Monitor, NewMonitor};
use crate::error::MonitorError;

/// Longest accepted interval: one week
const MAX_INTERVAL: u64 = 7 * 24 * 3600;

pub fn validate_monitor(monitor: &Monitor) -> Result<(), MonitorError> {
    let invalid = |reason: String| MonitorError::InvalidMonitor { monitor_id: monitor.id, reason };

    validate_schedulable_interval(monitor.heart_beat_interval).map_err(invalid)?;
    validate_monitor_type(&monitor.monitor_type).map_err(invalid)?;
    validate_status_order(monitor.min_acceptable_status_code, monitor.max_acceptable_status_code)
        .map_err(invalid)?;
    validate_http_target(&monitor.url).map_err(invalid)?;

    Ok(())
}

/// Full validation for a monitor about to be inserted
pub fn validate_new_monitor(monitor: &NewMonitor) -> Result<(), String> {
    if monitor.name.trim().is_empty() {
        return Err("name must not be empty".to_string());
    }
    validate_check_interval(monitor.heart_beat_interval)?;
    validate_monitor_type(&monitor.monitor_type)?;
    validate_status_range(monitor.min_acceptable_status_code, monitor.max_acceptable_status_code)?;
    validate_http_target(&monitor.url)?;

    Method::from_bytes(monitor.method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method: {:?}", monitor.method))?;
    parse_headers(monitor.headers.as_deref()).map_err(|e| e.to_string())?;
    parse_body(monitor.body.as_deref()).map_err(|e| e.to_string())?;

    if monitor.keep_data_for_days == Some(0) {
        return Err("keep_data_for_days must be at least 1 (omit it to keep data forever)".to_string());
    }

    Ok(())
}

/// Non-zero and representable as the first deadline of a timer
fn validate_schedulable_interval(interval_seconds: u64) -> Result<(), String> {
    if interval_seconds == 0 {
        return Err("heart_beat_interval must be greater than 0".to_string());
    }
    if Instant::now().checked_add(Duration::from_secs(interval_seconds)).is_none() {
        return Err(format!("heart_beat_interval of {interval_seconds} seconds cannot be scheduled"));
    }
    Ok(())
}

fn validate_check_interval(interval_seconds: u64) -> Result<(), String> {
    validate_schedulable_interval(interval_seconds)?;
    if interval_seconds > MAX_INTERVAL {
        return Err(format!(
            "heart_beat_interval too long: {interval_seconds} seconds (maximum: {MAX_INTERVAL})"
        ));
    }
    Ok(())
}

fn validate_monitor_type(monitor_type: &str) -> Result<(), String> {
    match monitor_type.trim().to_ascii_lowercase().as_str() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported monitor type: {other:?}")),
    }
}

fn validate_status_order(min: u16, max: u16) -> Result<(), String> {
    if min > max {
        return Err(format!("min_acceptable_status_code {min} exceeds max_acceptable_status_code {max}"));
    }
    Ok(())
}

/// New monitors must also stay within the HTTP status classes
fn validate_status_range(min: u16, max: u16) -> Result<(), String> {
    if !(100..=599).contains(&min) || !(100..=599).contains(&max) {
        return Err(format!("status range {min}..={max} must lie within 100..=599"));
    }
    validate_status_order(min, max)
}

fn validate_http_target(target: &str) -> Result<(), String> {
    let url = Url::parse(target).map_err(|e| format!("invalid URL: {e}"))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("invalid scheme for HTTP monitor: {other}")),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err("URL has no host".to_string());
    }

    if url.port() == Some(0) {
        return Err("port 0 is not valid".to_string());
    }

    Ok(())
}
