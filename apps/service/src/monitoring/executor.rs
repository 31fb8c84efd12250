use std::sync::Arc;

use tracing::{debug, warn};

use super::checker::Checker;
use super::recorder::OutcomeRecorder;
use super::types::MonitorEvent;
use crate::database::models::Monitor;
use crate::error::MonitorError;

/// Monitoring executor - runs the body of one tick: probe, record, report
pub struct MonitoringExecutor {
    checker: Arc<dyn Checker>,
    recorder: OutcomeRecorder,
}

impl MonitoringExecutor {
    pub fn new(checker: Arc<dyn Checker>, recorder: OutcomeRecorder) -> Self {
        Self { checker, recorder }
    }

    /// Execute one tick for `monitor`. Never fails: every outcome becomes
    /// exactly one event.
    pub async fn execute_tick(&self, monitor: Arc<Monitor>) -> MonitorEvent {
        let result = match self.checker.check(&monitor).await {
            Ok(result) => result,
            Err(e) => {
                warn!(monitor_id = monitor.id, error = %e, "Probe could not be performed");
                return MonitorEvent::Error { monitor, snapshot: None, error: e.into() };
            }
        };

        let snapshot = match self.recorder.record(&monitor, &result).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(monitor_id = monitor.id, error = %e, "Failed to record check result");
                return MonitorEvent::Error { monitor, snapshot: None, error: e.into() };
            }
        };

        if result.is_up() {
            debug!(
                monitor_id = monitor.id,
                status_code = ?result.status_code,
                response_time_ms = result.response_time_ms,
                "Heartbeat"
            );
            MonitorEvent::Success { snapshot }
        } else {
            let error = MonitorError::ClassifiedFailure {
                monitor_id: monitor.id,
                status_code: result.status_code,
                reason: result.error_message.clone().unwrap_or_default(),
            };
            MonitorEvent::Error { monitor, snapshot: Some(snapshot), error }
        }
    }
}
