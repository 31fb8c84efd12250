//! Monitoring engine module - handles execution of monitoring checks
//!
//! This module is responsible for:
//! - Probing HTTP(S) endpoints
//! - Scheduling one timer per monitor
//! - Recording heartbeats and failures

pub mod checker;
pub mod executor;
pub mod recorder;
pub mod scheduler;
pub mod types;
pub mod validation;

#[cfg(test)]
pub mod testing;

pub use checker::{Checker, HttpChecker};
pub use executor::MonitoringExecutor;
pub use recorder::OutcomeRecorder;
pub use scheduler::MonitoringScheduler;
pub use types::MonitorEvent;
