use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};
use tracing::{debug, info, warn};

use super::executor::MonitoringExecutor;
use super::types::MonitorEvent;
use super::validation::validate_monitor;
use crate::database::models::Monitor;
use crate::orchestrator::retention::RetentionCollector;

/// Counters shared between the timers and the handle
#[derive(Debug, Default)]
pub struct SchedulerStats {
    ticks_started: AtomicU64,
    ticks_skipped: AtomicU64,
}

/// Monitoring scheduler - one timer per monitor, plus an optional retention timer
pub struct MonitoringScheduler {
    executor: Arc<MonitoringExecutor>,
    event_tx: mpsc::Sender<MonitorEvent>,
    retention: Option<(Arc<RetentionCollector>, Duration)>,
}

impl MonitoringScheduler {
    pub fn new(executor: Arc<MonitoringExecutor>, event_tx: mpsc::Sender<MonitorEvent>) -> Self {
        Self { executor, event_tx, retention: None }
    }

    /// Run `collector` every `period`, first pass at start
    pub fn with_retention(mut self, collector: Arc<RetentionCollector>, period: Duration) -> Self {
        self.retention = Some((collector, period));
        self
    }

    /// Schedule every valid monitor. Invalid ones are reported as events and
    /// never get a timer. Must be called from within a tokio runtime.
    pub fn start(&self, monitors: Vec<Arc<Monitor>>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(SchedulerStats::default());
        let mut timers = Vec::with_capacity(monitors.len() + 1);
        let mut busy = Vec::with_capacity(monitors.len());

        for monitor in &monitors {
            if let Err(error) = validate_monitor(monitor) {
                warn!(monitor_id = monitor.id, %error, "Monitor not scheduled");
                let event = MonitorEvent::Error { monitor: Arc::clone(monitor), snapshot: None, error };
                if self.event_tx.try_send(event).is_err() {
                    warn!(monitor_id = monitor.id, "Event channel unavailable, invalid monitor not reported");
                }
                continue;
            }

            let guard = Arc::new(Mutex::new(()));
            busy.push((monitor.id, Arc::clone(&guard)));
            timers.push(self.schedule_monitor(Arc::clone(monitor), guard, shutdown_rx.clone(), Arc::clone(&stats)));
        }

        if let Some((collector, period)) = &self.retention {
            timers.push(self.schedule_retention(Arc::clone(collector), *period, monitors, shutdown_rx));
        }

        info!(monitors = busy.len(), "Scheduler started");

        SchedulerHandle { shutdown_tx, timers, busy, stats }
    }

    fn schedule_monitor(
        &self,
        monitor: Arc<Monitor>,
        guard: Arc<Mutex<()>>,
        mut shutdown_rx: watch::Receiver<bool>,
        stats: Arc<SchedulerStats>,
    ) -> JoinHandle<()> {
        let executor = Arc::clone(&self.executor);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let period = Duration::from_secs(monitor.heart_beat_interval);
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = timer.tick() => {}
                }

                let Ok(permit) = Arc::clone(&guard).try_lock_owned() else {
                    stats.ticks_skipped.fetch_add(1, Ordering::Relaxed);
                    warn!(monitor_id = monitor.id, "Previous check still running, tick skipped");
                    continue;
                };
                stats.ticks_started.fetch_add(1, Ordering::Relaxed);

                let executor = Arc::clone(&executor);
                let event_tx = event_tx.clone();
                let stopped = shutdown_rx.clone();
                let monitor = Arc::clone(&monitor);

                tokio::spawn(async move {
                    let _permit = permit;
                    if *stopped.borrow() {
                        return;
                    }

                    let event = executor.execute_tick(monitor).await;
                    if event_tx.send(event).await.is_err() {
                        debug!("Event receiver dropped");
                    }
                });
            }

            debug!(monitor_id = monitor.id, "Monitor timer stopped");
        })
    }

    fn schedule_retention(
        &self,
        collector: Arc<RetentionCollector>,
        period: Duration,
        monitors: Vec<Arc<Monitor>>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = timer.tick() => {}
                }

                let report = collector.collect(&monitors, Utc::now()).await;
                for (monitor, error) in report.errors {
                    let event = MonitorEvent::Error { monitor, snapshot: None, error };
                    if event_tx.send(event).await.is_err() {
                        debug!("Event receiver dropped");
                    }
                }
            }

            debug!("Retention timer stopped");
        })
    }
}

/// Controls a running scheduler. Dropping it stops the timers.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    timers: Vec<JoinHandle<()>>,
    busy: Vec<(i64, Arc<Mutex<()>>)>,
    stats: Arc<SchedulerStats>,
}

impl SchedulerHandle {
    /// Cancel every timer. No tick starts probing once this returns; ticks
    /// already probing run to completion and are still recorded.
    pub async fn stop(&mut self) {
        self.shutdown_tx.send_replace(true);
        for result in join_all(self.timers.drain(..)).await {
            if let Err(e) = result {
                warn!(error = %e, "Timer task ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }

    /// Wait up to `grace` for in-flight ticks. Returns false on timeout.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        let idle = join_all(self.busy.iter().map(|(_, guard)| guard.lock()));
        match tokio::time::timeout(grace, idle).await {
            Ok(_) => true,
            Err(_) => {
                let busy: Vec<i64> =
                    self.busy.iter().filter(|(_, guard)| guard.try_lock().is_err()).map(|(id, _)| *id).collect();
                warn!(?busy, "Checks still running after grace period");
                false
            }
        }
    }

    /// Number of monitors that got a timer
    pub fn monitor_count(&self) -> usize {
        self.busy.len()
    }

    pub fn ticks_started(&self) -> u64 {
        self.stats.ticks_started.load(Ordering::Relaxed)
    }

    pub fn skipped_ticks(&self) -> u64 {
        self.stats.ticks_skipped.load(Ordering::Relaxed)
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}
