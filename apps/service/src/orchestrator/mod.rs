//! Orchestrator module - coordinates all components
//!
//! The orchestrator owns the lifecycle of the service:
//! - Initialises the schema and loads every monitor with its history
//! - Starts the scheduler (and the retention timer) and renders its events
//! - Stops the timers on shutdown, waits for in-flight checks and closes
//!   the datastore

pub mod retention;


pub use retention::RetentionCollector;

use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use futures::future::try_join_all;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::database::models::{Monitor, NewMonitor};
use crate::database::{Database, DatabaseImpl, initialize_database};
use crate::monitoring::types::MonitorSnapshot;
use crate::monitoring::validation::validate_new_monitor;
use crate::monitoring::{Checker, HttpChecker, MonitorEvent, MonitoringExecutor, MonitoringScheduler, OutcomeRecorder};
use crate::pool::LibsqlPool;
use crate::render::{render_event, render_snapshot};

/// Main orchestrator for the heartbeat service
pub struct Orchestrator {
    config: Arc<Config>,
    database: Arc<dyn Database>,
    recorder: OutcomeRecorder,
    executor: Arc<MonitoringExecutor>,
}

impl Orchestrator {
    /// Create an orchestrator and run it until SIGINT/SIGTERM, printing to stdout
    pub async fn start(config: Config, pool: LibsqlPool) -> Result<()> {
        let shutdown = shutdown_signal().context("failed to install signal handlers")?;
        let orchestrator = Self::new(config, pool).await?;
        orchestrator.run(shutdown, &mut std::io::stdout()).await
    }

    /// Create a new orchestrator instance over a pooled local database
    pub async fn new(config: Config, pool: LibsqlPool) -> Result<Self> {
        let conn = pool.get().await.context("failed to open database connection")?;

        info!("Initializing database schema...");
        initialize_database(&conn).await.context("failed to initialize database schema")?;
        drop(conn);

        let database = Arc::new(DatabaseImpl::new_from_pool(pool));
        let checker = Arc::new(HttpChecker::new(config.probe.timeout_seconds, config.probe.user_agent.clone()));

        Ok(Self::with_parts(config, database, checker))
    }

    /// Assemble an orchestrator from an existing datastore and checker
    pub fn with_parts(config: Config, database: Arc<dyn Database>, checker: Arc<dyn Checker>) -> Self {
        let recorder = OutcomeRecorder::new(Arc::clone(&database), config.snapshot.heart_beat_history);
        let executor = Arc::new(MonitoringExecutor::new(checker, recorder.clone()));

        Self { config: Arc::new(config), database, recorder, executor }
    }

    /// Full load: every monitor with its recent heartbeats and all failures
    pub async fn load_snapshots(&self) -> Result<Vec<MonitorSnapshot>> {
        let monitors = self.database.get_monitors().await.context("failed to load monitors")?;
        let monitors: Vec<Arc<Monitor>> = monitors.into_iter().map(Arc::new).collect();

        try_join_all(monitors.iter().map(|monitor| self.recorder.snapshot(monitor)))
            .await
            .context("failed to load monitor history")
    }

    /// Validate and insert a monitor. It is picked up by the next `run`.
    pub async fn add_monitor(&self, monitor: NewMonitor) -> Result<Monitor> {
        if let Err(reason) = validate_new_monitor(&monitor) {
            bail!("invalid monitor: {reason}");
        }

        let id = self.database.save_monitor(&monitor).await.context("failed to save monitor")?;
        info!(monitor_id = id, name = %monitor.name, "Monitor added");

        self.database
            .get_monitor(id)
            .await?
            .with_context(|| format!("monitor {id} missing after insert"))
    }

    /// Release the datastore
    pub fn close(&self) {
        self.database.close();
    }

    /// Render the current state, then schedule every monitor and render
    /// events until `shutdown` resolves
    pub async fn run<W: Write>(self, shutdown: impl Future<Output = ()>, out: &mut W) -> Result<()> {
        info!("Starting heartbeat orchestrator...");

        let snapshots = match self.load_snapshots().await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                self.close();
                return Err(e);
            }
        };
        info!("Found {} monitors", snapshots.len());

        for snapshot in &snapshots {
            writeln!(out, "{}", render_snapshot(snapshot))?;
        }

        let (event_tx, mut event_rx) = mpsc::channel(self.config.scheduler.event_buffer.max(1));
        let mut scheduler = MonitoringScheduler::new(Arc::clone(&self.executor), event_tx);
        if self.config.retention.enabled {
            let period = Duration::from_secs(self.config.retention.interval_seconds.max(1));
            scheduler = scheduler.with_retention(Arc::new(RetentionCollector::new(Arc::clone(&self.database))), period);
        }

        let monitors = snapshots.into_iter().map(|snapshot| snapshot.monitor).collect();
        let mut handle = scheduler.start(monitors);
        drop(scheduler);

        tokio::pin!(shutdown);
        let mut outcome: Result<()> = Ok(());
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                event = event_rx.recv() => {
                    let Some(event) = event else { break };
                    if let Err(e) = handle_event(&event, out) {
                        outcome = Err(e.into());
                        break;
                    }
                }
            }
        }

        handle.stop().await;
        info!(
            monitors = handle.monitor_count(),
            ticks = handle.ticks_started(),
            skipped = handle.skipped_ticks(),
            "Scheduler statistics"
        );

        // Keep rendering whatever in-flight checks still report
        let grace = Duration::from_secs(self.config.scheduler.shutdown_grace_seconds);
        let idle = handle.wait_idle(grace);
        tokio::pin!(idle);
        loop {
            tokio::select! {
                _ = &mut idle => break,
                Some(event) = event_rx.recv() => {
                    if let Err(e) = handle_event(&event, out) {
                        warn!(error = %e, "Failed to render event during shutdown");
                    }
                }
            }
        }
        while let Ok(event) = event_rx.try_recv() {
            if let Err(e) = handle_event(&event, out) {
                warn!(error = %e, "Failed to render event during shutdown");
            }
        }

        self.close();
        info!("Orchestrator stopped");

        outcome
    }
}

fn handle_event(event: &MonitorEvent, out: &mut impl Write) -> std::io::Result<()> {
    if let MonitorEvent::Error { monitor, error, .. } = event {
        if error.is_recorded() {
            warn!(monitor_id = monitor.id, %error, "Monitor is down");
        } else {
            error!(monitor_id = monitor.id, %error, "Monitor error");
        }
    }

    writeln!(out, "{}", render_event(event))
}

/// Resolves on the first SIGINT or SIGTERM
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    })
}
