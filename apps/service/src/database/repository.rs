use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};
use thiserror::Error;
use tokio::sync::Mutex;

use super::models::{
    EventTable, Failure, HeartBeat, Monitor, NewEvent, NewMonitor, ProbeEvent, format_cutoff,
    format_timestamp, parse_timestamp,
};
use crate::pool::{LibsqlManager, LibsqlPool};

/// SQLite refuses statements with more bound parameters than this
const DELETE_BATCH: usize = 500;

const MONITOR_COLUMNS: &str = "id, name, type, method, url, heart_beat_interval, min_fail_attempts, \
     max_redirects, min_acceptable_status_code, max_acceptable_status_code, headers, body, \
     keep_data_for_days, created_at";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database query failed: {0}")]
    Query(#[from] libsql::Error),

    #[error("database connection unavailable: {0}")]
    Pool(#[from] deadpool::managed::PoolError<libsql::Error>),

    #[error("invalid row in {table}: {reason}")]
    InvalidRow { table: &'static str, reason: String },
}

/// Datastore seam used by the monitoring core
#[async_trait]
pub trait Database: Send + Sync {
    /// All monitors, ordered by id
    async fn get_monitors(&self) -> Result<Vec<Monitor>, StoreError>;

    async fn get_monitor(&self, id: i64) -> Result<Option<Monitor>, StoreError>;

    /// Insert a monitor and return its id
    async fn save_monitor(&self, monitor: &NewMonitor) -> Result<i64, StoreError>;

    /// Append one heartbeat or failure row and return its id
    async fn insert_event(&self, table: EventTable, event: &NewEvent) -> Result<i64, StoreError>;

    /// Most recent heartbeats first
    async fn get_heart_beats(&self, monitor_id: i64, limit: usize) -> Result<Vec<HeartBeat>, StoreError>;

    /// Every failure of a monitor, oldest first
    async fn get_failures(&self, monitor_id: i64) -> Result<Vec<Failure>, StoreError>;

    /// Ids of rows created strictly before `cutoff`
    async fn get_expired_event_ids(
        &self,
        table: EventTable,
        monitor_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<i64>, StoreError>;

    /// Bulk delete by primary key, returning the number of removed rows
    async fn delete_events(&self, table: EventTable, ids: &[i64]) -> Result<u64, StoreError>;

    /// Release the underlying connections. Later calls fail.
    fn close(&self);
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
    write_lock: Mutex<()>,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool, write_lock: Mutex::new(()) }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>, StoreError> {
        Ok(self.pool.get().await?)
    }

    async fn query_events(
        &self,
        table: EventTable,
        sql: &str,
        params: impl libsql::params::IntoParams + Send,
    ) -> Result<Vec<ProbeEvent>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut events = Vec::new();

        while let Some(row) = rows.next().await? {
            events.push(event_from_row(table, &row)?);
        }

        Ok(events)
    }
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn get_monitors(&self) -> Result<Vec<Monitor>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {MONITOR_COLUMNS} FROM monitors ORDER BY id"), ())
            .await?;

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }

        Ok(monitors)
    }

    async fn get_monitor(&self, id: i64) -> Result<Option<Monitor>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?"), params![id])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(monitor_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn save_monitor(&self, monitor: &NewMonitor) -> Result<i64, StoreError> {
        let _write = self.write_lock.lock().await;
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO monitors (name, type, method, url, heart_beat_interval, min_fail_attempts, max_redirects, min_acceptable_status_code, max_acceptable_status_code, headers, body, keep_data_for_days, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                monitor.name.clone(),
                monitor.monitor_type.clone(),
                monitor.method.clone(),
                monitor.url.clone(),
                monitor.heart_beat_interval as i64,
                i64::from(monitor.min_fail_attempts),
                i64::from(monitor.max_redirects),
                i64::from(monitor.min_acceptable_status_code),
                i64::from(monitor.max_acceptable_status_code),
                monitor.headers.clone(),
                monitor.body.clone(),
                monitor.keep_data_for_days.map(i64::from),
                format_timestamp(Utc::now())
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn insert_event(&self, table: EventTable, event: &NewEvent) -> Result<i64, StoreError> {
        let _write = self.write_lock.lock().await;
        let conn = self.get_conn().await?;

        conn.execute(
            &format!(
                "INSERT INTO {table} (monitor_id, status_code, response_time, created_at) VALUES (?, ?, ?, ?)"
            ),
            params![
                event.monitor_id,
                event.status_code.map(i64::from),
                i64::try_from(event.response_time).unwrap_or(i64::MAX),
                format_timestamp(event.created_at)
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn get_heart_beats(&self, monitor_id: i64, limit: usize) -> Result<Vec<HeartBeat>, StoreError> {
        let table = EventTable::HeartBeats;
        self.query_events(
            table,
            &format!(
                "SELECT id, monitor_id, status_code, response_time, created_at FROM {table} WHERE monitor_id = ? ORDER BY id DESC LIMIT ?"
            ),
            params![monitor_id, i64::try_from(limit).unwrap_or(i64::MAX)],
        )
        .await
    }

    async fn get_failures(&self, monitor_id: i64) -> Result<Vec<Failure>, StoreError> {
        let table = EventTable::Failures;
        self.query_events(
            table,
            &format!(
                "SELECT id, monitor_id, status_code, response_time, created_at FROM {table} WHERE monitor_id = ? ORDER BY id"
            ),
            params![monitor_id],
        )
        .await
    }

    async fn get_expired_event_ids(
        &self,
        table: EventTable,
        monitor_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<i64>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT id FROM {table} WHERE monitor_id = ? AND created_at < ? ORDER BY id"),
                params![monitor_id, format_cutoff(cutoff)],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<i64>(0)?);
        }

        Ok(ids)
    }

    async fn delete_events(&self, table: EventTable, ids: &[i64]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let _write = self.write_lock.lock().await;
        let conn = self.get_conn().await?;
        let mut deleted = 0;

        for chunk in ids.chunks(DELETE_BATCH) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            deleted += conn
                .execute(
                    &format!("DELETE FROM {table} WHERE id IN ({placeholders})"),
                    libsql::params_from_iter(chunk.iter().copied()),
                )
                .await?;
        }

        Ok(deleted)
    }

    fn close(&self) {
        self.pool.close();
    }
}

fn monitor_from_row(row: &Row) -> Result<Monitor, StoreError> {
    let created_at: Option<String> = row.get(13)?;

    Ok(Monitor {
        id: row.get(0)?,
        name: row.get(1)?,
        monitor_type: row.get::<Option<String>>(2)?.unwrap_or_else(|| "http".to_string()),
        method: row.get::<Option<String>>(3)?.unwrap_or_else(|| "GET".to_string()),
        url: row.get(4)?,
        heart_beat_interval: narrow("monitors", "heart_beat_interval", row.get::<i64>(5)?)?,
        min_fail_attempts: narrow("monitors", "min_fail_attempts", row.get::<Option<i64>>(6)?.unwrap_or(1))?,
        max_redirects: narrow("monitors", "max_redirects", row.get::<Option<i64>>(7)?.unwrap_or(0))?,
        min_acceptable_status_code: narrow("monitors", "min_acceptable_status_code", row.get::<i64>(8)?)?,
        max_acceptable_status_code: narrow("monitors", "max_acceptable_status_code", row.get::<i64>(9)?)?,
        headers: row.get(10)?,
        body: row.get(11)?,
        keep_data_for_days: row
            .get::<Option<i64>>(12)?
            .map(|days| narrow("monitors", "keep_data_for_days", days))
            .transpose()?,
        created_at: timestamp_column("monitors", created_at)?,
    })
}

fn event_from_row(table: EventTable, row: &Row) -> Result<ProbeEvent, StoreError> {
    let name = table.as_str();
    let created_at: Option<String> = row.get(4)?;

    Ok(ProbeEvent {
        id: row.get(0)?,
        monitor_id: row.get(1)?,
        status_code: row
            .get::<Option<i64>>(2)?
            .map(|code| narrow(name, "status_code", code))
            .transpose()?,
        response_time: narrow(name, "response_time", row.get::<i64>(3)?)?,
        created_at: timestamp_column(name, created_at)?,
    })
}

/// Convert a stored integer into the field's width, rejecting what does not fit
fn narrow<T: TryFrom<i64>>(table: &'static str, column: &str, value: i64) -> Result<T, StoreError> {
    T::try_from(value).map_err(|_| StoreError::InvalidRow {
        table,
        reason: format!("{column} out of range: {value}"),
    })
}

fn timestamp_column(table: &'static str, raw: Option<String>) -> Result<DateTime<Utc>, StoreError> {
    let raw = raw.ok_or_else(|| StoreError::InvalidRow {
        table,
        reason: "created_at is NULL".to_string(),
    })?;

    parse_timestamp(&raw).ok_or_else(|| StoreError::InvalidRow {
        table,
        reason: format!("unparsable created_at: {raw}"),
    })
}
