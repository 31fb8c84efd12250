//! In-memory `Database` double for scheduler, recorder and retention tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::database::models::{EventTable, Failure, HeartBeat, Monitor, NewEvent, NewMonitor, ProbeEvent};
use crate::database::{Database, StoreError};

#[derive(Default)]
pub struct MemoryDatabase {
    monitors: Mutex<Vec<Monitor>>,
    events: Mutex<HashMap<EventTable, Vec<ProbeEvent>>>,
    next_id: AtomicUsize,
    fail_inserts: AtomicBool,
    failing_deletes: Mutex<HashSet<EventTable>>,
    read_calls: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryDatabase {
    pub fn rows(&self, table: EventTable) -> Vec<ProbeEvent> {
        self.events.lock().unwrap().get(&table).cloned().unwrap_or_default()
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes_for(&self, table: EventTable) {
        self.failing_deletes.lock().unwrap().insert(table);
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Insert a row with an arbitrary timestamp
    pub fn seed(&self, table: EventTable, monitor_id: i64, created_at: DateTime<Utc>) -> i64 {
        let id = self.next_id();
        self.events.lock().unwrap().entry(table).or_default().push(ProbeEvent {
            id,
            monitor_id,
            status_code: Some(200),
            response_time: 1,
            created_at,
        });
        id
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1
    }

    fn synthetic_error(reason: &str) -> StoreError {
        StoreError::InvalidRow { table: "memory", reason: reason.to_string() }
    }

    fn filtered(&self, table: EventTable, monitor_id: i64) -> Vec<ProbeEvent> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        self.rows(table).into_iter().filter(|row| row.monitor_id == monitor_id).collect()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn get_monitors(&self) -> Result<Vec<Monitor>, StoreError> {
        Ok(self.monitors.lock().unwrap().clone())
    }

    async fn get_monitor(&self, id: i64) -> Result<Option<Monitor>, StoreError> {
        Ok(self.monitors.lock().unwrap().iter().find(|m| m.id == id).cloned())
    }

    async fn save_monitor(&self, monitor: &NewMonitor) -> Result<i64, StoreError> {
        let id = self.next_id();
        self.monitors.lock().unwrap().push(monitor.clone().into_monitor(id, Utc::now()));
        Ok(id)
    }

    async fn insert_event(&self, table: EventTable, event: &NewEvent) -> Result<i64, StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(Self::synthetic_error("insert rejected"));
        }

        let id = self.next_id();
        self.events.lock().unwrap().entry(table).or_default().push(ProbeEvent {
            id,
            monitor_id: event.monitor_id,
            status_code: event.status_code,
            response_time: event.response_time,
            created_at: event.created_at,
        });
        Ok(id)
    }

    async fn get_heart_beats(&self, monitor_id: i64, limit: usize) -> Result<Vec<HeartBeat>, StoreError> {
        let mut rows = self.filtered(EventTable::HeartBeats, monitor_id);
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn get_failures(&self, monitor_id: i64) -> Result<Vec<Failure>, StoreError> {
        Ok(self.filtered(EventTable::Failures, monitor_id))
    }

    async fn get_expired_event_ids(
        &self,
        table: EventTable,
        monitor_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<i64>, StoreError> {
        Ok(self
            .filtered(table, monitor_id)
            .into_iter()
            .filter(|row| row.created_at < cutoff)
            .map(|row| row.id)
            .collect())
    }

    async fn delete_events(&self, table: EventTable, ids: &[i64]) -> Result<u64, StoreError> {
        if self.failing_deletes.lock().unwrap().contains(&table) {
            return Err(Self::synthetic_error("delete rejected"));
        }

        let mut events = self.events.lock().unwrap();
        let rows = events.entry(table).or_default();
        let before = rows.len();
        rows.retain(|row| !ids.contains(&row.id));
        Ok((before - rows.len()) as u64)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
