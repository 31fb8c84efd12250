//! Database abstraction layer
//!
//! Typed access to the `monitors`, `monitor_heart_beats` and
//! `monitor_failures` tables on a local LibSQL (SQLite) file.

pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{Database, DatabaseImpl, StoreError};

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<(), StoreError> {
    migrations::run_migrations(conn).await
}
