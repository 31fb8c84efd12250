use libsql::Connection;

use super::repository::StoreError;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 2;

/// Run database migrations
///
/// Idempotent: already applied versions are skipped.
pub async fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::debug!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Monitors, heartbeats and failures").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Index event tables by monitor and age").await?;
    }

    tracing::info!("Database migrations completed (now at version {})", SCHEMA_VERSION);
    Ok(())
}

async fn get_current_version(conn: &Connection) -> Result<i32, StoreError> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i64> = row.get(0)?;
        Ok(version.unwrap_or(0) as i32)
    } else {
        Ok(0)
    }
}

async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<(), StoreError> {
    let now = chrono::Utc::now().timestamp();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: the three core tables
async fn run_migration_v1(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            type TEXT NOT NULL DEFAULT 'http',
            url TEXT NOT NULL,
            heart_beat_interval INTEGER NOT NULL,
            min_fail_attempts INTEGER NOT NULL DEFAULT 1,
            max_redirects INTEGER NOT NULL DEFAULT 5,
            min_acceptable_status_code INTEGER NOT NULL DEFAULT 200,
            max_acceptable_status_code INTEGER NOT NULL DEFAULT 299,
            method TEXT NOT NULL DEFAULT 'GET',
            headers TEXT,
            body TEXT,
            keep_data_for_days INTEGER,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        (),
    )
    .await?;

    for table in ["monitor_heart_beats", "monitor_failures"] {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    monitor_id INTEGER NOT NULL,
                    status_code INTEGER,
                    response_time INTEGER NOT NULL,
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
                )"
            ),
            (),
        )
        .await?;
    }

    Ok(())
}

/// Migration v2: retention and snapshot queries filter on these columns
async fn run_migration_v2(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_heart_beats_monitor_created
            ON monitor_heart_beats (monitor_id, created_at)",
        (),
    )
    .await?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_failures_monitor_created
            ON monitor_failures (monitor_id, created_at)",
        (),
    )
    .await?;

    Ok(())
}
