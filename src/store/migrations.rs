//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "notification_queue",
        sql: r#"
            CREATE TABLE IF NOT EXISTS scheduled_messages (
                id TEXT PRIMARY KEY,
                target_type TEXT NOT NULL DEFAULT 'user',
                target_user_id TEXT,
                target_phone TEXT,
                target_group_id TEXT,
                message_type TEXT NOT NULL,
                content TEXT NOT NULL,
                scheduled_for TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                source TEXT NOT NULL,
                source_id TEXT,
                source_reference TEXT,
                recurrence TEXT NOT NULL DEFAULT 'none',
                recurrence_parent_id TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                error_message TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                sent_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_scheduled_messages_due
                ON scheduled_messages(status, scheduled_for);
            CREATE INDEX IF NOT EXISTS idx_scheduled_messages_reference
                ON scheduled_messages(source_reference);
            CREATE INDEX IF NOT EXISTS idx_scheduled_messages_parent
                ON scheduled_messages(recurrence_parent_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_scheduled_messages_active_reference
                ON scheduled_messages(source, source_reference)
                WHERE source_reference IS NOT NULL AND status IN ('pending', 'sent');

            CREATE TABLE IF NOT EXISTS notification_settings (
                user_id TEXT PRIMARY KEY,
                daily_digest_enabled INTEGER NOT NULL DEFAULT 1,
                daily_digest_time TEXT NOT NULL DEFAULT '08:00:00',
                weekly_summary_enabled INTEGER NOT NULL DEFAULT 1,
                weekly_summary_time TEXT NOT NULL DEFAULT '09:00:00',
                weekly_summary_day INTEGER NOT NULL DEFAULT 1,
                monthly_summary_enabled INTEGER NOT NULL DEFAULT 1,
                monthly_summary_time TEXT NOT NULL DEFAULT '09:00:00',
                monthly_summary_day INTEGER NOT NULL DEFAULT 1,
                realtime_alerts_enabled INTEGER NOT NULL DEFAULT 1,
                urgent_alerts_enabled INTEGER NOT NULL DEFAULT 1,
                deadline_alerts_enabled INTEGER NOT NULL DEFAULT 1,
                assignment_alerts_enabled INTEGER NOT NULL DEFAULT 1,
                reminders_enabled INTEGER NOT NULL DEFAULT 1,
                reminder_days_before TEXT NOT NULL DEFAULT '[1,0]',
                reminder_time TEXT NOT NULL DEFAULT '09:00:00',
                quiet_hours_enabled INTEGER NOT NULL DEFAULT 0,
                quiet_hours_start TEXT NOT NULL DEFAULT '22:00:00',
                quiet_hours_end TEXT NOT NULL DEFAULT '07:00:00',
                utc_offset_minutes INTEGER,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS notification_log (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                source TEXT NOT NULL,
                reference TEXT NOT NULL,
                content TEXT NOT NULL,
                sent_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_notification_log_user_reference
                ON notification_log(user_id, reference);
            CREATE INDEX IF NOT EXISTS idx_notification_log_sent ON notification_log(sent_at);
        "#,
    },
    Migration {
        version: 2,
        name: "business_read_models",
        sql: r#"
            CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                phone TEXT,
                active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS calendar_events (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                start_time TEXT NOT NULL,
                location TEXT,
                status TEXT NOT NULL DEFAULT 'scheduled',
                content_type TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_calendar_events_user_start
                ON calendar_events(user_id, start_time);

            CREATE TABLE IF NOT EXISTS cards (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                column_name TEXT NOT NULL,
                priority TEXT NOT NULL DEFAULT 'medium',
                due_date TEXT,
                assigned_to TEXT,
                assigned_at TEXT,
                content_type TEXT,
                created_at TEXT NOT NULL,
                published_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_cards_column ON cards(column_name);
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::debug!(version, "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row.get::<i64>(0).map_err(|e| {
            DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
        }),
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_conn() -> Connection {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap();
        db.connect().unwrap()
    }

    #[tokio::test]
    async fn migrations_create_all_tables() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        for table in &[
            "_migrations",
            "scheduled_messages",
            "notification_settings",
            "notification_log",
            "profiles",
            "calendar_events",
            "cards",
        ] {
            let mut rows = conn
                .query(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    libsql::params![*table],
                )
                .await
                .unwrap();
            let row = rows.next().await.unwrap().unwrap();
            let count: i64 = row.get(0).unwrap();
            assert_eq!(count, 1, "Table '{}' should exist", table);
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();

        let version = get_current_version(&conn).await.unwrap();
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn migrations_run_on_a_spawned_task() {
        let conn = test_conn().await;
        let version = tokio::spawn(async move {
            run_migrations(&conn).await.unwrap();
            get_current_version(&conn).await.unwrap()
        })
        .await
        .unwrap();
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn backend_opens_on_a_spawned_task() {
        let backend = tokio::spawn(crate::store::LibSqlBackend::new_memory())
            .await
            .unwrap();
        assert!(backend.is_ok());
    }

    #[tokio::test]
    async fn active_reference_index_rejects_duplicates() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        let insert = "INSERT OR IGNORE INTO scheduled_messages
            (id, message_type, content, scheduled_for, status, source, source_reference, created_at, updated_at)
            VALUES (?1, 'calendar_reminder', 'x', '2026-01-01T00:00:00.000Z', ?2, 'calendar_reminder', 'cal:e:d-1', 'now', 'now')";

        let first = conn.execute(insert, libsql::params!["a", "pending"]).await.unwrap();
        let second = conn.execute(insert, libsql::params!["b", "pending"]).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);

        // A failed row leaves the index, so a fresh candidate is accepted.
        conn.execute(
            "UPDATE scheduled_messages SET status = 'failed' WHERE id = 'a'",
            (),
        )
        .await
        .unwrap();
        let third = conn.execute(insert, libsql::params!["c", "pending"]).await.unwrap();
        assert_eq!(third, 1);
    }

    #[tokio::test]
    async fn version_tracking() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        let mut rows = conn
            .query("SELECT version, name FROM _migrations ORDER BY version", ())
            .await
            .unwrap();
        let row1 = rows.next().await.unwrap().unwrap();
        assert_eq!(row1.get::<i64>(0).unwrap(), 1);
        assert_eq!(row1.get::<String>(1).unwrap(), "notification_queue");

        let row2 = rows.next().await.unwrap().unwrap();
        assert_eq!(row2.get::<i64>(0).unwrap(), 2);
        assert_eq!(row2.get::<String>(1).unwrap(), "business_read_models");
    }
}
