//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Timestamps are written as
//! RFC 3339 UTC with millisecond precision so string comparison orders them.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::DatabaseError;
use crate::model::{
    CalendarEvent, Card, KanbanColumn, MessageSource, MessageStatus, ScheduledMessage,
    SourceReference, UserNotificationSettings, UserProfile,
};
use crate::store::migrations;
use crate::store::traits::{Database, NotificationLogEntry};
use crate::time::parse_time_of_day;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    /// Offset for settings rows that carry none.
    default_offset_minutes: i32,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            default_offset_minutes: SchedulerConfig::default().utc_offset_minutes,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            default_offset_minutes: SchedulerConfig::default().utc_offset_minutes,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Business UTC offset applied to subscribers without their own.
    pub fn with_default_offset(mut self, minutes: i32) -> Self {
        self.default_offset_minutes = minutes;
        self
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    // ── Writers for externally owned tables ─────────────────────────
    //
    // The scheduling jobs never call these. They exist for onboarding
    // tooling, local development and tests.

    /// Insert or replace a subscriber's notification settings.
    pub async fn upsert_notification_settings(
        &self,
        s: &UserNotificationSettings,
    ) -> Result<(), DatabaseError> {
        let days: Vec<u32> = s.reminder_days_before.iter().copied().collect();
        let days_json = serde_json::to_string(&days)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT OR REPLACE INTO notification_settings (user_id, daily_digest_enabled, daily_digest_time, weekly_summary_enabled, weekly_summary_time, weekly_summary_day, monthly_summary_enabled, monthly_summary_time, monthly_summary_day, realtime_alerts_enabled, urgent_alerts_enabled, deadline_alerts_enabled, assignment_alerts_enabled, reminders_enabled, reminder_days_before, reminder_time, quiet_hours_enabled, quiet_hours_start, quiet_hours_end, utc_offset_minutes, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
                params![
                    s.user_id.clone(),
                    s.daily_digest_enabled as i64,
                    fmt_time(s.daily_digest_time),
                    s.weekly_summary_enabled as i64,
                    fmt_time(s.weekly_summary_time),
                    s.weekly_summary_day as i64,
                    s.monthly_summary_enabled as i64,
                    fmt_time(s.monthly_summary_time),
                    s.monthly_summary_day as i64,
                    s.realtime_alerts_enabled as i64,
                    s.urgent_alerts_enabled as i64,
                    s.deadline_alerts_enabled as i64,
                    s.assignment_alerts_enabled as i64,
                    s.reminders_enabled as i64,
                    days_json,
                    fmt_time(s.reminder_time),
                    s.quiet_hours_enabled as i64,
                    fmt_time(s.quiet_hours_start),
                    fmt_time(s.quiet_hours_end),
                    s.utc_offset_minutes as i64,
                    fmt_ts(Utc::now()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_notification_settings: {e}")))?;
        Ok(())
    }

    pub async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO profiles (user_id, display_name, phone, active) VALUES (?1, ?2, ?3, ?4)",
                params![
                    profile.user_id.clone(),
                    profile.display_name.clone(),
                    opt_text(profile.phone.as_deref()),
                    profile.active as i64,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_profile: {e}")))?;
        Ok(())
    }

    pub async fn upsert_event(&self, event: &CalendarEvent) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO calendar_events (id, user_id, title, start_time, location, status, content_type) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.id.clone(),
                    event.user_id.clone(),
                    event.title.clone(),
                    fmt_ts(event.start_time),
                    opt_text(event.location.as_deref()),
                    event.status.as_str(),
                    opt_text(event.content_type.as_deref()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_event: {e}")))?;
        Ok(())
    }

    pub async fn upsert_card(&self, card: &Card) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO cards (id, title, column_name, priority, due_date, assigned_to, assigned_at, content_type, created_at, published_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    card.id.clone(),
                    card.title.clone(),
                    card.column.as_str(),
                    card.priority.as_str(),
                    opt_text_owned(card.due_date.map(|d| d.format("%Y-%m-%d").to_string())),
                    opt_text(card.assigned_to.as_deref()),
                    opt_text_owned(card.assigned_at.map(fmt_ts)),
                    opt_text(card.content_type.as_deref()),
                    fmt_ts(card.created_at),
                    opt_text_owned(card.published_at.map(fmt_ts)),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_card: {e}")))?;
        Ok(())
    }

    async fn query_messages(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<ScheduledMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut messages = Vec::new();
        let mut undecodable = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            match row_to_message(&row) {
                Ok(m) => messages.push(m),
                Err(e) => match row.get::<String>(0) {
                    Ok(id) => undecodable.push((id, e.to_string())),
                    Err(_) => tracing::error!("{op}: unreadable scheduled message row: {e}"),
                },
            }
        }
        drop(rows);

        for (id, reason) in undecodable {
            self.fail_undecodable(&id, &reason).await?;
        }
        Ok(messages)
    }

    /// Move a pending row that cannot be decoded to `failed` so it leaves the
    /// due set instead of being skipped on every run.
    async fn fail_undecodable(&self, id: &str, reason: &str) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE scheduled_messages SET status = 'failed', error_message = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'pending'",
                params![format!("undecodable row: {reason}"), fmt_ts(Utc::now()), id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("fail_undecodable: {e}")))?;
        if affected > 0 {
            tracing::error!(message_id = id, %reason, "Undecodable pending message marked failed");
        }
        Ok(())
    }

    async fn query_cards(&self, op: &str, sql: &str) -> Result<Vec<Card>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, ())
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut cards = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            match row_to_card(&row) {
                Ok(c) => cards.push(c),
                Err(e) => tracing::warn!("{op}: skipping card row: {e}"),
            }
        }
        Ok(cards)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp format for every TEXT timestamp column.
pub(crate) fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn fmt_time(t: NaiveTime) -> String {
    t.format("%H:%M:%S").to_string()
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|s| parse_datetime(&s))
}

fn parse_time_column(row: &libsql::Row, idx: i32, fallback: NaiveTime) -> NaiveTime {
    row.get::<String>(idx)
        .ok()
        .and_then(|s| parse_time_of_day(&s))
        .unwrap_or(fallback)
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

const MESSAGE_COLUMNS: &str = "id, target_type, target_user_id, target_phone, target_group_id, message_type, content, scheduled_for, status, source, source_id, source_reference, recurrence, recurrence_parent_id, retry_count, max_retries, error_message, metadata, sent_at, created_at, updated_at";

const SETTINGS_COLUMNS: &str = "user_id, daily_digest_enabled, daily_digest_time, weekly_summary_enabled, weekly_summary_time, weekly_summary_day, monthly_summary_enabled, monthly_summary_time, monthly_summary_day, realtime_alerts_enabled, urgent_alerts_enabled, deadline_alerts_enabled, assignment_alerts_enabled, reminders_enabled, reminder_days_before, reminder_time, quiet_hours_enabled, quiet_hours_start, quiet_hours_end, utc_offset_minutes";

const EVENT_COLUMNS: &str = "id, user_id, title, start_time, location, status, content_type";

const CARD_COLUMNS: &str = "id, title, column_name, priority, due_date, assigned_to, assigned_at, content_type, created_at, published_at";

/// Map a libsql Row (MESSAGE_COLUMNS order) to a ScheduledMessage.
fn row_to_message(row: &libsql::Row) -> Result<ScheduledMessage, DatabaseError> {
    let field = |e: libsql::Error| DatabaseError::Query(format!("scheduled message row: {e}"));

    let id: String = row.get(0).map_err(field)?;
    let target_type: String = row.get(1).unwrap_or_else(|_| "user".into());
    let scheduled_for: String = row.get(7).map_err(field)?;
    let status: String = row.get(8).map_err(field)?;
    let source: String = row.get(9).map_err(field)?;
    let reference: Option<String> = row.get::<String>(11).ok();
    let recurrence: String = row.get(12).unwrap_or_else(|_| "none".into());
    let metadata_str: String = row.get(17).unwrap_or_else(|_| "{}".into());
    let created: String = row.get(19).unwrap_or_default();
    let updated: String = row.get(20).unwrap_or_default();

    let source_reference = match reference {
        Some(r) => Some(r.parse::<SourceReference>().map_err(DatabaseError::Serialization)?),
        None => None,
    };

    Ok(ScheduledMessage {
        id: id
            .parse()
            .map_err(|e| DatabaseError::Serialization(format!("message id {id}: {e}")))?,
        target_type: target_type.parse().map_err(DatabaseError::Serialization)?,
        target_user_id: row.get::<String>(2).ok(),
        target_phone: row.get::<String>(3).ok(),
        target_group_id: row.get::<String>(4).ok(),
        message_type: row.get(5).unwrap_or_default(),
        content: row.get(6).map_err(field)?,
        scheduled_for: parse_datetime(&scheduled_for),
        status: status.parse().map_err(DatabaseError::Serialization)?,
        source: source.parse().map_err(DatabaseError::Serialization)?,
        source_id: row.get::<String>(10).ok(),
        source_reference,
        recurrence: recurrence.parse().map_err(DatabaseError::Serialization)?,
        recurrence_parent_id: row.get::<String>(13).ok().and_then(|s| s.parse().ok()),
        retry_count: row.get::<i64>(14).unwrap_or(0) as u32,
        max_retries: row.get::<i64>(15).unwrap_or(3) as u32,
        error_message: row.get::<String>(16).ok(),
        metadata: serde_json::from_str(&metadata_str).unwrap_or(serde_json::json!({})),
        sent_at: parse_optional_datetime(row.get::<String>(18).ok()),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

fn row_to_settings(
    row: &libsql::Row,
    default_offset_minutes: i32,
) -> Result<UserNotificationSettings, DatabaseError> {
    let user_id: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("settings row: {e}")))?;
    let flag = |idx: i32, default: bool| {
        row.get::<i64>(idx)
            .map(|v| v != 0)
            .unwrap_or(default)
    };
    let days_json: String = row.get(14).unwrap_or_else(|_| "[]".into());
    let days: Vec<u32> = serde_json::from_str(&days_json).map_err(|e| {
        DatabaseError::Serialization(format!("reminder_days_before for {user_id}: {e}"))
    })?;

    let defaults = UserNotificationSettings::new(user_id.clone(), default_offset_minutes);
    Ok(UserNotificationSettings {
        daily_digest_enabled: flag(1, true),
        daily_digest_time: parse_time_column(row, 2, defaults.daily_digest_time),
        weekly_summary_enabled: flag(3, true),
        weekly_summary_time: parse_time_column(row, 4, defaults.weekly_summary_time),
        weekly_summary_day: row.get::<i64>(5).unwrap_or(1) as u32,
        monthly_summary_enabled: flag(6, true),
        monthly_summary_time: parse_time_column(row, 7, defaults.monthly_summary_time),
        monthly_summary_day: row.get::<i64>(8).unwrap_or(1) as u32,
        realtime_alerts_enabled: flag(9, true),
        urgent_alerts_enabled: flag(10, true),
        deadline_alerts_enabled: flag(11, true),
        assignment_alerts_enabled: flag(12, true),
        reminders_enabled: flag(13, true),
        reminder_days_before: days.into_iter().collect::<BTreeSet<u32>>(),
        reminder_time: parse_time_column(row, 15, defaults.reminder_time),
        quiet_hours_enabled: flag(16, false),
        quiet_hours_start: parse_time_column(row, 17, defaults.quiet_hours_start),
        quiet_hours_end: parse_time_column(row, 18, defaults.quiet_hours_end),
        utc_offset_minutes: row
            .get::<i64>(19)
            .map(|v| v as i32)
            .unwrap_or(default_offset_minutes),
        user_id,
    })
}

fn row_to_event(row: &libsql::Row) -> Result<CalendarEvent, DatabaseError> {
    let field = |e: libsql::Error| DatabaseError::Query(format!("calendar event row: {e}"));
    let start: String = row.get(3).map_err(field)?;
    let status: String = row.get(5).unwrap_or_else(|_| "scheduled".into());
    Ok(CalendarEvent {
        id: row.get(0).map_err(field)?,
        user_id: row.get(1).map_err(field)?,
        title: row.get(2).map_err(field)?,
        start_time: parse_datetime(&start),
        location: row.get::<String>(4).ok(),
        status: status.parse().map_err(DatabaseError::Serialization)?,
        content_type: row.get::<String>(6).ok(),
    })
}

fn row_to_card(row: &libsql::Row) -> Result<Card, DatabaseError> {
    let field = |e: libsql::Error| DatabaseError::Query(format!("card row: {e}"));
    let column: String = row.get(2).map_err(field)?;
    let priority: String = row.get(3).unwrap_or_else(|_| "medium".into());
    let created: String = row.get(8).unwrap_or_default();
    Ok(Card {
        id: row.get(0).map_err(field)?,
        title: row.get(1).map_err(field)?,
        column: column.parse().map_err(DatabaseError::Serialization)?,
        priority: priority.parse().map_err(DatabaseError::Serialization)?,
        due_date: row
            .get::<String>(4)
            .ok()
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        assigned_to: row.get::<String>(5).ok(),
        assigned_at: parse_optional_datetime(row.get::<String>(6).ok()),
        content_type: row.get::<String>(7).ok(),
        created_at: parse_datetime(&created),
        published_at: parse_optional_datetime(row.get::<String>(9).ok()),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Scheduled messages ──────────────────────────────────────────

    async fn insert_scheduled_message(&self, msg: &ScheduledMessage) -> Result<bool, DatabaseError> {
        let metadata = serde_json::to_string(&msg.metadata)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO scheduled_messages (id, target_type, target_user_id, target_phone, target_group_id, message_type, content, scheduled_for, status, source, source_id, source_reference, recurrence, recurrence_parent_id, retry_count, max_retries, error_message, metadata, sent_at, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
                params![
                    msg.id.to_string(),
                    msg.target_type.as_str(),
                    opt_text(msg.target_user_id.as_deref()),
                    opt_text(msg.target_phone.as_deref()),
                    opt_text(msg.target_group_id.as_deref()),
                    msg.message_type.clone(),
                    msg.content.clone(),
                    fmt_ts(msg.scheduled_for),
                    msg.status.as_str(),
                    msg.source.as_str(),
                    opt_text(msg.source_id.as_deref()),
                    opt_text_owned(msg.source_reference.as_ref().map(ToString::to_string)),
                    msg.recurrence.as_str(),
                    opt_text_owned(msg.recurrence_parent_id.map(|id| id.to_string())),
                    msg.retry_count as i64,
                    msg.max_retries as i64,
                    opt_text(msg.error_message.as_deref()),
                    metadata,
                    opt_text_owned(msg.sent_at.map(fmt_ts)),
                    fmt_ts(msg.created_at),
                    fmt_ts(msg.updated_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_scheduled_message: {e}")))?;

        debug!(
            message_id = %msg.id,
            source = %msg.source,
            inserted = inserted > 0,
            "Scheduled message insert"
        );
        Ok(inserted > 0)
    }

    async fn get_scheduled_message(
        &self,
        id: Uuid,
    ) -> Result<Option<ScheduledMessage>, DatabaseError> {
        let mut found = self
            .query_messages(
                "get_scheduled_message",
                &format!("SELECT {MESSAGE_COLUMNS} FROM scheduled_messages WHERE id = ?1"),
                params![id.to_string()],
            )
            .await?;
        Ok(found.pop())
    }

    async fn has_active_reference(
        &self,
        source: MessageSource,
        reference: &SourceReference,
    ) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM scheduled_messages WHERE source = ?1 AND source_reference = ?2 AND status IN ('pending', 'sent')",
                params![source.as_str(), reference.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("has_active_reference: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0) > 0),
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("has_active_reference: {e}"))),
        }
    }

    async fn list_messages_by_reference(
        &self,
        reference: &SourceReference,
    ) -> Result<Vec<ScheduledMessage>, DatabaseError> {
        self.query_messages(
            "list_messages_by_reference",
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM scheduled_messages WHERE source_reference = ?1 ORDER BY created_at ASC"
            ),
            params![reference.to_string()],
        )
        .await
    }

    async fn list_due_messages(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, DatabaseError> {
        self.query_messages(
            "list_due_messages",
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM scheduled_messages WHERE status = 'pending' AND scheduled_for <= ?1 ORDER BY scheduled_for ASC LIMIT ?2"
            ),
            params![fmt_ts(now), limit as i64],
        )
        .await
    }

    async fn mark_message_sent(
        &self,
        id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let ts = fmt_ts(sent_at);
        let count = self
            .conn()
            .execute(
                "UPDATE scheduled_messages SET status = 'sent', sent_at = ?1, error_message = NULL, updated_at = ?2 WHERE id = ?3 AND status = 'pending'",
                params![ts.clone(), ts, id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_message_sent: {e}")))?;

        debug!(message_id = %id, transitioned = count > 0, "Message marked sent");
        Ok(count > 0)
    }

    async fn record_send_failure(
        &self,
        id: Uuid,
        retry_count: u32,
        error: &str,
        terminal: bool,
    ) -> Result<bool, DatabaseError> {
        let status = if terminal {
            MessageStatus::Failed
        } else {
            MessageStatus::Pending
        };
        let count = self
            .conn()
            .execute(
                "UPDATE scheduled_messages SET status = ?1, retry_count = ?2, error_message = ?3, updated_at = ?4 WHERE id = ?5 AND status = 'pending'",
                params![
                    status.as_str(),
                    retry_count as i64,
                    error,
                    fmt_ts(Utc::now()),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_send_failure: {e}")))?;
        Ok(count > 0)
    }

    async fn cancel_message(&self, id: Uuid, reason: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE scheduled_messages SET status = 'cancelled', error_message = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'pending'",
                params![reason, fmt_ts(Utc::now()), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("cancel_message: {e}")))?;
        Ok(count > 0)
    }

    async fn prune_terminal_messages(&self, before: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM scheduled_messages WHERE status IN ('sent', 'failed', 'cancelled') AND updated_at < ?1",
                params![fmt_ts(before)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("prune_terminal_messages: {e}")))?;
        Ok(count as usize)
    }

    // ── Notification settings ───────────────────────────────────────

    async fn get_notification_settings(
        &self,
        user_id: &str,
    ) -> Result<Option<UserNotificationSettings>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SETTINGS_COLUMNS} FROM notification_settings WHERE user_id = ?1"),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_notification_settings: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_settings(&row, self.default_offset_minutes)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_notification_settings: {e}"))),
        }
    }

    async fn list_notification_settings(
        &self,
    ) -> Result<Vec<UserNotificationSettings>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SETTINGS_COLUMNS} FROM notification_settings ORDER BY user_id"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_notification_settings: {e}")))?;

        let mut all = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_notification_settings: {e}")))?
        {
            match row_to_settings(&row, self.default_offset_minutes) {
                Ok(s) => all.push(s),
                Err(e) => tracing::warn!("Skipping settings row: {e}"),
            }
        }
        Ok(all)
    }

    // ── Audit log ───────────────────────────────────────────────────

    async fn record_notification_log(
        &self,
        entry: &NotificationLogEntry,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO notification_log (id, user_id, source, reference, content, sent_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.id.to_string(),
                    entry.user_id.clone(),
                    entry.source.as_str(),
                    entry.reference.clone(),
                    entry.content.clone(),
                    fmt_ts(entry.sent_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_notification_log: {e}")))?;
        Ok(())
    }

    async fn has_notification_log(
        &self,
        user_id: &str,
        reference: &str,
    ) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM notification_log WHERE user_id = ?1 AND reference = ?2",
                params![user_id, reference],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("has_notification_log: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0) > 0),
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("has_notification_log: {e}"))),
        }
    }

    async fn prune_notification_log(&self, before: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM notification_log WHERE sent_at < ?1",
                params![fmt_ts(before)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("prune_notification_log: {e}")))?;
        Ok(count as usize)
    }

    // ── Business data ───────────────────────────────────────────────

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, display_name, phone, active FROM profiles WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(UserProfile {
                user_id: row.get(0).unwrap_or_default(),
                display_name: row.get(1).unwrap_or_default(),
                phone: row.get::<String>(2).ok(),
                active: row.get::<i64>(3).unwrap_or(1) != 0,
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_profile: {e}"))),
        }
    }

    async fn list_events_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM calendar_events WHERE user_id = ?1 AND start_time >= ?2 AND start_time < ?3 ORDER BY start_time ASC"
                ),
                params![user_id, fmt_ts(from), fmt_ts(to)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_events_between: {e}")))?;

        let mut events = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_events_between: {e}")))?
        {
            match row_to_event(&row) {
                Ok(e) => events.push(e),
                Err(e) => tracing::warn!("Skipping calendar event row: {e}"),
            }
        }
        Ok(events)
    }

    async fn list_cards(&self) -> Result<Vec<Card>, DatabaseError> {
        self.query_cards(
            "list_cards",
            &format!("SELECT {CARD_COLUMNS} FROM cards ORDER BY created_at ASC"),
        )
        .await
    }

    async fn list_open_cards(&self) -> Result<Vec<Card>, DatabaseError> {
        let terminal: Vec<String> = KanbanColumn::ALL
            .iter()
            .filter(|c| c.is_terminal())
            .map(|c| format!("'{}'", c.as_str()))
            .collect();
        self.query_cards(
            "list_open_cards",
            &format!(
                "SELECT {CARD_COLUMNS} FROM cards WHERE column_name NOT IN ({}) ORDER BY created_at ASC",
                terminal.join(", ")
            ),
        )
        .await
    }
}

// ── Tests ───────────────────────────────────────────────────────────
