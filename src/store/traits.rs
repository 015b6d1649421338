//! Unified `Database` trait: single async interface for all persistence.
//!
//! Covers the notification queue and audit log (owned by this core) plus the
//! settings and business tables, which this core only reads.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{
    CalendarEvent, Card, MessageSource, ScheduledMessage, SourceReference, UserNotificationSettings,
    UserProfile,
};

/// Audit record of a direct (non-queued) send.
#[derive(Debug, Clone)]
pub struct NotificationLogEntry {
    pub id: Uuid,
    pub user_id: String,
    pub source: MessageSource,
    /// Period key such as `digest:weekly:2026-02-02`.
    pub reference: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl NotificationLogEntry {
    pub fn new(
        user_id: impl Into<String>,
        source: MessageSource,
        reference: impl Into<String>,
        content: impl Into<String>,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            source,
            reference: reference.into(),
            content: content.into(),
            sent_at,
        }
    }
}

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Scheduled messages ──────────────────────────────────────────

    /// Insert a pending message. Returns `false` when an active row with the
    /// same `(source, source_reference)` already exists.
    async fn insert_scheduled_message(&self, msg: &ScheduledMessage) -> Result<bool, DatabaseError>;

    /// Get a message by ID.
    async fn get_scheduled_message(
        &self,
        id: Uuid,
    ) -> Result<Option<ScheduledMessage>, DatabaseError>;

    /// Whether a pending or sent row carries this dedup key.
    async fn has_active_reference(
        &self,
        source: MessageSource,
        reference: &SourceReference,
    ) -> Result<bool, DatabaseError>;

    /// All rows carrying this dedup key, any status, oldest first.
    async fn list_messages_by_reference(
        &self,
        reference: &SourceReference,
    ) -> Result<Vec<ScheduledMessage>, DatabaseError>;

    /// Pending rows due at `now`, ordered by `scheduled_for`, capped at `limit`.
    async fn list_due_messages(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, DatabaseError>;

    /// Pending → sent. Returns `false` if the row was no longer pending.
    async fn mark_message_sent(
        &self,
        id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Record a failed attempt; `terminal` moves the row to `failed`.
    /// Returns `false` if the row was no longer pending.
    async fn record_send_failure(
        &self,
        id: Uuid,
        retry_count: u32,
        error: &str,
        terminal: bool,
    ) -> Result<bool, DatabaseError>;

    /// Pending → cancelled with a reason.
    async fn cancel_message(&self, id: Uuid, reason: &str) -> Result<bool, DatabaseError>;

    /// Delete terminal rows last updated before `before`.
    async fn prune_terminal_messages(&self, before: DateTime<Utc>) -> Result<usize, DatabaseError>;

    // ── Notification settings ───────────────────────────────────────

    async fn get_notification_settings(
        &self,
        user_id: &str,
    ) -> Result<Option<UserNotificationSettings>, DatabaseError>;

    async fn list_notification_settings(
        &self,
    ) -> Result<Vec<UserNotificationSettings>, DatabaseError>;

    // ── Audit log ───────────────────────────────────────────────────

    async fn record_notification_log(
        &self,
        entry: &NotificationLogEntry,
    ) -> Result<(), DatabaseError>;

    /// Whether a direct send with this reference was already logged for the user.
    async fn has_notification_log(
        &self,
        user_id: &str,
        reference: &str,
    ) -> Result<bool, DatabaseError>;

    /// Delete audit rows older than `before`.
    async fn prune_notification_log(&self, before: DateTime<Utc>) -> Result<usize, DatabaseError>;

    // ── Business data (read-only) ───────────────────────────────────

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, DatabaseError>;

    /// A user's events with `from <= start_time < to`, ordered by start.
    async fn list_events_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, DatabaseError>;

    /// Every card on the board.
    async fn list_cards(&self) -> Result<Vec<Card>, DatabaseError>;

    /// Cards outside the terminal columns.
    async fn list_open_cards(&self) -> Result<Vec<Card>, DatabaseError>;
}
