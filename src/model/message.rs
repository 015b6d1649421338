//! Queue entries: `scheduled_messages` rows.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::recurrence::Recurrence;
use super::reference::SourceReference;

/// Default retry budget for queued messages.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Who a message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    #[default]
    User,
    Group,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::User => "user",
            TargetType::Group => "group",
        }
    }
}

impl FromStr for TargetType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(TargetType::User),
            "group" => Ok(TargetType::Group),
            other => Err(format!("unknown target type: {other}")),
        }
    }
}

/// Lifecycle of a queued message. `Sent`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Sent => "sent",
            MessageStatus::Failed => "failed",
            MessageStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, MessageStatus::Pending)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MessageStatus::Pending),
            "sent" => Ok(MessageStatus::Sent),
            "failed" => Ok(MessageStatus::Failed),
            "cancelled" => Ok(MessageStatus::Cancelled),
            other => Err(format!("unknown message status: {other}")),
        }
    }
}

/// What produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    Manual,
    CalendarReminder,
    Dashboard,
    DailyDigest,
    WeeklySummary,
    MonthlySummary,
    RealtimeAlert,
}

impl MessageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSource::Manual => "manual",
            MessageSource::CalendarReminder => "calendar_reminder",
            MessageSource::Dashboard => "dashboard",
            MessageSource::DailyDigest => "daily_digest",
            MessageSource::WeeklySummary => "weekly_summary",
            MessageSource::MonthlySummary => "monthly_summary",
            MessageSource::RealtimeAlert => "realtime_alert",
        }
    }
}

impl fmt::Display for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageSource {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(MessageSource::Manual),
            "calendar_reminder" => Ok(MessageSource::CalendarReminder),
            "dashboard" => Ok(MessageSource::Dashboard),
            "daily_digest" => Ok(MessageSource::DailyDigest),
            "weekly_summary" => Ok(MessageSource::WeeklySummary),
            "monthly_summary" => Ok(MessageSource::MonthlySummary),
            "realtime_alert" => Ok(MessageSource::RealtimeAlert),
            other => Err(format!("unknown message source: {other}")),
        }
    }
}

/// A queued outbound notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: Uuid,
    pub target_type: TargetType,
    pub target_user_id: Option<String>,
    pub target_phone: Option<String>,
    pub target_group_id: Option<String>,
    pub message_type: String,
    pub content: String,
    pub scheduled_for: DateTime<Utc>,
    pub status: MessageStatus,
    pub source: MessageSource,
    pub source_id: Option<String>,
    /// Dedup key; mirrored into `metadata.source_reference`.
    pub source_reference: Option<SourceReference>,
    pub recurrence: Recurrence,
    pub recurrence_parent_id: Option<Uuid>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledMessage {
    /// New pending message addressed to a single user.
    pub fn for_user(
        user_id: impl Into<String>,
        phone: Option<String>,
        content: impl Into<String>,
        scheduled_for: DateTime<Utc>,
        source: MessageSource,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            target_type: TargetType::User,
            target_user_id: Some(user_id.into()),
            target_phone: phone,
            target_group_id: None,
            message_type: source.as_str().to_string(),
            content: content.into(),
            scheduled_for,
            status: MessageStatus::Pending,
            source,
            source_id: None,
            source_reference: None,
            recurrence: Recurrence::None,
            recurrence_parent_id: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            error_message: None,
            metadata: serde_json::json!({}),
            sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// New pending message addressed to a group chat.
    pub fn for_group(
        group_id: impl Into<String>,
        content: impl Into<String>,
        scheduled_for: DateTime<Utc>,
        source: MessageSource,
    ) -> Self {
        let mut msg = Self::for_user("", None, content, scheduled_for, source);
        msg.target_type = TargetType::Group;
        msg.target_user_id = None;
        msg.target_group_id = Some(group_id.into());
        msg
    }

    /// Set the dedup key and mirror it into metadata.
    pub fn with_reference(mut self, reference: SourceReference) -> Self {
        if !self.metadata.is_object() {
            self.metadata = serde_json::json!({});
        }
        if let Some(map) = self.metadata.as_object_mut() {
            map.insert(
                "source_reference".into(),
                serde_json::Value::String(reference.to_string()),
            );
        }
        self.source_reference = Some(reference);
        self
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = message_type.into();
        self
    }

    pub fn with_recurrence(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = recurrence;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Successor link in a recurrence chain, scheduled at `next`.
    ///
    /// Copies target, payload, provenance and retry budget. The dedup key is
    /// derived from this message's id so a link can only be expanded once.
    pub fn successor(&self, next: DateTime<Utc>) -> Self {
        let now = Utc::now();
        let mut metadata = self.metadata.clone();
        if let Some(map) = metadata.as_object_mut() {
            map.remove("source_reference");
        }
        let next_msg = Self {
            id: Uuid::new_v4(),
            target_type: self.target_type,
            target_user_id: self.target_user_id.clone(),
            target_phone: self.target_phone.clone(),
            target_group_id: self.target_group_id.clone(),
            message_type: self.message_type.clone(),
            content: self.content.clone(),
            scheduled_for: next,
            status: MessageStatus::Pending,
            source: self.source,
            source_id: self.source_id.clone(),
            source_reference: None,
            recurrence: self.recurrence,
            recurrence_parent_id: Some(self.id),
            retry_count: 0,
            max_retries: self.max_retries,
            error_message: None,
            metadata,
            sent_at: None,
            created_at: now,
            updated_at: now,
        };
        next_msg.with_reference(SourceReference::Recurrence { parent_id: self.id })
    }

    /// Attempt count after one more failed send, and whether that exhausts
    /// the retry budget.
    pub fn next_failed_attempt(&self) -> (u32, bool) {
        let retry_count = self.retry_count + 1;
        (retry_count, retry_count >= self.max_retries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ScheduledMessage {
        ScheduledMessage::for_user(
            "user-1",
            Some("5511999990000".into()),
            "hello",
            Utc::now(),
            MessageSource::Manual,
        )
    }

    #[test]
    fn new_message_is_pending_with_default_budget() {
        let msg = sample();
        assert_eq!(msg.status, MessageStatus::Pending);
        assert_eq!(msg.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(msg.retry_count, 0);
        assert_eq!(msg.message_type, "manual");
        assert_eq!(msg.next_failed_attempt(), (1, false));
    }

    #[test]
    fn third_failure_exhausts_default_budget() {
        let mut msg = sample();
        msg.retry_count = 2;
        assert_eq!(msg.next_failed_attempt(), (3, true));
    }

    #[test]
    fn group_message_has_no_user_target() {
        let msg = ScheduledMessage::for_group(
            "120363041234567890@g.us",
            "hi",
            Utc::now(),
            MessageSource::Dashboard,
        );
        assert_eq!(msg.target_type, TargetType::Group);
        assert_eq!(msg.target_user_id, None);
        assert_eq!(msg.target_group_id.as_deref(), Some("120363041234567890@g.us"));
    }

    #[test]
    fn reference_mirrored_into_metadata() {
        let msg = sample().with_reference(SourceReference::calendar("evt", 1));
        assert_eq!(msg.metadata["source_reference"], "cal:evt:d-1");
    }

    #[test]
    fn successor_links_to_parent() {
        let parent = sample()
            .with_recurrence(Recurrence::Daily)
            .with_max_retries(5)
            .with_source_id("src-1");
        let next_at = parent.scheduled_for + chrono::Duration::days(1);
        let next = parent.successor(next_at);

        assert_ne!(next.id, parent.id);
        assert_eq!(next.recurrence_parent_id, Some(parent.id));
        assert_eq!(next.content, parent.content);
        assert_eq!(next.target_phone, parent.target_phone);
        assert_eq!(next.recurrence, Recurrence::Daily);
        assert_eq!(next.max_retries, 5);
        assert_eq!(next.source_id.as_deref(), Some("src-1"));
        assert_eq!(next.scheduled_for, next_at);
        assert_eq!(
            next.source_reference,
            Some(SourceReference::Recurrence { parent_id: parent.id })
        );
    }

    #[test]
    fn terminal_statuses() {
        assert!(!MessageStatus::Pending.is_terminal());
        assert!(MessageStatus::Sent.is_terminal());
        assert!(MessageStatus::Failed.is_terminal());
        assert!(MessageStatus::Cancelled.is_terminal());
    }

    #[test]
    fn source_parse_display() {
        for source in [
            MessageSource::Manual,
            MessageSource::CalendarReminder,
            MessageSource::Dashboard,
            MessageSource::DailyDigest,
            MessageSource::WeeklySummary,
            MessageSource::MonthlySummary,
            MessageSource::RealtimeAlert,
        ] {
            assert_eq!(source.to_string().parse::<MessageSource>().unwrap(), source);
        }
    }
}
