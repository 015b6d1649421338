//! Delivery dispatcher: sends due queued messages with bounded retry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::RunResult;
use super::gate::{GateDecision, NotificationRequest};
use super::recurrence::RecurrenceExpander;
use crate::channels::OutboundChannel;
use crate::error::DatabaseError;
use crate::model::{ScheduledMessage, TargetType, UserNotificationSettings};
use crate::store::Database;
use crate::time::BusinessClock;

/// What happened to a single due row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOutcome {
    Sent,
    Cancelled,
    Deferred,
    /// Failed attempt, still pending.
    Retrying,
    /// Retry budget exhausted.
    Failed,
    /// Another run changed the row first.
    Stale,
}

/// Polls due rows and pushes them through gating and the outbound channel.
pub struct Dispatcher {
    db: Arc<dyn Database>,
    channel: Arc<dyn OutboundChannel>,
    expander: RecurrenceExpander,
    /// Clock for targets without settings.
    default_clock: BusinessClock,
    batch_size: usize,
    send_delay: Duration,
}

impl Dispatcher {
    pub fn new(
        db: Arc<dyn Database>,
        channel: Arc<dyn OutboundChannel>,
        expander: RecurrenceExpander,
        default_clock: BusinessClock,
        batch_size: usize,
        send_delay: Duration,
    ) -> Self {
        Self {
            db,
            channel,
            expander,
            default_clock,
            batch_size,
            send_delay,
        }
    }

    /// Process up to `batch_size` due rows, oldest first, one at a time.
    ///
    /// Only the initial selection can fail the run. Errors on individual rows
    /// are logged and counted, and the batch continues.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunResult, DatabaseError> {
        let due = self.db.list_due_messages(now, self.batch_size).await?;
        tracing::info!(count = due.len(), "Dispatching due messages");

        let mut result = RunResult::default();
        let mut attempted_send = false;

        for msg in &due {
            if attempted_send && !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }

            match self.process(msg, now).await {
                Ok(outcome) => {
                    attempted_send = matches!(
                        outcome,
                        RowOutcome::Sent | RowOutcome::Retrying | RowOutcome::Failed
                    );
                    match outcome {
                        RowOutcome::Sent => result.processed += 1,
                        RowOutcome::Cancelled | RowOutcome::Stale => result.skipped += 1,
                        RowOutcome::Deferred => {}
                        RowOutcome::Retrying | RowOutcome::Failed => result.errors += 1,
                    }
                }
                Err(e) => {
                    tracing::error!(message_id = %msg.id, error = %e, "Failed to process message");
                    result.errors += 1;
                    attempted_send = false;
                }
            }
        }
        Ok(result)
    }

    async fn process(
        &self,
        msg: &ScheduledMessage,
        now: DateTime<Utc>,
    ) -> Result<RowOutcome, DatabaseError> {
        let settings = match msg.target_user_id.as_deref() {
            Some(user_id) => self.db.get_notification_settings(user_id).await?,
            None => None,
        };
        let address = self.resolve_address(msg).await?;

        let request = NotificationRequest::queued(msg.source, address.as_deref(), settings.as_ref());
        let phone = match request.evaluate(now) {
            GateDecision::Deliver { phone } => phone,
            GateDecision::Defer => return Ok(RowOutcome::Deferred),
            GateDecision::Cancel(reason) => {
                tracing::info!(message_id = %msg.id, %reason, "Message cancelled");
                return Ok(if self.db.cancel_message(msg.id, &reason).await? {
                    RowOutcome::Cancelled
                } else {
                    RowOutcome::Stale
                });
            }
        };

        let outcome = self.channel.send(&phone, &msg.content).await;

        if outcome.success {
            if !self.db.mark_message_sent(msg.id, now).await? {
                return Ok(RowOutcome::Stale);
            }
            tracing::info!(message_id = %msg.id, source = %msg.source, "Message sent");

            if msg.recurrence.is_recurring() {
                let clock = settings
                    .as_ref()
                    .map(UserNotificationSettings::clock)
                    .unwrap_or(self.default_clock);
                // The send itself succeeded; a failed expansion is only logged.
                if let Err(e) = self.expander.expand(msg, &clock, now).await {
                    tracing::error!(message_id = %msg.id, error = %e, "Recurrence expansion failed");
                }
            }
            return Ok(RowOutcome::Sent);
        }

        let error = outcome.error.unwrap_or_else(|| "unknown send failure".into());
        let (retry_count, terminal) = msg.next_failed_attempt();
        if !self
            .db
            .record_send_failure(msg.id, retry_count, &error, terminal)
            .await?
        {
            return Ok(RowOutcome::Stale);
        }

        if terminal {
            tracing::error!(
                message_id = %msg.id,
                retry_count,
                max_retries = msg.max_retries,
                %error,
                "Message failed permanently"
            );
            Ok(RowOutcome::Failed)
        } else {
            tracing::warn!(
                message_id = %msg.id,
                retry_count,
                max_retries = msg.max_retries,
                %error,
                "Send failed, will retry next cycle"
            );
            Ok(RowOutcome::Retrying)
        }
    }

    /// Outbound address: the group id for group rows; for user rows the
    /// row phone first, then the target user's profile.
    async fn resolve_address(
        &self,
        msg: &ScheduledMessage,
    ) -> Result<Option<String>, DatabaseError> {
        let non_blank = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        if msg.target_type == TargetType::Group {
            return Ok(non_blank(&msg.target_group_id));
        }
        if let Some(phone) = non_blank(&msg.target_phone) {
            return Ok(Some(phone));
        }
        let Some(user_id) = msg.target_user_id.as_deref() else {
            return Ok(None);
        };
        Ok(self
            .db
            .get_profile(user_id)
            .await?
            .and_then(|p| p.phone().map(str::to_string)))
    }
}
