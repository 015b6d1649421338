//! Digest scheduler: direct-send path for periodic digests.
//!
//! No queue row is created. Each invocation checks every subscriber's
//! configured schedule and sends immediately on a match. A `notification_log`
//! record per period keeps overlapping runs from sending the same digest twice.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};

use super::RunResult;
use super::gate::{GateDecision, NotificationRequest};
use crate::channels::OutboundChannel;
use crate::error::DatabaseError;
use crate::generators::{DigestMetrics, DigestPeriod, render_digest};
use crate::model::{Card, DigestKind, UserNotificationSettings};
use crate::store::{Database, NotificationLogEntry};
use crate::time::{clamp_day_of_month, matches_time};

/// Whether `kind` is scheduled for this subscriber at `now`.
///
/// Time of day must match within `tolerance`; weekly also needs the weekday
/// and monthly the day of month, clamped to the month's last day.
pub fn is_due(
    settings: &UserNotificationSettings,
    kind: DigestKind,
    now: DateTime<Utc>,
    tolerance: Duration,
) -> bool {
    if !settings.digest_enabled(kind) {
        return false;
    }
    let local = settings.clock().local(now);
    if !matches_time(local.time(), settings.digest_time(kind), tolerance) {
        return false;
    }
    match kind {
        DigestKind::Daily => true,
        DigestKind::Weekly => settings.weekly_weekday() == Some(local.weekday()),
        DigestKind::Monthly => {
            local.day() == clamp_day_of_month(local.date(), settings.monthly_summary_day)
        }
    }
}

/// Generates and sends digests for every subscriber whose schedule matches.
pub struct DigestScheduler {
    db: Arc<dyn Database>,
    channel: Arc<dyn OutboundChannel>,
    tolerance: Duration,
    send_delay: Duration,
}

impl DigestScheduler {
    pub fn new(
        db: Arc<dyn Database>,
        channel: Arc<dyn OutboundChannel>,
        tolerance: Duration,
        send_delay: Duration,
    ) -> Self {
        Self {
            db,
            channel,
            tolerance,
            send_delay,
        }
    }

    pub async fn run(&self, kind: DigestKind, now: DateTime<Utc>) -> Result<RunResult, DatabaseError> {
        let subscribers: Vec<UserNotificationSettings> = self
            .db
            .list_notification_settings()
            .await?
            .into_iter()
            .filter(|s| is_due(s, kind, now, self.tolerance))
            .collect();

        tracing::info!(kind = kind.as_str(), due = subscribers.len(), "Running digest");
        let mut result = RunResult::default();
        if subscribers.is_empty() {
            return Ok(result);
        }

        let cards = self.db.list_cards().await?;
        let mut sent_any = false;

        for settings in &subscribers {
            if sent_any && !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }
            match self.deliver(kind, settings, &cards, now).await {
                Ok(true) => {
                    result.processed += 1;
                    sent_any = true;
                }
                Ok(false) => result.skipped += 1,
                Err(e) => {
                    tracing::error!(user_id = %settings.user_id, error = %e, "Digest failed");
                    result.errors += 1;
                }
            }
        }
        Ok(result)
    }

    /// `Ok(false)` when the subscriber is gated out or already received this
    /// period's digest.
    async fn deliver(
        &self,
        kind: DigestKind,
        settings: &UserNotificationSettings,
        cards: &[Card],
        now: DateTime<Utc>,
    ) -> Result<bool, DigestError> {
        let user_id = settings.user_id.as_str();
        let Some(profile) = self.db.get_profile(user_id).await?.filter(|p| p.active) else {
            tracing::debug!(user_id, "No active profile, digest skipped");
            return Ok(false);
        };

        let request = NotificationRequest::direct(kind.source(), profile.phone(), settings);
        let phone = match request.evaluate(now) {
            GateDecision::Deliver { phone } => phone,
            GateDecision::Defer => return Ok(false),
            GateDecision::Cancel(reason) => {
                tracing::debug!(user_id, %reason, "Digest skipped");
                return Ok(false);
            }
        };

        let clock = settings.clock();
        let today = clock.local_date(now);
        let period = DigestPeriod::resolve(kind, today);
        let reference = period.reference();
        if self.db.has_notification_log(user_id, &reference).await? {
            tracing::debug!(user_id, %reference, "Digest already sent for period");
            return Ok(false);
        }

        let (from, to) = clock.date_range(period.start, period.end);
        let events = self.db.list_events_between(user_id, from, to).await?;
        let agenda = match kind {
            DigestKind::Daily => {
                let (from, to) = clock.date_range(today, today.succ_opt().unwrap_or(today));
                self.db.list_events_between(user_id, from, to).await?
            }
            DigestKind::Weekly | DigestKind::Monthly => Vec::new(),
        };

        let metrics = DigestMetrics::compute(&period, &clock, today, cards, &events);
        let content = render_digest(&profile, &period, &metrics, &agenda, &clock);

        let outcome = self.channel.send(&phone, &content).await;
        if !outcome.success {
            return Err(DigestError::Send(
                outcome.error.unwrap_or_else(|| "unknown send failure".into()),
            ));
        }
        tracing::info!(user_id, %reference, "Digest sent");

        let entry = NotificationLogEntry::new(user_id, kind.source(), reference, content, now);
        if let Err(e) = self.db.record_notification_log(&entry).await {
            // Already delivered; only the audit record is missing.
            tracing::error!(user_id, error = %e, "Failed to record digest in notification log");
        }
        Ok(true)
    }
}

#[derive(Debug, thiserror::Error)]
enum DigestError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("send failed: {0}")]
    Send(String),
}
