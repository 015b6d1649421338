//! Calendar reminder job: generate reminders and enqueue them.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::RunResult;
use super::dedup::{DedupGuard, EnqueueOutcome};
use crate::error::DatabaseError;
use crate::generators::{calendar_reminders, reminder_horizon};
use crate::model::{MessageSource, ScheduledMessage, UserNotificationSettings};
use crate::store::Database;

pub struct CalendarReminderJob {
    db: Arc<dyn Database>,
    dedup: DedupGuard,
    max_retries: u32,
}

impl CalendarReminderJob {
    pub fn new(db: Arc<dyn Database>, dedup: DedupGuard, max_retries: u32) -> Self {
        Self {
            db,
            dedup,
            max_retries,
        }
    }

    /// processed = rows inserted, skipped = dedup hits and subscribers
    /// without a phone.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunResult, DatabaseError> {
        let subscribers = self.db.list_notification_settings().await?;
        let mut result = RunResult::default();

        for settings in subscribers.iter().filter(|s| s.reminders_enabled) {
            if let Err(e) = self.run_for(settings, now, &mut result).await {
                tracing::error!(user_id = %settings.user_id, error = %e, "Calendar reminders failed");
                result.errors += 1;
            }
        }
        tracing::info!(
            inserted = result.processed,
            skipped = result.skipped,
            errors = result.errors,
            "Calendar reminders generated"
        );
        Ok(result)
    }

    async fn run_for(
        &self,
        settings: &UserNotificationSettings,
        now: DateTime<Utc>,
        result: &mut RunResult,
    ) -> Result<(), DatabaseError> {
        let user_id = settings.user_id.as_str();
        let Some(profile) = self.db.get_profile(user_id).await?.filter(|p| p.active) else {
            return Ok(());
        };
        let Some(phone) = profile.phone().map(str::to_string) else {
            tracing::debug!(user_id, "No phone number, calendar reminders skipped");
            result.skipped += 1;
            return Ok(());
        };

        let events = self
            .db
            .list_events_between(user_id, now, reminder_horizon(settings, now))
            .await?;

        for candidate in calendar_reminders(&profile, settings, &events, now) {
            let msg = ScheduledMessage::for_user(
                user_id,
                Some(phone.clone()),
                candidate.content,
                candidate.scheduled_for,
                MessageSource::CalendarReminder,
            )
            .with_reference(candidate.reference)
            .with_source_id(candidate.event_id)
            .with_message_type("calendar_reminder")
            .with_max_retries(self.max_retries);

            match self.dedup.enqueue(&msg).await {
                Ok(EnqueueOutcome::Inserted) => result.processed += 1,
                Ok(EnqueueOutcome::Duplicate) => result.skipped += 1,
                Err(e) => {
                    tracing::error!(message_id = %msg.id, error = %e, "Failed to enqueue reminder");
                    result.errors += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CalendarEvent, EventStatus, UserProfile};
    use crate::store::LibSqlBackend;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    async fn seeded(phone: Option<&str>) -> (CalendarReminderJob, Arc<LibSqlBackend>) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let mut settings = UserNotificationSettings::new("user1", -180);
        settings.reminder_days_before = [3, 1].into_iter().collect();
        db.upsert_notification_settings(&settings).await.unwrap();
        db.upsert_profile(&UserProfile {
            user_id: "user1".into(),
            display_name: "Ana".into(),
            phone: phone.map(str::to_string),
            active: true,
        })
        .await
        .unwrap();
        db.upsert_event(&CalendarEvent {
            id: "evt-1".into(),
            user_id: "user1".into(),
            title: "Live performance".into(),
            start_time: ts("2026-02-10T20:00:00Z"),
            location: None,
            status: EventStatus::Scheduled,
            content_type: None,
        })
        .await
        .unwrap();
        let store: Arc<dyn Database> = db.clone();
        let job = CalendarReminderJob::new(Arc::clone(&store), DedupGuard::new(store), 3);
        (job, db)
    }

    #[tokio::test]
    async fn generation_is_idempotent() {
        let (job, db) = seeded(Some("5511999990000")).await;
        let now = ts("2026-02-06T15:00:00Z");

        let first = job.run(now).await.unwrap();
        assert_eq!((first.processed, first.skipped), (2, 0));
        let second = job.run(now).await.unwrap();
        assert_eq!((second.processed, second.skipped), (0, 2));

        let due = db.list_due_messages(ts("2026-02-11T00:00:00Z"), 10).await.unwrap();
        assert_eq!(due.len(), 2);
        assert!(due.iter().all(|m| m.message_type == "calendar_reminder"));
        assert!(due.iter().all(|m| m.source_id.as_deref() == Some("evt-1")));
    }

    #[tokio::test]
    async fn subscriber_without_phone_is_skipped() {
        let (job, db) = seeded(None).await;
        let result = job.run(ts("2026-02-06T15:00:00Z")).await.unwrap();
        assert_eq!((result.processed, result.skipped), (0, 1));
        assert!(db.list_due_messages(ts("2026-02-11T00:00:00Z"), 10).await.unwrap().is_empty());
    }
}
