//! Realtime alert job: enqueue card alerts for immediate delivery.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::RunResult;
use super::dedup::{DedupGuard, EnqueueOutcome};
use crate::error::DatabaseError;
use crate::generators::realtime_alerts;
use crate::model::{MessageSource, ScheduledMessage};
use crate::store::Database;

pub struct RealtimeAlertJob {
    db: Arc<dyn Database>,
    dedup: DedupGuard,
    max_retries: u32,
}

impl RealtimeAlertJob {
    pub fn new(db: Arc<dyn Database>, dedup: DedupGuard, max_retries: u32) -> Self {
        Self {
            db,
            dedup,
            max_retries,
        }
    }

    /// Alerts are scheduled at `now` and picked up by the next dispatch.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunResult, DatabaseError> {
        let subscribers = self.db.list_notification_settings().await?;
        let mut result = RunResult::default();
        if !subscribers.iter().any(|s| s.realtime_alerts_enabled) {
            return Ok(result);
        }
        let cards = self.db.list_open_cards().await?;

        for settings in subscribers.iter().filter(|s| s.realtime_alerts_enabled) {
            let user_id = settings.user_id.as_str();
            let profile = match self.db.get_profile(user_id).await {
                Ok(p) => p.filter(|p| p.active),
                Err(e) => {
                    tracing::error!(user_id, error = %e, "Failed to load profile");
                    result.errors += 1;
                    continue;
                }
            };
            let Some(phone) = profile.as_ref().and_then(|p| p.phone()).map(str::to_string)
            else {
                result.skipped += 1;
                continue;
            };

            for alert in realtime_alerts(settings, &cards, now) {
                let msg = ScheduledMessage::for_user(
                    user_id,
                    Some(phone.clone()),
                    alert.content,
                    now,
                    MessageSource::RealtimeAlert,
                )
                .with_reference(alert.reference)
                .with_source_id(alert.card_id)
                .with_message_type(format!("{}_alert", alert.kind))
                .with_max_retries(self.max_retries);

                match self.dedup.enqueue(&msg).await {
                    Ok(EnqueueOutcome::Inserted) => result.processed += 1,
                    Ok(EnqueueOutcome::Duplicate) => result.skipped += 1,
                    Err(e) => {
                        tracing::error!(message_id = %msg.id, error = %e, "Failed to enqueue alert");
                        result.errors += 1;
                    }
                }
            }
        }
        tracing::info!(
            inserted = result.processed,
            skipped = result.skipped,
            "Realtime alerts generated"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::model::{Card, CardPriority, KanbanColumn, UserNotificationSettings, UserProfile};
    use crate::store::LibSqlBackend;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn alerts_once_per_day() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        db.upsert_notification_settings(&UserNotificationSettings::new("user1", -180))
            .await
            .unwrap();
        db.upsert_profile(&UserProfile {
            user_id: "user1".into(),
            display_name: "Ana".into(),
            phone: Some("5511999990000".into()),
            active: true,
        })
        .await
        .unwrap();
        db.upsert_card(&Card {
            id: "c1".into(),
            title: "Launch teaser".into(),
            column: KanbanColumn::Review,
            priority: CardPriority::Urgent,
            due_date: NaiveDate::from_ymd_opt(2026, 2, 10),
            assigned_to: None,
            assigned_at: None,
            content_type: None,
            created_at: ts("2026-02-01T12:00:00Z"),
            published_at: None,
        })
        .await
        .unwrap();
        let store: Arc<dyn Database> = db.clone();
        let job = RealtimeAlertJob::new(Arc::clone(&store), DedupGuard::new(store), 3);

        let first = job.run(ts("2026-02-10T15:00:00Z")).await.unwrap();
        assert_eq!(first.processed, 2, "urgent and deadline");
        let later = job.run(ts("2026-02-10T18:00:00Z")).await.unwrap();
        assert_eq!((later.processed, later.skipped), (0, 2));

        let due = db.list_due_messages(ts("2026-02-10T18:00:00Z"), 10).await.unwrap();
        let mut types: Vec<&str> = due.iter().map(|m| m.message_type.as_str()).collect();
        types.sort();
        assert_eq!(types, vec!["deadline_alert", "urgent_alert"]);
    }
}
