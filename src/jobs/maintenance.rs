//! Memory maintenance: prune old terminal rows and audit records.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::RunResult;
use crate::store::Database;

/// Delete terminal messages and log rows older than `retention_days`.
/// Pending rows are never touched. processed = rows deleted.
pub async fn prune(db: &Arc<dyn Database>, retention_days: u32, now: DateTime<Utc>) -> RunResult {
    let cutoff = now - Duration::days(i64::from(retention_days));
    let mut result = RunResult::default();

    match db.prune_terminal_messages(cutoff).await {
        Ok(n) => result.processed += n as u32,
        Err(e) => {
            tracing::error!(error = %e, "Failed to prune scheduled messages");
            result.errors += 1;
        }
    }
    match db.prune_notification_log(cutoff).await {
        Ok(n) => result.processed += n as u32,
        Err(e) => {
            tracing::error!(error = %e, "Failed to prune notification log");
            result.errors += 1;
        }
    }

    tracing::info!(deleted = result.processed, %cutoff, "Maintenance complete");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MessageSource, ScheduledMessage};
    use crate::store::{LibSqlBackend, NotificationLogEntry};

    #[tokio::test]
    async fn prunes_old_terminal_rows_only() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let pending = ScheduledMessage::for_user("u", None, "p", Utc::now(), MessageSource::Manual);
        let sent = ScheduledMessage::for_user("u", None, "s", Utc::now(), MessageSource::Manual);
        db.insert_scheduled_message(&pending).await.unwrap();
        db.insert_scheduled_message(&sent).await.unwrap();
        db.mark_message_sent(sent.id, Utc::now()).await.unwrap();
        db.record_notification_log(&NotificationLogEntry::new(
            "u",
            MessageSource::DailyDigest,
            "digest:daily:2026-01-01",
            "body",
            Utc::now(),
        ))
        .await
        .unwrap();

        // Nothing is old enough yet.
        assert_eq!(prune(&db, 30, Utc::now()).await.processed, 0);

        let later = Utc::now() + Duration::days(31);
        let result = prune(&db, 30, later).await;
        assert_eq!((result.processed, result.errors), (2, 0));
        assert!(db.get_scheduled_message(pending.id).await.unwrap().is_some());
    }
}
