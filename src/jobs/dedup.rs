//! Dedup guard: at most one active row per (source, reference).

use std::sync::Arc;

use crate::error::DatabaseError;
use crate::model::{MessageSource, ScheduledMessage, SourceReference};
use crate::store::Database;

/// What happened to an enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Inserted,
    /// A pending or sent row with the same key already exists.
    Duplicate,
}

/// Inserts candidates unless an equivalent notification is pending or sent.
///
/// The read is a fast path. The partial unique index on
/// `(source, source_reference)` catches the race between two overlapping runs,
/// and that hit is reported as a duplicate as well.
#[derive(Clone)]
pub struct DedupGuard {
    db: Arc<dyn Database>,
}

impl DedupGuard {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// True when no pending or sent row carries this key.
    pub async fn should_create(
        &self,
        source: MessageSource,
        reference: &SourceReference,
    ) -> Result<bool, DatabaseError> {
        Ok(!self.db.has_active_reference(source, reference).await?)
    }

    /// Check, then insert as pending.
    pub async fn enqueue(&self, candidate: &ScheduledMessage) -> Result<EnqueueOutcome, DatabaseError> {
        if let Some(reference) = &candidate.source_reference
            && !self.should_create(candidate.source, reference).await?
        {
            tracing::debug!(
                source = %candidate.source,
                reference = %reference,
                "Dedup hit, candidate skipped"
            );
            return Ok(EnqueueOutcome::Duplicate);
        }

        if self.db.insert_scheduled_message(candidate).await? {
            tracing::info!(
                message_id = %candidate.id,
                source = %candidate.source,
                scheduled_for = %candidate.scheduled_for,
                "Notification enqueued"
            );
            Ok(EnqueueOutcome::Inserted)
        } else {
            tracing::debug!(
                message_id = %candidate.id,
                "Insert ignored by unique reference index"
            );
            Ok(EnqueueOutcome::Duplicate)
        }
    }
}
