//! Recurrence expander: enqueue the next link after a confirmed send.

use chrono::{DateTime, Utc};

use super::dedup::{DedupGuard, EnqueueOutcome};
use crate::error::DatabaseError;
use crate::model::ScheduledMessage;
use crate::time::BusinessClock;

/// Upper bound on occurrences skipped to catch up with `now`.
const MAX_CATCH_UP_STEPS: usize = 1000;

/// Next send instant for a message that was just sent.
///
/// The step is taken on the message's intended local wall-clock time, so a
/// daily 09:00 message stays at 09:00 local. Occurrences that are already in
/// the past at `now` are skipped; successors are never scheduled retroactively.
pub fn next_scheduled_for(
    msg: &ScheduledMessage,
    clock: &BusinessClock,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let mut local = clock.local(msg.scheduled_for);
    for _ in 0..MAX_CATCH_UP_STEPS {
        local = msg.recurrence.next_occurrence(local)?;
        let next = clock.to_utc(local);
        if next >= now {
            return Some(next);
        }
    }
    None
}

/// Creates successor links in recurrence chains.
#[derive(Clone)]
pub struct RecurrenceExpander {
    dedup: DedupGuard,
}

impl RecurrenceExpander {
    pub fn new(dedup: DedupGuard) -> Self {
        Self { dedup }
    }

    /// Enqueue the successor of `sent`. Only call after a confirmed transition
    /// to `sent`. Returns `None` for non-recurring messages or when this link
    /// was already expanded.
    pub async fn expand(
        &self,
        sent: &ScheduledMessage,
        clock: &BusinessClock,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduledMessage>, DatabaseError> {
        let Some(next_at) = next_scheduled_for(sent, clock, now) else {
            return Ok(None);
        };

        let successor = sent.successor(next_at);
        match self.dedup.enqueue(&successor).await? {
            EnqueueOutcome::Inserted => {
                tracing::info!(
                    parent_id = %sent.id,
                    message_id = %successor.id,
                    recurrence = %sent.recurrence,
                    scheduled_for = %next_at,
                    "Recurrence expanded"
                );
                Ok(Some(successor))
            }
            EnqueueOutcome::Duplicate => Ok(None),
        }
    }
}
