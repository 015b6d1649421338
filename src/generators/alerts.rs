//! Realtime card alerts.

use chrono::{DateTime, Duration, Utc};

use crate::model::{AlertKind, Card, CardPriority, SourceReference, UserNotificationSettings};

/// Window in which an assignment still counts as new.
const ASSIGNMENT_WINDOW_HOURS: i64 = 24;

/// One alert to enqueue for immediate delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertCandidate {
    pub kind: AlertKind,
    pub card_id: String,
    pub reference: SourceReference,
    pub content: String,
}

/// Alerts for urgent cards, cards due today or tomorrow, and cards assigned to
/// the subscriber in the last 24 hours.
///
/// Cards in terminal columns never alert. Kinds the subscriber switched off are
/// not generated. References carry the local date, so a condition alerts at
/// most once per day.
pub fn realtime_alerts(
    settings: &UserNotificationSettings,
    cards: &[Card],
    now: DateTime<Utc>,
) -> Vec<AlertCandidate> {
    let clock = settings.clock();
    let today = clock.local_date(now);
    let assigned_since = now - Duration::hours(ASSIGNMENT_WINDOW_HOURS);

    let mut out = Vec::new();
    for card in cards.iter().filter(|c| !c.column.is_terminal()) {
        let mut push = |kind: AlertKind, content: String| {
            if settings.alert_enabled(kind) {
                out.push(AlertCandidate {
                    kind,
                    card_id: card.id.clone(),
                    reference: SourceReference::alert(kind, card.id.clone(), today),
                    content,
                });
            }
        };

        if card.priority == CardPriority::Urgent {
            push(
                AlertKind::Urgent,
                format!(
                    "🚨 Urgent card: *{}* ({}) needs attention.",
                    card.title,
                    card.column.label()
                ),
            );
        }

        if let Some(due) = card.due_date {
            let days_left = (due - today).num_days();
            if (0..=1).contains(&days_left) {
                let when = if days_left == 0 { "today" } else { "tomorrow" };
                push(
                    AlertKind::Deadline,
                    format!(
                        "⏰ Deadline: *{}* is due {when} ({}).",
                        card.title,
                        due.format("%d/%m")
                    ),
                );
            }
        }

        let newly_assigned = card.assigned_to.as_deref() == Some(settings.user_id.as_str())
            && card
                .assigned_at
                .is_some_and(|at| at > assigned_since && at <= now);
        if newly_assigned {
            push(
                AlertKind::Assigned,
                format!(
                    "👋 You were assigned *{}* ({}).",
                    card.title,
                    card.column.label()
                ),
            );
        }
    }
    out
}
