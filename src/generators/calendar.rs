//! Calendar event reminders.

use chrono::{DateTime, Days, Utc};

use super::{format_local_date, format_local_time};
use crate::model::{
    CalendarEvent, EventStatus, SourceReference, UserNotificationSettings, UserProfile,
};

/// One reminder to enqueue.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderCandidate {
    pub event_id: String,
    pub days_before: u32,
    pub scheduled_for: DateTime<Utc>,
    pub reference: SourceReference,
    pub content: String,
}

/// End of the event lookahead: local midnight after `today + lookahead days`.
pub fn reminder_horizon(settings: &UserNotificationSettings, now: DateTime<Utc>) -> DateTime<Utc> {
    let clock = settings.clock();
    let today = clock.local_date(now);
    let last = today
        .checked_add_days(Days::new(u64::from(settings.reminder_lookahead_days()) + 1))
        .unwrap_or(today);
    clock.start_of_day(last)
}

/// Reminders for every (event, lead day) pair whose send time is still ahead.
///
/// The send time is `reminder_time` on the event's local date minus the lead
/// days. Candidates already in the past at `now`, or that would land after the
/// event starts, are dropped. Events outside `(now, horizon)` and events that
/// are not scheduled produce nothing.
pub fn calendar_reminders(
    profile: &UserProfile,
    settings: &UserNotificationSettings,
    events: &[CalendarEvent],
    now: DateTime<Utc>,
) -> Vec<ReminderCandidate> {
    let clock = settings.clock();
    let horizon = reminder_horizon(settings, now);

    let mut candidates = Vec::new();
    for event in events {
        if event.status != EventStatus::Scheduled
            || event.start_time <= now
            || event.start_time >= horizon
        {
            continue;
        }
        let event_date = clock.local_date(event.start_time);

        for &days_before in &settings.reminder_days_before {
            let Some(send_date) = event_date.checked_sub_days(Days::new(u64::from(days_before)))
            else {
                continue;
            };
            let scheduled_for = clock.at(send_date, settings.reminder_time);
            if scheduled_for < now || scheduled_for >= event.start_time {
                tracing::debug!(
                    event_id = %event.id,
                    days_before,
                    %scheduled_for,
                    "Dropping reminder outside the sendable window"
                );
                continue;
            }

            candidates.push(ReminderCandidate {
                event_id: event.id.clone(),
                days_before,
                scheduled_for,
                reference: SourceReference::calendar(event.id.clone(), days_before),
                content: render_reminder(profile, event, days_before, &clock),
            });
        }
    }
    candidates.sort_by_key(|c| c.scheduled_for);
    candidates
}

fn lead_phrase(days_before: u32) -> String {
    match days_before {
        0 => "today".into(),
        1 => "tomorrow".into(),
        n => format!("in {n} days"),
    }
}

fn render_reminder(
    profile: &UserProfile,
    event: &CalendarEvent,
    days_before: u32,
    clock: &crate::time::BusinessClock,
) -> String {
    let local = clock.local(event.start_time);
    let mut text = format!(
        "📅 Hi {}! Reminder: *{}* is {} ({}) at {}.",
        profile.first_name(),
        event.title,
        lead_phrase(days_before),
        format_local_date(local),
        format_local_time(local),
    );
    if let Some(location) = event.location.as_deref().filter(|l| !l.trim().is_empty()) {
        text.push_str(&format!("\n📍 {location}"));
    }
    text
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn profile() -> UserProfile {
        UserProfile {
            user_id: "user1".into(),
            display_name: "Ana Souza".into(),
            phone: Some("5511999990000".into()),
            active: true,
        }
    }

    fn settings(leads: &[u32]) -> UserNotificationSettings {
        let mut s = UserNotificationSettings::new("user1", -180);
        s.reminder_days_before = leads.iter().copied().collect();
        s.reminder_time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        s
    }

    fn live_performance() -> CalendarEvent {
        CalendarEvent {
            id: "evt-42".into(),
            user_id: "user1".into(),
            title: "Live performance".into(),
            start_time: ts("2026-02-10T20:00:00Z"),
            location: Some("Main stage".into()),
            status: EventStatus::Scheduled,
            content_type: Some("live".into()),
        }
    }

    #[test]
    fn computes_local_send_times() {
        let now = ts("2026-02-06T15:00:00Z");
        let out = calendar_reminders(&profile(), &settings(&[3, 1]), &[live_performance()], now);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].reference.to_string(), "cal:evt-42:d-3");
        assert_eq!(out[0].scheduled_for, ts("2026-02-07T12:00:00Z"));
        assert_eq!(out[1].reference.to_string(), "cal:evt-42:d-1");
        assert_eq!(out[1].scheduled_for, ts("2026-02-09T12:00:00Z"));
    }

    #[test]
    fn past_send_times_are_discarded() {
        // d-3 would have been 2026-02-07T12:00Z.
        let now = ts("2026-02-08T00:00:00Z");
        let out = calendar_reminders(&profile(), &settings(&[3, 1]), &[live_performance()], now);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].days_before, 1);
        assert!(out.iter().all(|c| c.scheduled_for >= now));
    }

    #[test]
    fn same_day_reminder_after_start_is_dropped() {
        let mut event = live_performance();
        // 08:00 local, before the 09:00 reminder time.
        event.start_time = ts("2026-02-10T11:00:00Z");
        let now = ts("2026-02-09T20:00:00Z");
        let out = calendar_reminders(&profile(), &settings(&[0]), &[event], now);
        assert!(out.is_empty());
    }

    #[test]
    fn events_beyond_lookahead_or_cancelled_are_ignored() {
        let now = ts("2026-02-01T12:00:00Z");
        let out = calendar_reminders(&profile(), &settings(&[3, 1]), &[live_performance()], now);
        assert!(out.is_empty(), "event is more than 4 days out");

        let mut cancelled = live_performance();
        cancelled.status = EventStatus::Cancelled;
        let now = ts("2026-02-08T15:00:00Z");
        assert!(calendar_reminders(&profile(), &settings(&[1]), &[cancelled], now).is_empty());
    }

    #[test]
    fn content_names_event_time_and_place() {
        let now = ts("2026-02-08T15:00:00Z");
        let out = calendar_reminders(&profile(), &settings(&[1]), &[live_performance()], now);
        let text = &out[0].content;
        assert!(text.contains("Hi Ana!"));
        assert!(text.contains("Live performance"));
        assert!(text.contains("tomorrow"));
        assert!(text.contains("17:00"), "20:00Z is 17:00 in UTC-3: {text}");
        assert!(text.contains("Main stage"));
    }

    #[test]
    fn horizon_covers_whole_local_days() {
        // 12:00 local on 02-06 with leads {3,1}: events through local 02-10.
        let now = ts("2026-02-06T15:00:00Z");
        assert_eq!(
            reminder_horizon(&settings(&[3, 1]), now),
            ts("2026-02-11T03:00:00Z")
        );
    }

    #[test]
    fn lead_phrases() {
        assert_eq!(lead_phrase(0), "today");
        assert_eq!(lead_phrase(1), "tomorrow");
        assert_eq!(lead_phrase(3), "in 3 days");
    }
}
