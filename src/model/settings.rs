//! Per-user notification preferences (`notification_settings` rows).

use std::collections::BTreeSet;

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use super::message::MessageSource;
use super::reference::AlertKind;
use crate::time::{BusinessClock, QuietHours, weekday_from_index};

/// Periodic digest cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestKind {
    Daily,
    Weekly,
    Monthly,
}

impl DigestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestKind::Daily => "daily",
            DigestKind::Weekly => "weekly",
            DigestKind::Monthly => "monthly",
        }
    }

    pub fn source(&self) -> MessageSource {
        match self {
            DigestKind::Daily => MessageSource::DailyDigest,
            DigestKind::Weekly => MessageSource::WeeklySummary,
            DigestKind::Monthly => MessageSource::MonthlySummary,
        }
    }
}

/// Notification preferences for one subscriber. Read-only for this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserNotificationSettings {
    pub user_id: String,

    pub daily_digest_enabled: bool,
    pub daily_digest_time: NaiveTime,

    pub weekly_summary_enabled: bool,
    pub weekly_summary_time: NaiveTime,
    /// 0 = Sunday .. 6 = Saturday.
    pub weekly_summary_day: u32,

    pub monthly_summary_enabled: bool,
    pub monthly_summary_time: NaiveTime,
    /// Clamped to the month's last day when larger.
    pub monthly_summary_day: u32,

    pub realtime_alerts_enabled: bool,
    pub urgent_alerts_enabled: bool,
    pub deadline_alerts_enabled: bool,
    pub assignment_alerts_enabled: bool,

    pub reminders_enabled: bool,
    /// Lead times in days before a calendar event, e.g. {3, 1, 0}.
    pub reminder_days_before: BTreeSet<u32>,
    pub reminder_time: NaiveTime,

    pub quiet_hours_enabled: bool,
    pub quiet_hours_start: NaiveTime,
    pub quiet_hours_end: NaiveTime,

    /// Business timezone, as minutes east of UTC.
    pub utc_offset_minutes: i32,
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

impl UserNotificationSettings {
    /// Onboarding defaults for a new subscriber.
    pub fn new(user_id: impl Into<String>, utc_offset_minutes: i32) -> Self {
        Self {
            user_id: user_id.into(),
            daily_digest_enabled: true,
            daily_digest_time: hm(8, 0),
            weekly_summary_enabled: true,
            weekly_summary_time: hm(9, 0),
            weekly_summary_day: 1,
            monthly_summary_enabled: true,
            monthly_summary_time: hm(9, 0),
            monthly_summary_day: 1,
            realtime_alerts_enabled: true,
            urgent_alerts_enabled: true,
            deadline_alerts_enabled: true,
            assignment_alerts_enabled: true,
            reminders_enabled: true,
            reminder_days_before: [1, 0].into_iter().collect(),
            reminder_time: hm(9, 0),
            quiet_hours_enabled: false,
            quiet_hours_start: hm(22, 0),
            quiet_hours_end: hm(7, 0),
            utc_offset_minutes,
        }
    }

    pub fn clock(&self) -> BusinessClock {
        BusinessClock::from_offset_minutes(self.utc_offset_minutes)
    }

    pub fn quiet_hours(&self) -> QuietHours {
        QuietHours {
            start: self.quiet_hours_start,
            end: self.quiet_hours_end,
            enabled: self.quiet_hours_enabled,
        }
    }

    pub fn digest_enabled(&self, kind: DigestKind) -> bool {
        match kind {
            DigestKind::Daily => self.daily_digest_enabled,
            DigestKind::Weekly => self.weekly_summary_enabled,
            DigestKind::Monthly => self.monthly_summary_enabled,
        }
    }

    pub fn digest_time(&self, kind: DigestKind) -> NaiveTime {
        match kind {
            DigestKind::Daily => self.daily_digest_time,
            DigestKind::Weekly => self.weekly_summary_time,
            DigestKind::Monthly => self.monthly_summary_time,
        }
    }

    pub fn weekly_weekday(&self) -> Option<Weekday> {
        weekday_from_index(self.weekly_summary_day)
    }

    pub fn alert_enabled(&self, kind: AlertKind) -> bool {
        self.realtime_alerts_enabled
            && match kind {
                AlertKind::Urgent => self.urgent_alerts_enabled,
                AlertKind::Deadline => self.deadline_alerts_enabled,
                AlertKind::Assigned => self.assignment_alerts_enabled,
            }
    }

    /// Whether the subscriber accepts queued messages from `source` at all.
    pub fn accepts(&self, source: MessageSource) -> bool {
        match source {
            MessageSource::CalendarReminder => self.reminders_enabled,
            MessageSource::RealtimeAlert => self.realtime_alerts_enabled,
            MessageSource::DailyDigest => self.daily_digest_enabled,
            MessageSource::WeeklySummary => self.weekly_summary_enabled,
            MessageSource::MonthlySummary => self.monthly_summary_enabled,
            MessageSource::Manual | MessageSource::Dashboard => self.reminders_enabled,
        }
    }

    /// Calendar lookahead: the largest lead time plus one day.
    pub fn reminder_lookahead_days(&self) -> u32 {
        self.reminder_days_before.iter().max().copied().unwrap_or(0) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookahead_is_max_lead_plus_one() {
        let mut settings = UserNotificationSettings::new("u", 0);
        settings.reminder_days_before = [3, 1, 0].into_iter().collect();
        assert_eq!(settings.reminder_lookahead_days(), 4);
        settings.reminder_days_before.clear();
        assert_eq!(settings.reminder_lookahead_days(), 1);
    }

    #[test]
    fn alert_toggles_require_master_switch() {
        let mut settings = UserNotificationSettings::new("u", 0);
        assert!(settings.alert_enabled(AlertKind::Urgent));
        settings.realtime_alerts_enabled = false;
        assert!(!settings.alert_enabled(AlertKind::Urgent));
        settings.realtime_alerts_enabled = true;
        settings.deadline_alerts_enabled = false;
        assert!(!settings.alert_enabled(AlertKind::Deadline));
        assert!(settings.alert_enabled(AlertKind::Assigned));
    }

    #[test]
    fn accepts_follows_source_toggle() {
        let mut settings = UserNotificationSettings::new("u", 0);
        settings.reminders_enabled = false;
        assert!(!settings.accepts(MessageSource::CalendarReminder));
        assert!(!settings.accepts(MessageSource::Manual));
        assert!(settings.accepts(MessageSource::RealtimeAlert));
    }

    #[test]
    fn quiet_hours_reflect_settings() {
        let mut settings = UserNotificationSettings::new("u", 0);
        assert!(!settings.quiet_hours().enabled);
        settings.quiet_hours_enabled = true;
        assert!(settings.quiet_hours().contains(hm(23, 0)));
    }
}
