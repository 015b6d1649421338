//! Preference and quiet-hours gating shared by the queued and direct paths.

use chrono::{DateTime, Utc};

use crate::model::{MessageSource, UserNotificationSettings};

/// How a notification reaches the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// A `scheduled_messages` row picked up by the dispatcher.
    Queued,
    /// Generated and sent in the same invocation (digests).
    Direct,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Queued => "queued",
            DeliveryMode::Direct => "direct",
        }
    }
}

/// A single notification about to be delivered.
#[derive(Debug, Clone, Copy)]
pub struct NotificationRequest<'a> {
    pub source: MessageSource,
    /// Phone number, or group id for group targets.
    pub phone: Option<&'a str>,
    /// `None` for targets without preferences (groups, unknown users).
    pub settings: Option<&'a UserNotificationSettings>,
    pub mode: DeliveryMode,
}

/// Outcome of gating a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Send to this phone now.
    Deliver { phone: String },
    /// Quiet hours: try again on a later invocation.
    Defer,
    /// Never deliverable as addressed. Not an error and never retried.
    Cancel(String),
}

impl<'a> NotificationRequest<'a> {
    pub fn queued(
        source: MessageSource,
        phone: Option<&'a str>,
        settings: Option<&'a UserNotificationSettings>,
    ) -> Self {
        Self {
            source,
            phone,
            settings,
            mode: DeliveryMode::Queued,
        }
    }

    pub fn direct(
        source: MessageSource,
        phone: Option<&'a str>,
        settings: &'a UserNotificationSettings,
    ) -> Self {
        Self {
            source,
            phone,
            settings: Some(settings),
            mode: DeliveryMode::Direct,
        }
    }

    /// Missing phone and disabled preferences cancel; quiet hours defer.
    pub fn evaluate(&self, now: DateTime<Utc>) -> GateDecision {
        let Some(phone) = self.phone.map(str::trim).filter(|p| !p.is_empty()) else {
            return GateDecision::Cancel("no recipient address for target".into());
        };

        if let Some(settings) = self.settings {
            if !settings.accepts(self.source) {
                return GateDecision::Cancel(format!(
                    "{} notifications disabled by user",
                    self.source
                ));
            }
            if settings.quiet_hours().is_quiet_at(&settings.clock(), now) {
                tracing::debug!(
                    user_id = %settings.user_id,
                    mode = self.mode.as_str(),
                    "In quiet hours, deferring"
                );
                return GateDecision::Defer;
            }
        }

        GateDecision::Deliver {
            phone: phone.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn quiet_settings() -> UserNotificationSettings {
        let mut s = UserNotificationSettings::new("user1", -180);
        s.quiet_hours_enabled = true;
        s.quiet_hours_start = NaiveTime::from_hms_opt(22, 0, 0).unwrap();
        s.quiet_hours_end = NaiveTime::from_hms_opt(7, 0, 0).unwrap();
        s
    }

    #[test]
    fn missing_phone_cancels() {
        let settings = quiet_settings();
        let req = NotificationRequest::queued(MessageSource::Manual, Some("  "), Some(&settings));
        assert!(matches!(
            req.evaluate(ts("2026-02-10T15:00:00Z")),
            GateDecision::Cancel(_)
        ));
    }

    #[test]
    fn disabled_source_cancels() {
        let mut settings = quiet_settings();
        settings.reminders_enabled = false;
        let req = NotificationRequest::queued(
            MessageSource::CalendarReminder,
            Some("5511999990000"),
            Some(&settings),
        );
        assert_eq!(
            req.evaluate(ts("2026-02-10T15:00:00Z")),
            GateDecision::Cancel("calendar_reminder notifications disabled by user".into())
        );
    }

    #[test]
    fn quiet_hours_defer_in_both_modes() {
        let settings = quiet_settings();
        // 02:30Z is 23:30 local; 09:30Z is 06:30 local; 10:01Z is 07:01 local.
        for mode in [DeliveryMode::Queued, DeliveryMode::Direct] {
            let req = NotificationRequest {
                source: MessageSource::DailyDigest,
                phone: Some("5511999990000"),
                settings: Some(&settings),
                mode,
            };
            assert_eq!(req.evaluate(ts("2026-02-10T02:30:00Z")), GateDecision::Defer);
            assert_eq!(req.evaluate(ts("2026-02-10T09:30:00Z")), GateDecision::Defer);
            assert!(matches!(
                req.evaluate(ts("2026-02-10T10:01:00Z")),
                GateDecision::Deliver { .. }
            ));
        }
    }

    #[test]
    fn targets_without_settings_only_need_a_phone() {
        let req = NotificationRequest::queued(MessageSource::Manual, Some("5511999990000"), None);
        assert_eq!(
            req.evaluate(ts("2026-02-10T02:30:00Z")),
            GateDecision::Deliver {
                phone: "5511999990000".into()
            }
        );
    }
}
