//! Business-timezone clock, schedule matching, and quiet-hour windows.
//!
//! Everything user-facing (reminder times, digest times, quiet hours) is a
//! wall-clock value in a single fixed-offset business timezone. Storage is
//! always UTC. `BusinessClock` is the only place that converts between them.

use std::time::Duration;

use chrono::{
    DateTime, Datelike, Days, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    Timelike, Utc, Weekday,
};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Converts between business wall-clock time and UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessClock {
    offset: FixedOffset,
}

impl BusinessClock {
    /// Offsets outside ±24h fall back to UTC.
    pub fn from_offset_minutes(minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| {
            tracing::warn!(minutes, "Invalid UTC offset, falling back to UTC");
            Utc.fix()
        });
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Wall-clock time in the business timezone for a stored instant.
    pub fn local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.offset).naive_local()
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local(instant).date()
    }

    pub fn local_time(&self, instant: DateTime<Utc>) -> NaiveTime {
        self.local(instant).time()
    }

    /// Storage instant for a business wall-clock value.
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let shift = chrono::Duration::seconds(i64::from(self.offset.local_minus_utc()));
        (local - shift).and_utc()
    }

    /// Storage instant for `time` on `date` in the business timezone.
    pub fn at(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        self.to_utc(date.and_time(time))
    }

    /// Storage instant of local midnight starting `date`.
    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        self.at(date, NaiveTime::MIN)
    }

    /// Half-open UTC range covering the local dates `[from, to)`.
    pub fn date_range(&self, from: NaiveDate, to: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.start_of_day(from), self.start_of_day(to))
    }
}

impl Default for BusinessClock {
    fn default() -> Self {
        Self { offset: Utc.fix() }
    }
}

/// Whether `now` falls inside `[target, target + tolerance)`, wrapping at
/// midnight.
///
/// The window is half-open so that with a tolerance equal to the invocation
/// interval exactly one invocation per day matches.
pub fn matches_time(now: NaiveTime, target: NaiveTime, tolerance: Duration) -> bool {
    let now_secs = i64::from(now.num_seconds_from_midnight());
    let target_secs = i64::from(target.num_seconds_from_midnight());
    let elapsed = (now_secs - target_secs).rem_euclid(SECONDS_PER_DAY);
    elapsed < tolerance.as_secs() as i64
}

/// Add whole days to a local wall-clock value.
pub fn add_days(local: NaiveDateTime, days: u64) -> NaiveDateTime {
    local.checked_add_days(Days::new(days)).unwrap_or(local)
}

/// Subtract whole days from a local date.
pub fn sub_days(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_sub_days(Days::new(days)).unwrap_or(date)
}

/// Same day next month, clamped to that month's last day.
pub fn add_one_month(local: NaiveDateTime) -> NaiveDateTime {
    local.checked_add_months(Months::new(1)).unwrap_or(local)
}

/// Number of days in the given month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    let next = first.and_then(|d| d.checked_add_months(Months::new(1)));
    match (first, next) {
        (Some(first), Some(next)) => (next - first).num_days() as u32,
        _ => 31,
    }
}

/// `day` clamped to the last valid day of the month containing `date`.
pub fn clamp_day_of_month(date: NaiveDate, day: u32) -> u32 {
    day.clamp(1, days_in_month(date.year(), date.month()))
}

/// First day of the month before the one containing `date`.
pub fn first_of_previous_month(date: NaiveDate) -> NaiveDate {
    let first = date.with_day(1).unwrap_or(date);
    first.checked_sub_months(Months::new(1)).unwrap_or(first)
}

/// Weekday from the 0 = Sunday .. 6 = Saturday convention used in settings.
pub fn weekday_from_index(index: u32) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

/// Parse `HH:MM` or `HH:MM:SS`.
pub fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

/// Local window during which outbound sends are deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub enabled: bool,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start,
            end,
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            start: NaiveTime::MIN,
            end: NaiveTime::MIN,
            enabled: false,
        }
    }

    /// `[start, end)` when start < end, `[start, 24:00) ∪ [00:00, end)` when
    /// start > end. Equal bounds are an empty window.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if !self.enabled {
            return false;
        }
        if self.start <= self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }

    /// Whether `instant` falls in the window as seen by `clock`.
    pub fn is_quiet_at(&self, clock: &BusinessClock, instant: DateTime<Utc>) -> bool {
        self.contains(clock.local_time(instant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn quiet_hours_wrap_midnight() {
        let quiet = QuietHours::new(t(22, 0), t(7, 0));
        assert!(quiet.contains(t(23, 30)));
        assert!(quiet.contains(t(6, 30)));
        assert!(quiet.contains(t(22, 0)));
        assert!(!quiet.contains(t(7, 1)));
        assert!(!quiet.contains(t(7, 0)));
        assert!(!quiet.contains(t(12, 0)));
    }

    #[test]
    fn quiet_hours_same_day_window() {
        let quiet = QuietHours::new(t(12, 0), t(14, 0));
        assert!(quiet.contains(t(13, 0)));
        assert!(!quiet.contains(t(14, 0)));
        assert!(!quiet.contains(t(11, 59)));
    }

    #[test]
    fn quiet_hours_disabled_never_quiet() {
        let mut quiet = QuietHours::new(t(0, 0), t(23, 59));
        quiet.enabled = false;
        assert!(!quiet.contains(t(10, 0)));
        assert!(!QuietHours::disabled().contains(t(0, 0)));
    }

    #[test]
    fn quiet_hours_equal_bounds_is_empty() {
        let quiet = QuietHours::new(t(8, 0), t(8, 0));
        assert!(!quiet.contains(t(8, 0)));
    }

    #[test]
    fn quiet_hours_evaluated_in_business_time() {
        let clock = BusinessClock::from_offset_minutes(-180);
        let quiet = QuietHours::new(t(22, 0), t(7, 0));
        // 02:30 UTC is 23:30 in UTC-3.
        let instant = d(2026, 2, 10).and_hms_opt(2, 30, 0).unwrap().and_utc();
        assert!(quiet.is_quiet_at(&clock, instant));
        // 10:01 UTC is 07:01 local.
        let instant = d(2026, 2, 10).and_hms_opt(10, 1, 0).unwrap().and_utc();
        assert!(!quiet.is_quiet_at(&clock, instant));
    }

    #[test]
    fn clock_roundtrips_wall_clock() {
        let clock = BusinessClock::from_offset_minutes(-180);
        let utc = clock.at(d(2026, 2, 7), t(9, 0));
        assert_eq!(utc.to_rfc3339(), "2026-02-07T12:00:00+00:00");
        assert_eq!(clock.local(utc), d(2026, 2, 7).and_time(t(9, 0)));
    }

    #[test]
    fn local_date_crosses_midnight() {
        let clock = BusinessClock::from_offset_minutes(-180);
        let instant = d(2026, 2, 11).and_hms_opt(1, 0, 0).unwrap().and_utc();
        assert_eq!(clock.local_date(instant), d(2026, 2, 10));
    }

    #[test]
    fn invalid_offset_falls_back_to_utc() {
        let clock = BusinessClock::from_offset_minutes(i32::MAX);
        assert_eq!(clock.offset().local_minus_utc(), 0);
    }

    #[test]
    fn matches_time_half_open_window() {
        let five = Duration::from_secs(300);
        assert!(matches_time(t(9, 0), t(9, 0), five));
        assert!(matches_time(t(9, 4), t(9, 0), five));
        assert!(!matches_time(t(9, 5), t(9, 0), five));
        assert!(!matches_time(t(8, 59), t(9, 0), five));
    }

    #[test]
    fn matches_time_wraps_midnight() {
        let five = Duration::from_secs(300);
        assert!(matches_time(t(0, 2), t(23, 58), five));
        assert!(!matches_time(t(23, 57), t(23, 58), five));
    }

    #[test]
    fn month_helpers() {
        assert_eq!(days_in_month(2026, 2), 28);
        assert_eq!(days_in_month(2028, 2), 29);
        assert_eq!(days_in_month(2026, 4), 30);
        assert_eq!(days_in_month(2026, 12), 31);
        assert_eq!(clamp_day_of_month(d(2026, 2, 1), 31), 28);
        assert_eq!(first_of_previous_month(d(2026, 3, 15)), d(2026, 2, 1));
        assert_eq!(first_of_previous_month(d(2026, 1, 1)), d(2025, 12, 1));
    }

    #[test]
    fn add_one_month_clamps() {
        let jan31 = d(2026, 1, 31).and_time(t(9, 0));
        assert_eq!(add_one_month(jan31), d(2026, 2, 28).and_time(t(9, 0)));
    }

    #[test]
    fn parse_time_formats() {
        assert_eq!(parse_time_of_day("09:00"), Some(t(9, 0)));
        assert_eq!(parse_time_of_day("21:30:00"), Some(t(21, 30)));
        assert_eq!(parse_time_of_day("nope"), None);
    }

    #[test]
    fn weekday_index_convention() {
        assert_eq!(weekday_from_index(0), Some(Weekday::Sun));
        assert_eq!(weekday_from_index(1), Some(Weekday::Mon));
        assert_eq!(weekday_from_index(7), None);
    }
}
