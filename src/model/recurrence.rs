//! Recurrence rules for queued messages.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::time::{add_days, add_one_month};

/// How a queued message repeats after a successful send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    #[default]
    None,
    Daily,
    Weekdays,
    Weekly,
    Monthly,
}

impl Recurrence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recurrence::None => "none",
            Recurrence::Daily => "daily",
            Recurrence::Weekdays => "weekdays",
            Recurrence::Weekly => "weekly",
            Recurrence::Monthly => "monthly",
        }
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self, Recurrence::None)
    }

    /// Next local wall-clock occurrence after `local`, or `None` for a
    /// one-shot message.
    pub fn next_occurrence(&self, local: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Recurrence::None => None,
            Recurrence::Daily => Some(add_days(local, 1)),
            Recurrence::Weekdays => {
                let next = add_days(local, 1);
                Some(match next.weekday() {
                    Weekday::Sat => add_days(next, 2),
                    Weekday::Sun => add_days(next, 1),
                    _ => next,
                })
            }
            Recurrence::Weekly => Some(add_days(local, 7)),
            Recurrence::Monthly => Some(add_one_month(local)),
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recurrence {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "none" => Ok(Recurrence::None),
            "daily" => Ok(Recurrence::Daily),
            "weekdays" => Ok(Recurrence::Weekdays),
            "weekly" => Ok(Recurrence::Weekly),
            "monthly" => Ok(Recurrence::Monthly),
            other => Err(format!("unknown recurrence: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn none_has_no_successor() {
        assert_eq!(Recurrence::None.next_occurrence(at(2026, 2, 6, 9)), None);
    }

    #[test]
    fn daily_adds_one_day() {
        assert_eq!(
            Recurrence::Daily.next_occurrence(at(2026, 2, 28, 9)),
            Some(at(2026, 3, 1, 9))
        );
    }

    #[test]
    fn weekdays_skip_weekend() {
        // 2026-02-06 is a Friday.
        assert_eq!(
            Recurrence::Weekdays.next_occurrence(at(2026, 2, 6, 9)),
            Some(at(2026, 2, 9, 9))
        );
        // Saturday rolls to Monday too.
        assert_eq!(
            Recurrence::Weekdays.next_occurrence(at(2026, 2, 7, 9)),
            Some(at(2026, 2, 9, 9))
        );
        // Tuesday -> Wednesday.
        assert_eq!(
            Recurrence::Weekdays.next_occurrence(at(2026, 2, 10, 9)),
            Some(at(2026, 2, 11, 9))
        );
    }

    #[test]
    fn weekly_adds_seven_days() {
        assert_eq!(
            Recurrence::Weekly.next_occurrence(at(2026, 12, 28, 18)),
            Some(at(2027, 1, 4, 18))
        );
    }

    #[test]
    fn monthly_clamps_to_month_end() {
        assert_eq!(
            Recurrence::Monthly.next_occurrence(at(2026, 1, 31, 9)),
            Some(at(2026, 2, 28, 9))
        );
        assert_eq!(
            Recurrence::Monthly.next_occurrence(at(2026, 3, 31, 9)),
            Some(at(2026, 4, 30, 9))
        );
        assert_eq!(
            Recurrence::Monthly.next_occurrence(at(2026, 12, 15, 9)),
            Some(at(2027, 1, 15, 9))
        );
    }

    #[test]
    fn parse_and_display() {
        for r in [
            Recurrence::None,
            Recurrence::Daily,
            Recurrence::Weekdays,
            Recurrence::Weekly,
            Recurrence::Monthly,
        ] {
            assert_eq!(r.to_string().parse::<Recurrence>().unwrap(), r);
        }
        assert!("hourly".parse::<Recurrence>().is_err());
    }
}
