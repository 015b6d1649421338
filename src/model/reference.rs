//! Deterministic dedup keys.
//!
//! A `SourceReference` names one logical notification occurrence. It is built
//! only from immutable entity identifiers and the notification variant, so the
//! same occurrence always produces the same key across invocations.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Condition that produced a realtime alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Card has urgent priority.
    Urgent,
    /// Card is due today or tomorrow.
    Deadline,
    /// Card was recently assigned to the subscriber.
    Assigned,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Urgent => "urgent",
            AlertKind::Deadline => "deadline",
            AlertKind::Assigned => "assigned",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "urgent" => Ok(AlertKind::Urgent),
            "deadline" => Ok(AlertKind::Deadline),
            "assigned" => Ok(AlertKind::Assigned),
            other => Err(format!("unknown alert kind: {other}")),
        }
    }
}

/// Typed dedup key with a closed string grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceReference {
    /// `cal:{event_id}:d-{days_before}`
    Calendar { event_id: String, days_before: u32 },
    /// `alert:{kind}:{card_id}:{YYYY-MM-DD}`
    Alert {
        kind: AlertKind,
        card_id: String,
        date: NaiveDate,
    },
    /// `recur:{parent_id}`, one successor per chain link.
    Recurrence { parent_id: Uuid },
    /// `manual:{token}` for externally authored messages.
    Manual(String),
}

impl SourceReference {
    pub fn calendar(event_id: impl Into<String>, days_before: u32) -> Self {
        SourceReference::Calendar {
            event_id: event_id.into(),
            days_before,
        }
    }

    pub fn alert(kind: AlertKind, card_id: impl Into<String>, date: NaiveDate) -> Self {
        SourceReference::Alert {
            kind,
            card_id: card_id.into(),
            date,
        }
    }
}

impl fmt::Display for SourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceReference::Calendar {
                event_id,
                days_before,
            } => write!(f, "cal:{event_id}:d-{days_before}"),
            SourceReference::Alert {
                kind,
                card_id,
                date,
            } => write!(f, "alert:{kind}:{card_id}:{}", date.format("%Y-%m-%d")),
            SourceReference::Recurrence { parent_id } => write!(f, "recur:{parent_id}"),
            SourceReference::Manual(token) => write!(f, "manual:{token}"),
        }
    }
}

impl FromStr for SourceReference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("cal:") {
            let (event_id, days) = rest
                .rsplit_once(":d-")
                .ok_or_else(|| format!("calendar reference missing lead days: {s}"))?;
            if event_id.is_empty() {
                return Err(format!("calendar reference missing event id: {s}"));
            }
            let days_before = days
                .parse()
                .map_err(|e| format!("invalid lead days in {s}: {e}"))?;
            return Ok(SourceReference::calendar(event_id, days_before));
        }

        if let Some(rest) = s.strip_prefix("alert:") {
            let (kind, rest) = rest
                .split_once(':')
                .ok_or_else(|| format!("alert reference missing kind: {s}"))?;
            let (card_id, date) = rest
                .rsplit_once(':')
                .ok_or_else(|| format!("alert reference missing date: {s}"))?;
            if card_id.is_empty() {
                return Err(format!("alert reference missing card id: {s}"));
            }
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|e| format!("invalid alert date in {s}: {e}"))?;
            return Ok(SourceReference::alert(kind.parse()?, card_id, date));
        }

        if let Some(rest) = s.strip_prefix("recur:") {
            let parent_id = rest
                .parse()
                .map_err(|e| format!("invalid recurrence parent in {s}: {e}"))?;
            return Ok(SourceReference::Recurrence { parent_id });
        }

        if let Some(rest) = s.strip_prefix("manual:")
            && !rest.is_empty()
        {
            return Ok(SourceReference::Manual(rest.to_string()));
        }

        Err(format!("unrecognized source reference: {s}"))
    }
}

impl Serialize for SourceReference {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SourceReference {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calendar_reference_format() {
        let r = SourceReference::calendar("evt-42", 3);
        assert_eq!(r.to_string(), "cal:evt-42:d-3");
        assert_eq!("cal:evt-42:d-3".parse::<SourceReference>().unwrap(), r);
    }

    #[test]
    fn alert_reference_format() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        let r = SourceReference::alert(AlertKind::Deadline, "card-7", date);
        assert_eq!(r.to_string(), "alert:deadline:card-7:2026-02-10");
        assert_eq!(r.to_string().parse::<SourceReference>().unwrap(), r);
    }

    #[test]
    fn recurrence_reference_parses_uuid() {
        let parent_id = Uuid::new_v4();
        let s = format!("recur:{parent_id}");
        assert_eq!(
            s.parse::<SourceReference>().unwrap(),
            SourceReference::Recurrence { parent_id }
        );
        assert!("recur:not-a-uuid".parse::<SourceReference>().is_err());
    }

    #[test]
    fn rejects_unknown_or_incomplete() {
        for bad in [
            "",
            "cal:",
            "cal:evt",
            "cal::d-1",
            "cal:evt:d-x",
            "alert:urgent:card",
            "alert:loud:card:2026-01-01",
            "manual:",
            "something:else",
        ] {
            assert!(bad.parse::<SourceReference>().is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn serde_uses_string_form() {
        let r = SourceReference::Manual("weekly-standup".into());
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, "\"manual:weekly-standup\"");
        let back: SourceReference = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
