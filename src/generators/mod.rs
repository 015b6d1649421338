//! Content generators: pure functions from loaded business data to text.
//!
//! Nothing here touches the store or the channel, so a generated candidate
//! can be thrown away (dedup hit, past send time) without side effects.

pub mod alerts;
pub mod calendar;
pub mod digest;

use chrono::NaiveDateTime;

pub use alerts::{AlertCandidate, realtime_alerts};
pub use calendar::{ReminderCandidate, calendar_reminders, reminder_horizon};
pub use digest::{DigestMetrics, DigestPeriod, render_digest};

fn format_local_time(local: NaiveDateTime) -> String {
    local.format("%H:%M").to_string()
}

fn format_local_date(local: NaiveDateTime) -> String {
    local.format("%d/%m").to_string()
}
