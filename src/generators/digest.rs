//! Daily digest, weekly summary and monthly summary.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use super::format_local_time;
use crate::model::{
    CalendarEvent, Card, CardPriority, DigestKind, EventStatus, KanbanColumn, UserProfile,
};
use crate::time::{BusinessClock, first_of_previous_month, sub_days};

/// Local date range a digest reports on, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestPeriod {
    pub kind: DigestKind,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DigestPeriod {
    /// The completed period a digest sent on `today` covers.
    ///
    /// Daily is yesterday. Weekly is the seven days before today, so a Monday
    /// run covers the previous Monday through Sunday. Monthly is the previous
    /// calendar month.
    pub fn resolve(kind: DigestKind, today: NaiveDate) -> Self {
        let (start, end) = match kind {
            DigestKind::Daily => (sub_days(today, 1), today),
            DigestKind::Weekly => (sub_days(today, 7), today),
            DigestKind::Monthly => (
                first_of_previous_month(today),
                today.with_day(1).unwrap_or(today),
            ),
        };
        Self { kind, start, end }
    }

    /// Stable key for the period: the start date, or `YYYY-MM` for months.
    pub fn key(&self) -> String {
        match self.kind {
            DigestKind::Monthly => self.start.format("%Y-%m").to_string(),
            DigestKind::Daily | DigestKind::Weekly => self.start.format("%Y-%m-%d").to_string(),
        }
    }

    /// Audit-log reference, e.g. `digest:weekly:2026-02-02`.
    pub fn reference(&self) -> String {
        format!("digest:{}:{}", self.kind.as_str(), self.key())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    fn label(&self) -> String {
        match self.kind {
            DigestKind::Daily => self.start.format("%d/%m").to_string(),
            DigestKind::Weekly => {
                let last = self.end.pred_opt().unwrap_or(self.end);
                format!("{} to {}", self.start.format("%d/%m"), last.format("%d/%m"))
            }
            DigestKind::Monthly => self.start.format("%B %Y").to_string(),
        }
    }

    fn noun(&self) -> &'static str {
        match self.kind {
            DigestKind::Daily => "day",
            DigestKind::Weekly => "week",
            DigestKind::Monthly => "month",
        }
    }
}

/// Aggregates over a digest period.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestMetrics {
    pub cards_created: usize,
    pub cards_published: usize,
    /// Non-cancelled events starting in the period.
    pub events_scheduled: usize,
    pub events_completed: usize,
    /// Current board snapshot.
    pub columns: BTreeMap<KanbanColumn, usize>,
    pub urgent_open: usize,
    pub overdue: usize,
    /// Most frequent content type among the period's cards and events.
    pub top_content_type: Option<(String, usize)>,
}

impl DigestMetrics {
    pub fn compute(
        period: &DigestPeriod,
        clock: &BusinessClock,
        today: NaiveDate,
        cards: &[Card],
        events: &[CalendarEvent],
    ) -> Self {
        let mut metrics = Self::default();
        let mut content_types: BTreeMap<&str, usize> = BTreeMap::new();

        for card in cards {
            *metrics.columns.entry(card.column).or_default() += 1;

            if period.contains(clock.local_date(card.created_at)) {
                metrics.cards_created += 1;
                if let Some(ct) = card.content_type.as_deref() {
                    *content_types.entry(ct).or_default() += 1;
                }
            }
            if card
                .published_at
                .is_some_and(|at| period.contains(clock.local_date(at)))
            {
                metrics.cards_published += 1;
            }
            if !card.column.is_terminal() && card.priority == CardPriority::Urgent {
                metrics.urgent_open += 1;
            }
            if card.is_overdue(today) {
                metrics.overdue += 1;
            }
        }

        for event in events {
            if event.status == EventStatus::Cancelled
                || !period.contains(clock.local_date(event.start_time))
            {
                continue;
            }
            metrics.events_scheduled += 1;
            if event.status == EventStatus::Completed {
                metrics.events_completed += 1;
            }
            if let Some(ct) = event.content_type.as_deref() {
                *content_types.entry(ct).or_default() += 1;
            }
        }

        // Ties go to the alphabetically first type.
        metrics.top_content_type = content_types
            .into_iter()
            .fold(None, |best: Option<(&str, usize)>, (ct, n)| match best {
                Some((_, top)) if top >= n => best,
                _ => Some((ct, n)),
            })
            .map(|(ct, n)| (ct.to_string(), n));

        metrics
    }

    /// Completed share of scheduled events, as a rounded percentage.
    pub fn completion_rate(&self) -> Option<usize> {
        if self.events_scheduled == 0 {
            return None;
        }
        Some((self.events_completed * 100 + self.events_scheduled / 2) / self.events_scheduled)
    }
}

/// Render a digest. `agenda` lists today's events and is only shown daily.
pub fn render_digest(
    profile: &UserProfile,
    period: &DigestPeriod,
    metrics: &DigestMetrics,
    agenda: &[CalendarEvent],
    clock: &BusinessClock,
) -> String {
    let name = profile.first_name();
    let mut lines = vec![match period.kind {
        DigestKind::Daily => format!(
            "☀️ Good morning, {name}! Here's your daily digest for {}.",
            period.label()
        ),
        DigestKind::Weekly => format!("📈 Hi {name}! Your weekly summary ({}).", period.label()),
        DigestKind::Monthly => {
            format!("🗓️ Hi {name}! Your monthly summary for {}.", period.label())
        }
    }];

    lines.push(String::new());
    lines.push("📊 *Production*".into());
    lines.push(format!("• Cards created: {}", metrics.cards_created));
    lines.push(format!("• Cards published: {}", metrics.cards_published));
    match metrics.completion_rate() {
        Some(rate) => lines.push(format!(
            "• Events completed: {}/{} ({rate}%)",
            metrics.events_completed, metrics.events_scheduled
        )),
        None => lines.push("• No events in this period".into()),
    }

    lines.push(String::new());
    lines.push("🗂️ *Board*".into());
    let populated: Vec<String> = KanbanColumn::ALL
        .iter()
        .filter_map(|col| {
            let n = metrics.columns.get(col).copied().unwrap_or(0);
            (n > 0).then(|| format!("• {}: {n}", col.label()))
        })
        .collect();
    if populated.is_empty() {
        lines.push("• The board is empty".into());
    } else {
        lines.extend(populated);
    }

    lines.push(String::new());
    lines.push("⚠️ *Attention*".into());
    if metrics.urgent_open == 0 && metrics.overdue == 0 {
        lines.push("• Nothing urgent or overdue 🎉".into());
    } else {
        lines.push(format!("• Urgent cards: {}", metrics.urgent_open));
        lines.push(format!("• Overdue cards: {}", metrics.overdue));
    }

    if period.kind == DigestKind::Daily {
        lines.push(String::new());
        lines.push("📅 *Today*".into());
        if agenda.is_empty() {
            lines.push("• Nothing scheduled".into());
        }
        for event in agenda {
            let mut line = format!(
                "• {} {}",
                format_local_time(clock.local(event.start_time)),
                event.title
            );
            if let Some(location) = event.location.as_deref().filter(|l| !l.trim().is_empty()) {
                line.push_str(&format!(" ({location})"));
            }
            lines.push(line);
        }
    }

    lines.push(String::new());
    lines.push(insight_line(period, metrics));
    lines.join("\n")
}

fn insight_line(period: &DigestPeriod, metrics: &DigestMetrics) -> String {
    match &metrics.top_content_type {
        Some((content_type, n)) => format!(
            "💡 Your focus this {} was *{content_type}* ({n} {}). Keep it up!",
            period.noun(),
            if *n == 1 { "item" } else { "items" }
        ),
        None => format!(
            "💡 No content type stood out this {}. A good moment to plan what comes next.",
            period.noun()
        ),
    }
}
