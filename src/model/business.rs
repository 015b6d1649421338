//! Read-only business entities supplied by the external stores.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A subscriber's profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: String,
    pub phone: Option<String>,
    pub active: bool,
}

impl UserProfile {
    /// First name for greetings.
    pub fn first_name(&self) -> &str {
        self.display_name
            .split_whitespace()
            .next()
            .unwrap_or(&self.display_name)
    }

    /// Phone number if present and non-blank.
    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Scheduled => "scheduled",
            EventStatus::Completed => "completed",
            EventStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for EventStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(EventStatus::Scheduled),
            "completed" => Ok(EventStatus::Completed),
            "cancelled" => Ok(EventStatus::Cancelled),
            other => Err(format!("unknown event status: {other}")),
        }
    }
}

/// A calendar entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub location: Option<String>,
    pub status: EventStatus,
    pub content_type: Option<String>,
}

/// Kanban column of a work-item card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KanbanColumn {
    Ideas,
    Todo,
    InProgress,
    Review,
    Scheduled,
    Published,
    Archived,
}

impl KanbanColumn {
    pub const ALL: [KanbanColumn; 7] = [
        KanbanColumn::Ideas,
        KanbanColumn::Todo,
        KanbanColumn::InProgress,
        KanbanColumn::Review,
        KanbanColumn::Scheduled,
        KanbanColumn::Published,
        KanbanColumn::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KanbanColumn::Ideas => "ideas",
            KanbanColumn::Todo => "todo",
            KanbanColumn::InProgress => "in_progress",
            KanbanColumn::Review => "review",
            KanbanColumn::Scheduled => "scheduled",
            KanbanColumn::Published => "published",
            KanbanColumn::Archived => "archived",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            KanbanColumn::Ideas => "Ideas",
            KanbanColumn::Todo => "To do",
            KanbanColumn::InProgress => "In progress",
            KanbanColumn::Review => "Review",
            KanbanColumn::Scheduled => "Scheduled",
            KanbanColumn::Published => "Published",
            KanbanColumn::Archived => "Archived",
        }
    }

    /// Cards here no longer need attention.
    pub fn is_terminal(&self) -> bool {
        matches!(self, KanbanColumn::Published | KanbanColumn::Archived)
    }
}

impl fmt::Display for KanbanColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KanbanColumn {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KanbanColumn::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown kanban column: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl CardPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardPriority::Low => "low",
            CardPriority::Medium => "medium",
            CardPriority::High => "high",
            CardPriority::Urgent => "urgent",
        }
    }
}

impl FromStr for CardPriority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(CardPriority::Low),
            "medium" => Ok(CardPriority::Medium),
            "high" => Ok(CardPriority::High),
            "urgent" => Ok(CardPriority::Urgent),
            other => Err(format!("unknown card priority: {other}")),
        }
    }
}

/// A work-item card on the kanban board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub title: String,
    pub column: KanbanColumn,
    pub priority: CardPriority,
    /// Due date as a business-local calendar date.
    pub due_date: Option<NaiveDate>,
    pub assigned_to: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Card {
    /// Overdue relative to the business-local `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.column.is_terminal() && self.due_date.is_some_and(|due| due < today)
    }
}
