//! Domain types shared by the store, generators and jobs.

pub mod business;
pub mod message;
pub mod recurrence;
pub mod reference;
pub mod settings;

pub use business::{CalendarEvent, Card, CardPriority, EventStatus, KanbanColumn, UserProfile};
pub use message::{MessageSource, MessageStatus, ScheduledMessage, TargetType};
pub use recurrence::Recurrence;
pub use reference::{AlertKind, SourceReference};
pub use settings::{DigestKind, UserNotificationSettings};
