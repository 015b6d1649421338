//! Persistence layer: libSQL-backed queue, settings, and read models.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, NotificationLogEntry};
