//! Notify Core: stateless notification scheduling and delivery.

pub mod channels;
pub mod config;
pub mod error;
pub mod generators;
pub mod jobs;
pub mod model;
pub mod server;
pub mod store;
pub mod time;
