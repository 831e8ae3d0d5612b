//! BookWatch - Book Price Drop Watcher
//!
//! Keeps a SQLite catalog in sync with an externally maintained CSV price
//! feed, enriches incomplete records from public metadata APIs, and raises
//! deduplicated alerts when a third-party price undercuts the tracked price
//! by a configured margin.

// Module declarations
pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod pipeline;

// Re-export the top-level wiring types for easier access
pub use infrastructure::config::{ConfigManager, WatcherConfig};
pub use infrastructure::database_connection::DatabaseConnection;
pub use pipeline::scheduler::{Scheduler, SchedulerHandle};
