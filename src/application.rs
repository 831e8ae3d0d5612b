//! # Application Layer Module
//!
//! Read-side services consumed by a presentation layer. They translate
//! query criteria into repository calls and domain records into
//! response DTOs; the pipeline never goes through this layer.

pub mod alert_queries;
pub mod book_queries;
pub mod dto;
pub mod stats_queries;
pub mod sync_queries;

// Clean re-exports
pub use alert_queries::AlertQueries;
pub use book_queries::BookQueries;
pub use stats_queries::StatsQueries;
pub use sync_queries::SyncQueries;
