//! Domain module - Core business types and state machines
//!
//! This module contains the catalog entities, the alert state machine,
//! and the sync bookkeeping types shared by the pipeline and the
//! read-side query services.
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod alert;
pub mod book;
pub mod events;
pub mod sync;

// Re-export commonly used items for convenience
pub use alert::{
    Alert, AlertSearchCriteria, AlertSearchResult, AlertStatus, InvalidTransition, ThresholdPolicy,
};
pub use book::{
    Book, BookMetadata, BookSearchCriteria, BookSearchResult, ComparisonCandidate, NewBookRecord,
    PriceObservation, TRACKED_SOURCE,
};
pub use events::{CycleStage, CycleStatus};
pub use sync::{RowDefect, SyncHistory, SyncOutcome, SyncStatus};
