//! # Watch Pipeline Module
//!
//! The six stages that take a feed file to delivered alerts:
//! watcher, parser, synchronizer, enricher, comparator, alert manager,
//! driven by the scheduler. Each stage is its own file; the error
//! taxonomy shared by all of them lives here so callers can branch on
//! failure class instead of string matching.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod alert_manager;
pub mod comparator;
pub mod enricher;
pub mod notifier;
pub mod parser;
pub mod scheduler;
pub mod synchronizer;
pub mod watcher;

// Clean re-exports
pub use alert_manager::{AlertManager, AlertCycleOutcome};
pub use comparator::{PriceComparator, PriceDrop};
pub use enricher::{EnrichmentOutcome, MetadataEnricher};
pub use notifier::{ConsoleNotifier, Notifier};
pub use parser::{FeedParser, ParsedFeed};
pub use scheduler::{Scheduler, SchedulerHandle};
pub use synchronizer::CatalogSynchronizer;
pub use watcher::{FeedChange, FeedWatcher};

/// Pipeline error taxonomy
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum WatchError {
    #[error("Feed unavailable: {0}")]
    FeedUnavailable(String),

    #[error("Feed malformed: {0}")]
    FeedMalformed(String),

    #[error("Store operation failed: {0}")]
    Store(String),

    #[error("Metadata provider failed: {0}")]
    Provider(String),

    #[error("Alert dispatch failed: {0}")]
    Dispatch(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<sqlx::Error> for WatchError {
    fn from(error: sqlx::Error) -> Self {
        Self::Store(error.to_string())
    }
}

// Repository plumbing reports through anyhow; inside the pipeline that
// always means the store layer.
impl From<anyhow::Error> for WatchError {
    fn from(error: anyhow::Error) -> Self {
        Self::Store(error.to_string())
    }
}

impl From<crate::infrastructure::metadata_providers::ProviderError> for WatchError {
    fn from(error: crate::infrastructure::metadata_providers::ProviderError) -> Self {
        Self::Provider(error.to_string())
    }
}
