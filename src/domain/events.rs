//! Progress vocabulary for cycle logging
//!
//! The scheduler reports where a cycle is and how it ended through
//! these enums; they exist so log lines and any future event surface
//! share one spelling of the stage names.

use serde::{Deserialize, Serialize};

/// The stage a running cycle is currently in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CycleStage {
    /// Waiting for the next tick.
    Idle,
    /// Reading and fingerprinting the feed.
    FeedCheck,
    /// Turning feed bytes into validated records.
    Parse,
    /// Reconciling records against the catalog.
    Sync,
    /// Filling missing metadata from providers.
    Enrich,
    /// Evaluating third-party observations against the threshold.
    Compare,
    /// Creating and dispatching alerts.
    Alert,
}

impl std::fmt::Display for CycleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::FeedCheck => "feed-check",
            Self::Parse => "parse",
            Self::Sync => "sync",
            Self::Enrich => "enrich",
            Self::Compare => "compare",
            Self::Alert => "alert",
        };
        write!(f, "{name}")
    }
}

/// How a cycle ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CycleStatus {
    /// Feed fingerprint unchanged, nothing to do.
    Unchanged,
    /// Cycle ran to completion.
    Completed,
    /// Feed unavailable or malformed; will retry next tick.
    Skipped,
    /// Store or pipeline failure; nothing committed.
    Error,
}

impl std::fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unchanged => "unchanged",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Error => "error",
        };
        write!(f, "{name}")
    }
}
