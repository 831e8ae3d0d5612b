//! Sync cycle bookkeeping: per-cycle counters, the audit ledger row,
//! and the derived status view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A feed row the parser had to exclude
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowDefect {
    /// 1-based data row number, not counting the header.
    pub row_number: u32,
    pub reason: String,
}

impl RowDefect {
    pub fn new(row_number: u32, reason: impl Into<String>) -> Self {
        Self {
            row_number,
            reason: reason.into(),
        }
    }
}

/// Counters for one completed sync cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub rows_processed: u32,
    pub rows_inserted: u32,
    pub rows_updated: u32,
    pub defects: Vec<RowDefect>,
}

impl SyncOutcome {
    /// Unchanged rows are processed but neither inserted nor updated.
    pub fn rows_unchanged(&self) -> u32 {
        self.rows_processed
            .saturating_sub(self.rows_inserted + self.rows_updated)
    }
}

/// One persisted ledger entry per completed sync cycle
///
/// The latest row doubles as the watcher's "last accepted fingerprint":
/// a cycle that aborts never writes its row, so the same feed content is
/// picked up again on the next tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncHistory {
    pub id: i64,
    pub filename: String,
    pub fingerprint: String,
    pub processed_at: DateTime<Utc>,
    pub rows_processed: i64,
    pub rows_inserted: i64,
    pub rows_updated: i64,
    pub defect_count: i64,
}

/// Derived "last sync" view served to the query boundary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    pub last_sync_time: Option<DateTime<Utc>>,
    pub last_fingerprint: Option<String>,
    pub filename: Option<String>,
    pub rows_processed: Option<i64>,
    pub rows_inserted: Option<i64>,
    pub rows_updated: Option<i64>,
}

impl From<SyncHistory> for SyncStatus {
    fn from(entry: SyncHistory) -> Self {
        Self {
            last_sync_time: Some(entry.processed_at),
            last_fingerprint: Some(entry.fingerprint),
            filename: Some(entry.filename),
            rows_processed: Some(entry.rows_processed),
            rows_inserted: Some(entry.rows_inserted),
            rows_updated: Some(entry.rows_updated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_rows_fall_out_of_the_counters() {
        let outcome = SyncOutcome {
            rows_processed: 10,
            rows_inserted: 3,
            rows_updated: 2,
            defects: vec![RowDefect::new(4, "missing ISBN")],
        };
        assert_eq!(outcome.rows_unchanged(), 5);
    }

    #[test]
    fn sync_status_reflects_the_latest_ledger_entry() {
        let entry = SyncHistory {
            id: 7,
            filename: "books.csv".to_string(),
            fingerprint: "abc123".to_string(),
            processed_at: Utc::now(),
            rows_processed: 12,
            rows_inserted: 1,
            rows_updated: 2,
            defect_count: 0,
        };
        let status = SyncStatus::from(entry.clone());
        assert_eq!(status.last_fingerprint.as_deref(), Some("abc123"));
        assert_eq!(status.rows_processed, Some(12));
        assert_eq!(status.last_sync_time, Some(entry.processed_at));
    }
}
