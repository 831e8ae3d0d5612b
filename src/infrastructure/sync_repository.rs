//! Read access to the feed synchronization audit trail
//!
//! Rows are written by the synchronizer inside its cycle transaction;
//! this repository only reads them back for status and history views.

use std::sync::Arc;

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::domain::sync::SyncHistory;

#[derive(Clone)]
pub struct SyncRepository {
    pool: Arc<SqlitePool>,
}

impl SyncRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Most recent sync run, if any cycle has completed.
    pub async fn get_latest(&self) -> Result<Option<SyncHistory>> {
        let row = sqlx::query(
            r#"
            SELECT id, filename, fingerprint, processed_at,
                   rows_processed, rows_inserted, rows_updated, defect_count
            FROM sync_history
            ORDER BY processed_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(map_history))
    }

    /// Fingerprint of the last synchronized feed. The watcher compares
    /// against this to decide whether the feed changed.
    pub async fn get_last_fingerprint(&self) -> Result<Option<String>> {
        let fingerprint = sqlx::query_scalar::<_, String>(
            r#"
            SELECT fingerprint FROM sync_history
            ORDER BY processed_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&*self.pool)
        .await?;

        Ok(fingerprint)
    }

    /// Paginated sync history, newest first.
    pub async fn list_history(&self, page: i64, limit: i64) -> Result<(Vec<SyncHistory>, i64)> {
        let page = page.max(1);
        let limit = limit.clamp(1, 500);
        let offset = (page - 1) * limit;

        let total_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sync_history")
            .fetch_one(&*self.pool)
            .await?;

        let rows = sqlx::query(
            r#"
            SELECT id, filename, fingerprint, processed_at,
                   rows_processed, rows_inserted, rows_updated, defect_count
            FROM sync_history
            ORDER BY processed_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.pool)
        .await?;

        Ok((rows.into_iter().map(map_history).collect(), total_count))
    }
}

fn map_history(row: sqlx::sqlite::SqliteRow) -> SyncHistory {
    SyncHistory {
        id: row.get("id"),
        filename: row.get("filename"),
        fingerprint: row.get("fingerprint"),
        processed_at: row.get("processed_at"),
        rows_processed: row.get("rows_processed"),
        rows_inserted: row.get("rows_inserted"),
        rows_updated: row.get("rows_updated"),
        defect_count: row.get("defect_count"),
    }
}
