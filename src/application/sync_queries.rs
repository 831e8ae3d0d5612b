//! Sync status and history views

use anyhow::Result;

use crate::application::dto::{SyncHistoryDto, SyncHistoryPageDto};
use crate::domain::sync::SyncStatus;
use crate::infrastructure::sync_repository::SyncRepository;

pub struct SyncQueries {
    repository: SyncRepository,
}

impl SyncQueries {
    pub fn new(repository: SyncRepository) -> Self {
        Self { repository }
    }

    /// Current status derived from the latest ledger row; all fields
    /// are None before the first completed cycle.
    pub async fn status(&self) -> Result<SyncStatus> {
        let latest = self.repository.get_latest().await?;
        Ok(latest.map(SyncStatus::from).unwrap_or_default())
    }

    /// Paginated cycle history, newest first.
    pub async fn history(&self, page: i64, limit: i64) -> Result<SyncHistoryPageDto> {
        let page = page.max(1);
        let limit = limit.clamp(1, 500);
        let (entries, total_count) = self.repository.list_history(page, limit).await?;
        let total_pages = (total_count + limit - 1) / limit;

        Ok(SyncHistoryPageDto {
            entries: entries.into_iter().map(SyncHistoryDto::from).collect(),
            total_count,
            page,
            limit,
            total_pages,
        })
    }
}
