//! Book listing and lookup services

use anyhow::Result;
use chrono::Duration;

use crate::application::dto::{BookDto, BookPageDto, PriceObservationDto};
use crate::domain::book::BookSearchCriteria;
use crate::infrastructure::book_repository::BookRepository;
use crate::infrastructure::config::AlertingConfig;

const DEFAULT_HISTORY_LIMIT: i64 = 100;

pub struct BookQueries {
    repository: BookRepository,
    /// Window behind the "has active alert" filter.
    cooldown: Duration,
}

impl BookQueries {
    pub fn new(repository: BookRepository, config: &AlertingConfig) -> Self {
        Self {
            repository,
            cooldown: Duration::hours(config.cooldown_hours as i64),
        }
    }

    /// Paginated listing with search, sort, and the active-alert filter.
    pub async fn list(&self, criteria: &BookSearchCriteria) -> Result<BookPageDto> {
        let result = self.repository.search_books(criteria, self.cooldown).await?;
        Ok(BookPageDto::from(result))
    }

    pub async fn get_by_isbn(&self, isbn: &str) -> Result<Option<BookDto>> {
        let book = self.repository.get_book_by_isbn(isbn).await?;
        Ok(book.map(BookDto::from))
    }

    /// Price history for one book, newest observations first.
    pub async fn price_history(
        &self,
        book_id: i64,
        source: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<PriceObservationDto>> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 1_000);
        let history = self
            .repository
            .get_price_history(book_id, source, limit)
            .await?;
        Ok(history.into_iter().map(PriceObservationDto::from).collect())
    }
}
