//! Response shapes for the query boundary
//!
//! Timestamps cross the boundary as RFC 3339 strings; day-granular
//! series use plain `YYYY-MM-DD` keys.

use serde::{Deserialize, Serialize};

use crate::domain::alert::{Alert, AlertSearchResult};
use crate::domain::book::{Book, BookSearchResult, PriceObservation};
use crate::domain::sync::SyncHistory;

// ============================================================================
// Book DTOs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookDto {
    pub id: i64,
    pub isbn: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub tracked_price: Option<f64>,
    pub source_url: Option<String>,
    pub last_updated: String,
    pub created_at: String,
}

impl From<Book> for BookDto {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            isbn: book.isbn,
            title: book.title,
            author: book.author,
            tracked_price: book.tracked_price,
            source_url: book.source_url,
            last_updated: book.last_updated.to_rfc3339(),
            created_at: book.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookPageDto {
    pub books: Vec<BookDto>,
    pub total_count: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl From<BookSearchResult> for BookPageDto {
    fn from(result: BookSearchResult) -> Self {
        Self {
            books: result.books.into_iter().map(BookDto::from).collect(),
            total_count: result.total_count,
            page: result.page,
            limit: result.limit,
            total_pages: result.total_pages,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceObservationDto {
    pub id: i64,
    pub book_id: i64,
    pub source: String,
    pub price: Option<f64>,
    pub observed_at: String,
}

impl From<PriceObservation> for PriceObservationDto {
    fn from(observation: PriceObservation) -> Self {
        Self {
            id: observation.id,
            book_id: observation.book_id,
            source: observation.source,
            price: observation.price,
            observed_at: observation.observed_at.to_rfc3339(),
        }
    }
}

// ============================================================================
// Alert DTOs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDto {
    pub id: i64,
    pub book_id: i64,
    pub threshold_type: String,
    pub threshold_value: f64,
    pub tracked_price: f64,
    pub competing_price: f64,
    pub competing_source: String,
    pub difference: f64,
    pub triggered_at: String,
    pub status: String,
}

impl From<Alert> for AlertDto {
    fn from(alert: Alert) -> Self {
        Self {
            id: alert.id,
            book_id: alert.book_id,
            threshold_type: alert.policy.type_name().to_string(),
            threshold_value: alert.policy.value(),
            tracked_price: alert.tracked_price,
            competing_price: alert.competing_price,
            difference: alert.delta(),
            competing_source: alert.competing_source,
            triggered_at: alert.triggered_at.to_rfc3339(),
            status: alert.status.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPageDto {
    pub alerts: Vec<AlertDto>,
    pub total_count: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl From<AlertSearchResult> for AlertPageDto {
    fn from(result: AlertSearchResult) -> Self {
        Self {
            alerts: result.alerts.into_iter().map(AlertDto::from).collect(),
            total_count: result.total_count,
            page: result.page,
            limit: result.limit,
            total_pages: result.total_pages,
        }
    }
}

// ============================================================================
// Statistics DTOs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_books: i64,
    pub active_alerts: i64,
    pub average_price_difference: Option<f64>,
    pub total_savings_opportunity: Option<f64>,
    pub books_with_alerts: i64,
    pub total_catalog_value: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub average_price: Option<f64>,
    pub books_missing_authors: i64,
    pub books_missing_urls: i64,
    pub books_without_price_history: i64,
    pub data_completeness_percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTrendPoint {
    /// Day key, `YYYY-MM-DD`.
    pub date: String,
    pub tracked_price: Option<f64>,
    pub third_party_price: Option<f64>,
    pub difference: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBucket {
    pub range: String,
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceDistribution {
    pub buckets: Vec<PriceBucket>,
    pub total_books: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonStats {
    pub total_comparisons: i64,
    pub tracked_cheaper: i64,
    pub third_party_cheaper: i64,
    pub average_difference: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQuality {
    pub total_books: i64,
    pub books_missing_authors: i64,
    pub books_missing_urls: i64,
    pub books_missing_prices: i64,
    pub books_without_price_history: i64,
    pub books_stale: i64,
    pub data_completeness_percentage: f64,
    pub books_needing_attention: Vec<BookDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPoint {
    /// Day key, `YYYY-MM-DD`.
    pub date: String,
    pub books_added: i64,
    pub books_updated: i64,
    pub total_changes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentActivity {
    pub activity: Vec<ActivityPoint>,
    pub date_from: String,
    pub date_to: String,
}

// ============================================================================
// Sync DTOs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncHistoryDto {
    pub id: i64,
    pub filename: String,
    pub fingerprint: String,
    pub processed_at: String,
    pub rows_processed: i64,
    pub rows_inserted: i64,
    pub rows_updated: i64,
    pub defect_count: i64,
}

impl From<SyncHistory> for SyncHistoryDto {
    fn from(entry: SyncHistory) -> Self {
        Self {
            id: entry.id,
            filename: entry.filename,
            fingerprint: entry.fingerprint,
            processed_at: entry.processed_at.to_rfc3339(),
            rows_processed: entry.rows_processed,
            rows_inserted: entry.rows_inserted,
            rows_updated: entry.rows_updated,
            defect_count: entry.defect_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncHistoryPageDto {
    pub entries: Vec<SyncHistoryDto>,
    pub total_count: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}
