use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source tag for price history rows mirroring the feed's tracked price.
/// Third-party observations carry their own tag ("amazon", "ebay", ...).
pub const TRACKED_SOURCE: &str = "tracked";

/// A catalog entry keyed by ISBN
///
/// The ISBN is immutable once the row exists. Every other field is
/// nullable and updated independently: the synchronizer owns title,
/// price and the row hash, the enricher fills author and URL when
/// they are missing. Books are never deleted; a title dropping out of
/// the feed simply stops receiving updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub isbn: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub tracked_price: Option<f64>,
    pub source_url: Option<String>,
    /// Content hash of the feed row that last touched this book,
    /// used by the synchronizer to skip unchanged rows cheaply.
    pub row_hash: Option<String>,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A validated feed row, ready for catalog reconciliation
///
/// Produced by the parser; carries no database identity yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBookRecord {
    pub isbn: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub price: Option<f64>,
    pub url: Option<String>,
    /// The feed's own Last-Updated column, when it parses. Advisory only.
    pub feed_updated: Option<DateTime<Utc>>,
    /// Hash over the row's identifying content (isbn|price|title).
    pub row_hash: String,
}

/// One append-only price observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceObservation {
    pub id: i64,
    pub book_id: i64,
    pub source: String,
    pub price: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

/// Descriptive fields returned by a metadata provider lookup
///
/// Providers never return prices; enrichment is metadata-only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub url: Option<String>,
}

impl BookMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.author.is_none() && self.url.is_none()
    }
}

/// A (book, source) pair eligible for threshold evaluation: the catalog
/// price joined with the most recent third-party observation from one
/// source inside the recency window.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonCandidate {
    pub book_id: i64,
    pub isbn: String,
    pub tracked_price: f64,
    pub source: String,
    pub competing_price: f64,
    pub observed_at: DateTime<Utc>,
}

/// Search and filter criteria for the book listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookSearchCriteria {
    /// Case-insensitive substring match over title, author, and ISBN
    pub query: Option<String>,
    /// One of: title, author, price, last_updated, created_at
    pub sort_by: Option<String>,
    pub descending: bool,
    /// Only books with a sent alert inside the cooldown window
    pub alert_only: bool,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Search results with pagination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSearchResult {
    pub books: Vec<Book>,
    pub total_count: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_metadata_offers_nothing() {
        assert!(BookMetadata::default().is_empty());
        assert!(!BookMetadata {
            author: Some("Joshua Bloch".to_string()),
            ..Default::default()
        }
        .is_empty());
    }
}
