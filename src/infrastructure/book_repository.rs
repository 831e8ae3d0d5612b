//! Repository for the catalog: books and their price history
//!
//! Provides the read paths consumed by the query services and the
//! write paths used outside the sync transaction (enrichment updates
//! and third-party price observations). The synchronizer's writes run
//! inside its own transaction and do not go through this type.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};

use crate::domain::book::{
    Book, BookSearchCriteria, BookSearchResult, ComparisonCandidate, PriceObservation,
    TRACKED_SOURCE,
};

/// Sort keys accepted by the book listing; anything else falls back to id.
const SORT_COLUMNS: &[(&str, &str)] = &[
    ("title", "title"),
    ("author", "author"),
    ("price", "tracked_price"),
    ("last_updated", "last_updated"),
    ("created_at", "created_at"),
];

/// One day's worth of price history, grouped for the trend series
#[derive(Debug, Clone)]
pub struct PriceTrendRow {
    /// Day in YYYY-MM-DD form
    pub day: String,
    pub avg_tracked: Option<f64>,
    pub min_third_party: Option<f64>,
}

/// Per-day book creation/update counts for the activity series
#[derive(Debug, Clone, Default)]
pub struct DailyBookActivity {
    pub day: String,
    pub books_added: i64,
    pub books_updated: i64,
}

/// Aggregate catalog figures for the dashboard
#[derive(Debug, Clone, Default)]
pub struct CatalogAggregates {
    pub total_books: i64,
    pub total_catalog_value: f64,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub average_price: Option<f64>,
    pub books_missing_authors: i64,
    pub books_missing_urls: i64,
    pub books_missing_prices: i64,
    pub books_without_price_history: i64,
    pub books_complete: i64,
}

#[derive(Clone)]
pub struct BookRepository {
    pool: Arc<SqlitePool>,
}

impl BookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    // ===============================
    // BOOK LOOKUPS
    // ===============================

    pub async fn get_book_by_isbn(&self, isbn: &str) -> Result<Option<Book>> {
        let row = sqlx::query(
            r#"
            SELECT id, isbn, title, author, tracked_price, source_url, row_hash,
                   last_updated, created_at
            FROM books WHERE isbn = ?
            "#,
        )
        .bind(isbn)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(map_book))
    }

    pub async fn get_book_by_id(&self, id: i64) -> Result<Option<Book>> {
        let row = sqlx::query(
            r#"
            SELECT id, isbn, title, author, tracked_price, source_url, row_hash,
                   last_updated, created_at
            FROM books WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(map_book))
    }

    /// Paginated, filtered, sorted book listing.
    ///
    /// `cooldown` scopes the alert_only filter: a book counts as "alerted"
    /// while it has a sent alert younger than the cooldown window.
    pub async fn search_books(
        &self,
        criteria: &BookSearchCriteria,
        cooldown: Duration,
    ) -> Result<BookSearchResult> {
        let mut conditions = Vec::new();
        let mut bind_values = Vec::new();

        if let Some(query) = &criteria.query {
            if !query.is_empty() {
                conditions.push("(title LIKE ? OR author LIKE ? OR isbn LIKE ?)");
                let pattern = format!("%{}%", query);
                bind_values.push(pattern.clone());
                bind_values.push(pattern.clone());
                bind_values.push(pattern);
            }
        }

        // Keep the dated condition last so its bind slots after the strings
        let alert_cutoff = if criteria.alert_only {
            conditions.push(
                "EXISTS (SELECT 1 FROM alerts a WHERE a.book_id = books.id \
                 AND a.status = 'sent' AND a.triggered_at >= ?)",
            );
            Some(Utc::now() - cooldown)
        } else {
            None
        };

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sort_column = criteria
            .sort_by
            .as_deref()
            .and_then(|key| {
                SORT_COLUMNS
                    .iter()
                    .find(|(name, _)| *name == key)
                    .map(|(_, column)| *column)
            })
            .unwrap_or("id");
        let direction = if criteria.descending { "DESC" } else { "ASC" };

        let page = criteria.page.unwrap_or(1).max(1);
        let limit = criteria.limit.unwrap_or(50).clamp(1, 500);
        let offset = (page - 1) * limit;

        let count_query = format!("SELECT COUNT(*) FROM books {}", where_clause);
        let mut count_query_builder = sqlx::query_scalar::<_, i64>(&count_query);
        for value in &bind_values {
            count_query_builder = count_query_builder.bind(value);
        }
        if let Some(cutoff) = alert_cutoff {
            count_query_builder = count_query_builder.bind(cutoff);
        }
        let total_count = count_query_builder.fetch_one(&*self.pool).await?;

        let data_query = format!(
            r#"
            SELECT id, isbn, title, author, tracked_price, source_url, row_hash,
                   last_updated, created_at
            FROM books
            {}
            ORDER BY {} {}, id ASC
            LIMIT ? OFFSET ?
            "#,
            where_clause, sort_column, direction
        );

        let mut data_query_builder = sqlx::query(&data_query);
        for value in &bind_values {
            data_query_builder = data_query_builder.bind(value);
        }
        if let Some(cutoff) = alert_cutoff {
            data_query_builder = data_query_builder.bind(cutoff);
        }
        data_query_builder = data_query_builder.bind(limit).bind(offset);
        let rows = data_query_builder.fetch_all(&*self.pool).await?;

        let books = rows.into_iter().map(map_book).collect();
        let total_pages = (total_count + limit - 1) / limit;

        Ok(BookSearchResult {
            books,
            total_count,
            page,
            limit,
            total_pages,
        })
    }

    // ===============================
    // PRICE HISTORY
    // ===============================

    /// Record one observation. Append-only: rows are never updated.
    pub async fn record_observation(
        &self,
        book_id: i64,
        source: &str,
        price: Option<f64>,
        observed_at: DateTime<Utc>,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO price_history (book_id, source, price, observed_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(book_id)
        .bind(source)
        .bind(price)
        .bind(observed_at)
        .execute(&*self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Price history for one book, newest first, optional source filter.
    pub async fn get_price_history(
        &self,
        book_id: i64,
        source: Option<&str>,
        limit: i64,
    ) -> Result<Vec<PriceObservation>> {
        let rows = match source {
            Some(source) => {
                sqlx::query(
                    r#"
                    SELECT id, book_id, source, price, observed_at
                    FROM price_history
                    WHERE book_id = ? AND source = ?
                    ORDER BY observed_at DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(book_id)
                .bind(source)
                .bind(limit)
                .fetch_all(&*self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, book_id, source, price, observed_at
                    FROM price_history
                    WHERE book_id = ?
                    ORDER BY observed_at DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(book_id)
                .bind(limit)
                .fetch_all(&*self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(map_observation).collect())
    }

    /// Latest third-party observation per (book, source) pair inside the
    /// recency window, joined with the book's current tracked price.
    /// Bare columns alongside MAX() resolve to the max row in SQLite.
    pub async fn get_comparison_candidates(
        &self,
        window: Duration,
    ) -> Result<Vec<ComparisonCandidate>> {
        let cutoff = Utc::now() - window;
        let rows = sqlx::query(
            r#"
            SELECT b.id AS book_id, b.isbn, b.tracked_price,
                   ph.source, ph.price AS competing_price,
                   MAX(ph.observed_at) AS observed_at
            FROM books b
            JOIN price_history ph ON ph.book_id = b.id
            WHERE b.tracked_price IS NOT NULL
              AND ph.source != ?
              AND ph.price IS NOT NULL
              AND ph.observed_at >= ?
            GROUP BY b.id, ph.source
            "#,
        )
        .bind(TRACKED_SOURCE)
        .bind(cutoff)
        .fetch_all(&*self.pool)
        .await?;

        let candidates = rows
            .into_iter()
            .map(|row| ComparisonCandidate {
                book_id: row.get("book_id"),
                isbn: row.get("isbn"),
                tracked_price: row.get("tracked_price"),
                source: row.get("source"),
                competing_price: row.get("competing_price"),
                observed_at: row.get("observed_at"),
            })
            .collect();

        Ok(candidates)
    }

    // ===============================
    // ENRICHMENT SUPPORT
    // ===============================

    /// Books missing author or URL. Never-attempted books come first
    /// (NULL sorts lowest), then the least recently attempted, so a run
    /// of books no provider can match cycles out of the batch instead
    /// of occupying it forever.
    pub async fn get_enrichment_candidates(&self, limit: i64) -> Result<Vec<Book>> {
        let rows = sqlx::query(
            r#"
            SELECT id, isbn, title, author, tracked_price, source_url, row_hash,
                   last_updated, created_at
            FROM books
            WHERE author IS NULL OR source_url IS NULL
            ORDER BY last_enrichment_attempt ASC, last_updated ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(map_book).collect())
    }

    /// Stamp the books selected for an enrichment pass. Runs whatever
    /// the lookups return, so unmatched books move to the back of the
    /// candidate queue.
    pub async fn record_enrichment_attempt(
        &self,
        book_ids: &[i64],
        at: DateTime<Utc>,
    ) -> Result<()> {
        if book_ids.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["?"; book_ids.len()].join(", ");
        let sql =
            format!("UPDATE books SET last_enrichment_attempt = ? WHERE id IN ({placeholders})");

        let mut query = sqlx::query(&sql).bind(at);
        for id in book_ids {
            query = query.bind(*id);
        }
        query.execute(&*self.pool).await?;

        Ok(())
    }

    /// Fill missing descriptive fields. COALESCE keeps any value that is
    /// already present, so enrichment can never overwrite catalog data.
    pub async fn fill_missing_metadata(
        &self,
        book_id: i64,
        author: Option<&str>,
        source_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE books
            SET author = COALESCE(author, ?),
                source_url = COALESCE(source_url, ?),
                last_updated = ?
            WHERE id = ?
            "#,
        )
        .bind(author)
        .bind(source_url)
        .bind(now)
        .bind(book_id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    // ===============================
    // AGGREGATES
    // ===============================

    pub async fn get_catalog_aggregates(&self) -> Result<CatalogAggregates> {
        let total_books =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM books")
                .fetch_one(&*self.pool)
                .await?;

        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(tracked_price), 0.0) AS total_value,
                   MIN(tracked_price) AS min_price,
                   MAX(tracked_price) AS max_price,
                   AVG(tracked_price) AS average_price
            FROM books
            WHERE tracked_price IS NOT NULL
            "#,
        )
        .fetch_one(&*self.pool)
        .await?;

        let books_missing_authors =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM books WHERE author IS NULL")
                .fetch_one(&*self.pool)
                .await?;
        let books_missing_urls =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM books WHERE source_url IS NULL")
                .fetch_one(&*self.pool)
                .await?;
        let books_missing_prices =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM books WHERE tracked_price IS NULL")
                .fetch_one(&*self.pool)
                .await?;
        let books_without_price_history = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM books b
            WHERE NOT EXISTS (SELECT 1 FROM price_history ph WHERE ph.book_id = b.id)
            "#,
        )
        .fetch_one(&*self.pool)
        .await?;
        let books_complete = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM books
            WHERE title IS NOT NULL AND author IS NOT NULL
              AND tracked_price IS NOT NULL AND source_url IS NOT NULL
            "#,
        )
        .fetch_one(&*self.pool)
        .await?;

        Ok(CatalogAggregates {
            total_books,
            total_catalog_value: row.get("total_value"),
            min_price: row.get("min_price"),
            max_price: row.get("max_price"),
            average_price: row.get("average_price"),
            books_missing_authors,
            books_missing_urls,
            books_missing_prices,
            books_without_price_history,
            books_complete,
        })
    }

    /// All non-null tracked prices, for distribution bucketing.
    pub async fn get_tracked_prices(&self) -> Result<Vec<f64>> {
        let prices = sqlx::query_scalar::<_, f64>(
            "SELECT tracked_price FROM books WHERE tracked_price IS NOT NULL",
        )
        .fetch_all(&*self.pool)
        .await?;

        Ok(prices)
    }

    /// Per-day average tracked price and minimum third-party price.
    pub async fn get_price_trend_rows(&self, since: DateTime<Utc>) -> Result<Vec<PriceTrendRow>> {
        let rows = sqlx::query(
            r#"
            SELECT date(observed_at) AS day,
                   AVG(CASE WHEN source = ? THEN price END) AS avg_tracked,
                   MIN(CASE WHEN source != ? THEN price END) AS min_third_party
            FROM price_history
            WHERE observed_at >= ? AND price IS NOT NULL
            GROUP BY date(observed_at)
            ORDER BY day ASC
            "#,
        )
        .bind(TRACKED_SOURCE)
        .bind(TRACKED_SOURCE)
        .bind(since)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PriceTrendRow {
                day: row.get("day"),
                avg_tracked: row.get("avg_tracked"),
                min_third_party: row.get("min_third_party"),
            })
            .collect())
    }

    /// Books last touched before the cutoff (stale catalog entries).
    pub async fn count_stale_books(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM books WHERE last_updated < ?")
                .bind(cutoff)
                .fetch_one(&*self.pool)
                .await?;

        Ok(count)
    }

    /// Bounded list of books with missing fields, for the quality view.
    pub async fn get_books_needing_attention(&self, limit: i64) -> Result<Vec<Book>> {
        let rows = sqlx::query(
            r#"
            SELECT id, isbn, title, author, tracked_price, source_url, row_hash,
                   last_updated, created_at
            FROM books
            WHERE author IS NULL OR source_url IS NULL OR tracked_price IS NULL
            ORDER BY last_updated ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(map_book).collect())
    }

    /// Per-day added/updated book counts since the cutoff. An update on
    /// the creation day counts as an add, not an update.
    pub async fn get_daily_book_activity(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyBookActivity>> {
        let added_rows = sqlx::query(
            r#"
            SELECT date(created_at) AS day, COUNT(*) AS added
            FROM books
            WHERE created_at >= ?
            GROUP BY date(created_at)
            "#,
        )
        .bind(since)
        .fetch_all(&*self.pool)
        .await?;

        let updated_rows = sqlx::query(
            r#"
            SELECT date(last_updated) AS day, COUNT(*) AS updated
            FROM books
            WHERE last_updated >= ? AND date(last_updated) != date(created_at)
            GROUP BY date(last_updated)
            "#,
        )
        .bind(since)
        .fetch_all(&*self.pool)
        .await?;

        let mut by_day: std::collections::BTreeMap<String, DailyBookActivity> =
            std::collections::BTreeMap::new();
        for row in added_rows {
            let day: String = row.get("day");
            let entry = by_day.entry(day.clone()).or_insert_with(|| DailyBookActivity {
                day,
                ..Default::default()
            });
            entry.books_added = row.get("added");
        }
        for row in updated_rows {
            let day: String = row.get("day");
            let entry = by_day.entry(day.clone()).or_insert_with(|| DailyBookActivity {
                day,
                ..Default::default()
            });
            entry.books_updated = row.get("updated");
        }

        Ok(by_day.into_values().collect())
    }
}

fn map_book(row: sqlx::sqlite::SqliteRow) -> Book {
    Book {
        id: row.get("id"),
        isbn: row.get("isbn"),
        title: row.get("title"),
        author: row.get("author"),
        tracked_price: row.get("tracked_price"),
        source_url: row.get("source_url"),
        row_hash: row.get("row_hash"),
        last_updated: row.get("last_updated"),
        created_at: row.get("created_at"),
    }
}

fn map_observation(row: sqlx::sqlite::SqliteRow) -> PriceObservation {
    PriceObservation {
        id: row.get("id"),
        book_id: row.get("book_id"),
        source: row.get("source"),
        price: row.get("price"),
        observed_at: row.get("observed_at"),
    }
}
