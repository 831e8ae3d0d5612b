//! Catalog reconciliation
//!
//! Applies one parsed feed to the store inside a single transaction.
//! The cycle's sync ledger row, including the new feed fingerprint,
//! commits together with the book writes: a failed cycle rolls back
//! completely and the fingerprint never advances, so the same content
//! is retried on the next tick.

use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::domain::book::{NewBookRecord, TRACKED_SOURCE};
use crate::domain::sync::SyncOutcome;
use crate::pipeline::parser::ParsedFeed;
use crate::pipeline::WatchError;

/// Stored fields consulted for change detection
struct StoredBook {
    id: i64,
    title: Option<String>,
    author: Option<String>,
    tracked_price: Option<f64>,
    source_url: Option<String>,
    row_hash: Option<String>,
}

pub struct CatalogSynchronizer {
    pool: SqlitePool,
}

impl CatalogSynchronizer {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Reconcile the parsed feed against the catalog and write the
    /// cycle's ledger row. One transaction for the whole cycle.
    pub async fn synchronize(
        &self,
        feed: &ParsedFeed,
        filename: &str,
        fingerprint: &str,
    ) -> Result<SyncOutcome, WatchError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut outcome = SyncOutcome {
            defects: feed.defects.clone(),
            ..Default::default()
        };

        for record in &feed.records {
            outcome.rows_processed += 1;

            match fetch_stored(&mut tx, &record.isbn).await? {
                None => {
                    insert_book(&mut tx, record, now).await?;
                    outcome.rows_inserted += 1;
                    tracing::debug!("Inserted new book: {}", record.isbn);
                }
                Some(stored) => {
                    if apply_update(&mut tx, &stored, record, now).await? {
                        outcome.rows_updated += 1;
                    }
                }
            }
        }

        sqlx::query(
            r#"
            INSERT INTO sync_history (filename, fingerprint, processed_at,
                                      rows_processed, rows_inserted, rows_updated, defect_count)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(filename)
        .bind(fingerprint)
        .bind(now)
        .bind(outcome.rows_processed as i64)
        .bind(outcome.rows_inserted as i64)
        .bind(outcome.rows_updated as i64)
        .bind(outcome.defects.len() as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Sync completed: {} inserted, {} updated, {} unchanged, {} defects",
            outcome.rows_inserted,
            outcome.rows_updated,
            outcome.rows_unchanged(),
            outcome.defects.len()
        );

        Ok(outcome)
    }
}

async fn fetch_stored(
    tx: &mut Transaction<'_, Sqlite>,
    isbn: &str,
) -> Result<Option<StoredBook>, WatchError> {
    let row = sqlx::query(
        r#"
        SELECT id, title, author, tracked_price, source_url, row_hash
        FROM books WHERE isbn = ?
        "#,
    )
    .bind(isbn)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(|row| StoredBook {
        id: row.get("id"),
        title: row.get("title"),
        author: row.get("author"),
        tracked_price: row.get("tracked_price"),
        source_url: row.get("source_url"),
        row_hash: row.get("row_hash"),
    }))
}

async fn insert_book(
    tx: &mut Transaction<'_, Sqlite>,
    record: &NewBookRecord,
    now: DateTime<Utc>,
) -> Result<(), WatchError> {
    let result = sqlx::query(
        r#"
        INSERT INTO books (isbn, title, author, tracked_price, source_url, row_hash,
                           last_updated, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.isbn)
    .bind(&record.title)
    .bind(&record.author)
    .bind(record.price)
    .bind(&record.url)
    .bind(&record.row_hash)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    append_tracked_price(tx, result.last_insert_rowid(), record.price, now).await
}

/// Compare stored fields with the feed row and apply the narrowest
/// update. A feed row that omits a descriptive field leaves the stored
/// value (possibly enriched) in place; the tracked price is replaced
/// verbatim, null transitions included.
async fn apply_update(
    tx: &mut Transaction<'_, Sqlite>,
    stored: &StoredBook,
    record: &NewBookRecord,
    now: DateTime<Utc>,
) -> Result<bool, WatchError> {
    let price_changed = stored.tracked_price != record.price;
    let title_changed = record.title.is_some() && record.title != stored.title;
    let author_changed = record.author.is_some() && record.author != stored.author;
    let url_changed = record.url.is_some() && record.url != stored.source_url;
    let hash_changed = stored.row_hash.as_deref() != Some(record.row_hash.as_str());

    if !(price_changed || title_changed || author_changed || url_changed || hash_changed) {
        return Ok(false);
    }

    sqlx::query(
        r#"
        UPDATE books
        SET title = COALESCE(?, title),
            author = COALESCE(?, author),
            source_url = COALESCE(?, source_url),
            tracked_price = ?,
            row_hash = ?,
            last_updated = ?
        WHERE id = ?
        "#,
    )
    .bind(&record.title)
    .bind(&record.author)
    .bind(&record.url)
    .bind(record.price)
    .bind(&record.row_hash)
    .bind(now)
    .bind(stored.id)
    .execute(&mut **tx)
    .await?;

    if price_changed {
        append_tracked_price(tx, stored.id, record.price, now).await?;
        tracing::info!(
            "Price changed for {}: {:?} -> {:?}",
            record.isbn,
            stored.tracked_price,
            record.price
        );
    }

    Ok(true)
}

async fn append_tracked_price(
    tx: &mut Transaction<'_, Sqlite>,
    book_id: i64,
    price: Option<f64>,
    now: DateTime<Utc>,
) -> Result<(), WatchError> {
    sqlx::query(
        r#"
        INSERT INTO price_history (book_id, source, price, observed_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(book_id)
    .bind(TRACKED_SOURCE)
    .bind(price)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
