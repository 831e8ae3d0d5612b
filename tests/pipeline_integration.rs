//! End-to-end pipeline tests: feed file in, alert rows out.
//!
//! Each test drives the real stages against a fresh in-memory store,
//! composing them the way the scheduler does.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use bookwatch::application::{AlertQueries, SyncQueries};
use bookwatch::domain::alert::{AlertStatus, ThresholdPolicy};
use bookwatch::domain::book::TRACKED_SOURCE;
use bookwatch::infrastructure::alert_repository::AlertRepository;
use bookwatch::infrastructure::book_repository::BookRepository;
use bookwatch::infrastructure::config::AlertingConfig;
use bookwatch::infrastructure::sync_repository::SyncRepository;
use bookwatch::pipeline::{
    AlertManager, CatalogSynchronizer, ConsoleNotifier, FeedChange, FeedParser, FeedWatcher,
    PriceComparator,
};
use bookwatch::DatabaseConnection;

const READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

async fn test_pool() -> SqlitePool {
    let connection = DatabaseConnection::new("sqlite::memory:").await.unwrap();
    connection.migrate().await.unwrap();
    connection.pool().clone()
}

async fn write_feed(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("books.csv");
    tokio::fs::write(&path, content).await.unwrap();
    path
}

/// Run the watcher, parser, and synchronizer once, the way a feed
/// cycle does.
async fn run_sync_cycle(pool: &SqlitePool, feed_path: &Path) -> FeedChange {
    let watcher = FeedWatcher::new(feed_path, READ_TIMEOUT);
    let last = SyncRepository::new(pool.clone())
        .get_last_fingerprint()
        .await
        .unwrap();

    let change = watcher.check(last.as_deref()).await.unwrap();
    if let FeedChange::Changed {
        content,
        fingerprint,
    } = &change
    {
        let parsed = FeedParser::new().parse(content).unwrap();
        CatalogSynchronizer::new(pool.clone())
            .synchronize(&parsed, &watcher.filename(), fingerprint)
            .await
            .unwrap();
    }
    change
}

fn alerting(threshold: ThresholdPolicy) -> AlertingConfig {
    AlertingConfig {
        threshold,
        ..AlertingConfig::default()
    }
}

/// Run the comparator and alert manager once against the given policy.
async fn run_alert_cycle(pool: &SqlitePool, threshold: ThresholdPolicy) -> u32 {
    let config = alerting(threshold);
    let drops = PriceComparator::new(BookRepository::new(pool.clone()), &config)
        .compare()
        .await
        .unwrap();
    let outcome = AlertManager::new(
        AlertRepository::new(pool.clone()),
        BookRepository::new(pool.clone()),
        Arc::new(ConsoleNotifier),
        &config,
    )
    .process(&drops)
    .await
    .unwrap();
    outcome.alerts_created
}

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn book_id(pool: &SqlitePool, isbn: &str) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT id FROM books WHERE isbn = ?")
        .bind(isbn)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn rerunning_an_identical_feed_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let feed = write_feed(
        dir.path(),
        "ISBN,Title,Author,Price,URL,Last-Updated\n\
         9780134685991,Effective Java,Joshua Bloch,29.99,https://example.com/ej,2026-01-10\n",
    )
    .await;
    let pool = test_pool().await;

    let first = run_sync_cycle(&pool, &feed).await;
    assert!(matches!(first, FeedChange::Changed { .. }));

    let fingerprint_after_first = SyncQueries::new(SyncRepository::new(pool.clone()))
        .status()
        .await
        .unwrap()
        .last_fingerprint;

    let second = run_sync_cycle(&pool, &feed).await;
    assert_eq!(second, FeedChange::Unchanged);

    let status = SyncQueries::new(SyncRepository::new(pool.clone()))
        .status()
        .await
        .unwrap();
    assert_eq!(status.last_fingerprint, fingerprint_after_first);
    assert_eq!(count(&pool, "sync_history").await, 1);
    assert_eq!(count(&pool, "books").await, 1);
}

#[tokio::test]
async fn only_rows_with_a_valid_isbn_create_books() {
    let dir = tempfile::tempdir().unwrap();
    let feed = write_feed(
        dir.path(),
        "ISBN,Title,Author,Price,URL,Last-Updated\n\
         9780134685991,Effective Java,Joshua Bloch,29.99,,\n\
         12345,Bad ISBN,Nobody,9.99,,\n\
         ,Missing ISBN,Nobody,9.99,,\n\
         978-0-13-468599-1,Duplicate With Dashes,Joshua Bloch,29.99,,\n",
    )
    .await;
    let pool = test_pool().await;

    run_sync_cycle(&pool, &feed).await;

    // the dashed row normalizes to the same ISBN and is an update, not
    // a second book
    assert_eq!(count(&pool, "books").await, 1);
    let isbns = sqlx::query_scalar::<_, String>("SELECT isbn FROM books")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(isbns, vec!["9780134685991"]);

    let defect_count =
        sqlx::query_scalar::<_, i64>("SELECT defect_count FROM sync_history LIMIT 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(defect_count, 2);
}

#[tokio::test]
async fn a_price_change_appends_exactly_one_history_row() {
    let dir = tempfile::tempdir().unwrap();
    let header = "ISBN,Title,Author,Price,URL,Last-Updated\n";
    let feed = write_feed(
        dir.path(),
        &format!("{header}9780134685991,Effective Java,Joshua Bloch,29.99,,\n"),
    )
    .await;
    let pool = test_pool().await;

    run_sync_cycle(&pool, &feed).await;
    let id = book_id(&pool, "9780134685991").await;
    assert_eq!(count(&pool, "price_history").await, 1);

    // price drops in the feed
    write_feed(
        dir.path(),
        &format!("{header}9780134685991,Effective Java,Joshua Bloch,24.99,,\n"),
    )
    .await;
    run_sync_cycle(&pool, &feed).await;

    let history = BookRepository::new(pool.clone())
        .get_price_history(id, Some(TRACKED_SOURCE), 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].price, Some(24.99));

    let tracked =
        sqlx::query_scalar::<_, f64>("SELECT tracked_price FROM books WHERE id = ?")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!((tracked - 24.99).abs() < 1e-9);

    // a title-only change must not touch the history
    write_feed(
        dir.path(),
        &format!("{header}9780134685991,Effective Java 3rd Ed,Joshua Bloch,24.99,,\n"),
    )
    .await;
    run_sync_cycle(&pool, &feed).await;
    assert_eq!(count(&pool, "price_history").await, 2);
}

#[tokio::test]
async fn percentage_threshold_separates_close_prices() {
    let dir = tempfile::tempdir().unwrap();
    let feed = write_feed(
        dir.path(),
        "ISBN,Title,Author,Price,URL,Last-Updated\n\
         9780134685991,Effective Java,Joshua Bloch,30.00,,\n",
    )
    .await;
    let pool = test_pool().await;
    run_sync_cycle(&pool, &feed).await;
    let id = book_id(&pool, "9780134685991").await;
    let books = BookRepository::new(pool.clone());

    // 8.3% below tracked: under the 10% threshold
    books
        .record_observation(id, "alibris", Some(27.50), Utc::now())
        .await
        .unwrap();
    let created = run_alert_cycle(&pool, ThresholdPolicy::Percentage(10.0)).await;
    assert_eq!(created, 0);

    // 13.3% below tracked: crosses it
    books
        .record_observation(id, "alibris", Some(26.00), Utc::now())
        .await
        .unwrap();
    let created = run_alert_cycle(&pool, ThresholdPolicy::Percentage(10.0)).await;
    assert_eq!(created, 1);
}

#[tokio::test]
async fn cooldown_holds_until_it_expires() {
    let dir = tempfile::tempdir().unwrap();
    let feed = write_feed(
        dir.path(),
        "ISBN,Title,Author,Price,URL,Last-Updated\n\
         9780134685991,Effective Java,Joshua Bloch,30.00,,\n",
    )
    .await;
    let pool = test_pool().await;
    run_sync_cycle(&pool, &feed).await;
    let id = book_id(&pool, "9780134685991").await;
    let books = BookRepository::new(pool.clone());

    books
        .record_observation(id, "alibris", Some(24.00), Utc::now())
        .await
        .unwrap();
    assert_eq!(run_alert_cycle(&pool, ThresholdPolicy::Percentage(10.0)).await, 1);

    // second qualifying crossing inside the window is absorbed
    books
        .record_observation(id, "alibris", Some(23.00), Utc::now())
        .await
        .unwrap();
    assert_eq!(run_alert_cycle(&pool, ThresholdPolicy::Percentage(10.0)).await, 0);
    assert_eq!(count(&pool, "alerts").await, 1);

    // age the alert past the cooldown; the next crossing fires again
    let cooldown_hours = AlertingConfig::default().cooldown_hours as i64;
    sqlx::query("UPDATE alerts SET triggered_at = ?")
        .bind(Utc::now() - Duration::hours(cooldown_hours + 1))
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(run_alert_cycle(&pool, ThresholdPolicy::Percentage(10.0)).await, 1);
    assert_eq!(count(&pool, "alerts").await, 2);
}

#[tokio::test]
async fn acknowledging_twice_is_a_no_op() {
    let pool = test_pool().await;
    sqlx::query(
        "INSERT INTO books (isbn, title, tracked_price, last_updated, created_at) VALUES ('9780134685991', 'Effective Java', 29.99, ?, ?)",
    )
    .bind(Utc::now())
    .bind(Utc::now())
    .execute(&pool)
    .await
    .unwrap();
    let id = book_id(&pool, "9780134685991").await;

    let alert_id = AlertRepository::new(pool.clone())
        .insert_alert(
            id,
            &ThresholdPolicy::Absolute(5.0),
            29.99,
            21.00,
            "alibris",
            Utc::now(),
            AlertStatus::Sent,
        )
        .await
        .unwrap();

    let queries = AlertQueries::new(AlertRepository::new(pool.clone()));
    let first = queries.acknowledge(alert_id).await.unwrap().unwrap();
    let second = queries.acknowledge(alert_id).await.unwrap().unwrap();

    assert_eq!(first.status, "acknowledged");
    assert_eq!(second.status, "acknowledged");
    let stored = queries.get(alert_id).await.unwrap().unwrap();
    assert_eq!(stored.status, "acknowledged");
}

#[tokio::test]
async fn a_feed_row_flows_through_to_a_sent_alert() {
    let dir = tempfile::tempdir().unwrap();
    let feed = write_feed(
        dir.path(),
        "ISBN,Title,Author,Price,URL,Last-Updated\n\
         9780134685991,Effective Java,Joshua Bloch,29.99,https://example.com/ej,2026-01-10\n",
    )
    .await;
    let pool = test_pool().await;

    run_sync_cycle(&pool, &feed).await;

    let books = BookRepository::new(pool.clone());
    let book = books
        .get_book_by_isbn("9780134685991")
        .await
        .unwrap()
        .expect("book created from the feed row");
    assert_eq!(book.tracked_price, Some(29.99));

    let tracked_history = books
        .get_price_history(book.id, Some(TRACKED_SOURCE), 10)
        .await
        .unwrap();
    assert_eq!(tracked_history.len(), 1);

    books
        .record_observation(book.id, "alibris", Some(21.00), Utc::now())
        .await
        .unwrap();

    let config = alerting(ThresholdPolicy::Absolute(5.00));
    let drops = PriceComparator::new(books.clone(), &config)
        .compare()
        .await
        .unwrap();
    assert_eq!(drops.len(), 1);
    assert!((drops[0].difference - 8.99).abs() < 1e-9);

    AlertManager::new(
        AlertRepository::new(pool.clone()),
        books,
        Arc::new(ConsoleNotifier),
        &config,
    )
    .process(&drops)
    .await
    .unwrap();

    let statuses = sqlx::query_scalar::<_, String>("SELECT status FROM alerts")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(statuses, vec!["sent"]);
}

#[tokio::test]
async fn enrichment_preserves_feed_values_on_the_next_cycle() {
    // a book enriched between cycles must keep its filled author when
    // the feed row still omits one
    let dir = tempfile::tempdir().unwrap();
    let header = "ISBN,Title,Author,Price,URL,Last-Updated\n";
    let feed = write_feed(
        dir.path(),
        &format!("{header}9780134685991,Effective Java,,29.99,,\n"),
    )
    .await;
    let pool = test_pool().await;
    run_sync_cycle(&pool, &feed).await;

    let books = BookRepository::new(pool.clone());
    let id = book_id(&pool, "9780134685991").await;
    books
        .fill_missing_metadata(id, Some("Joshua Bloch"), None, Utc::now())
        .await
        .unwrap();

    // feed changes the price but still carries no author
    write_feed(
        dir.path(),
        &format!("{header}9780134685991,Effective Java,,24.99,,\n"),
    )
    .await;
    run_sync_cycle(&pool, &feed).await;

    let book = books
        .get_book_by_isbn("9780134685991")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(book.author.as_deref(), Some("Joshua Bloch"));
    assert_eq!(book.tracked_price, Some(24.99));
}
