//! Price comparison
//!
//! Pairs each tracked price with the latest third-party observation
//! per source and evaluates the configured threshold policy. Only
//! observations inside the recency window take part; a drop below the
//! threshold is not reported at all.

use chrono::{DateTime, Duration, Utc};

use crate::domain::alert::ThresholdPolicy;
use crate::infrastructure::book_repository::BookRepository;
use crate::infrastructure::config::AlertingConfig;
use crate::pipeline::WatchError;

/// One threshold crossing found during a comparison pass
#[derive(Debug, Clone, PartialEq)]
pub struct PriceDrop {
    pub book_id: i64,
    pub isbn: String,
    pub tracked_price: f64,
    pub competing_price: f64,
    pub competing_source: String,
    pub observed_at: DateTime<Utc>,
    /// Positive saving against the tracked price
    pub difference: f64,
    /// Saving as a percentage of the tracked price
    pub percentage: f64,
}

pub struct PriceComparator {
    repository: BookRepository,
    threshold: ThresholdPolicy,
    recency_window: Duration,
}

impl PriceComparator {
    pub fn new(repository: BookRepository, config: &AlertingConfig) -> Self {
        Self {
            repository,
            threshold: config.threshold,
            recency_window: Duration::hours(config.recency_window_hours as i64),
        }
    }

    /// One comparison pass over the whole catalog.
    pub async fn compare(&self) -> Result<Vec<PriceDrop>, WatchError> {
        let candidates = self
            .repository
            .get_comparison_candidates(self.recency_window)
            .await?;

        let mut drops = Vec::new();
        for candidate in candidates {
            let difference = candidate.tracked_price - candidate.competing_price;
            if !self.threshold.is_crossed(candidate.tracked_price, difference) {
                continue;
            }

            let percentage = if candidate.tracked_price > 0.0 {
                (difference / candidate.tracked_price) * 100.0
            } else {
                0.0
            };

            tracing::debug!(
                "Price drop for {}: {:.2} -> {:.2} at {} ({:.1}%)",
                candidate.isbn,
                candidate.tracked_price,
                candidate.competing_price,
                candidate.source,
                percentage
            );

            drops.push(PriceDrop {
                book_id: candidate.book_id,
                isbn: candidate.isbn,
                tracked_price: candidate.tracked_price,
                competing_price: candidate.competing_price,
                competing_source: candidate.source,
                observed_at: candidate.observed_at,
                difference,
                percentage,
            });
        }

        if !drops.is_empty() {
            tracing::info!("Comparison pass found {} price drop(s)", drops.len());
        }

        Ok(drops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use sqlx::SqlitePool;

    async fn test_pool() -> SqlitePool {
        let connection = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        connection.migrate().await.unwrap();
        connection.pool().clone()
    }

    async fn insert_book(pool: &SqlitePool, isbn: &str, tracked_price: Option<f64>) -> i64 {
        let result = sqlx::query(
            r#"
            INSERT INTO books (isbn, title, tracked_price, last_updated, created_at)
            VALUES (?, 'Title', ?, ?, ?)
            "#,
        )
        .bind(isbn)
        .bind(tracked_price)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(pool)
        .await
        .unwrap();
        result.last_insert_rowid()
    }

    async fn insert_observation(
        pool: &SqlitePool,
        book_id: i64,
        source: &str,
        price: f64,
        observed_at: DateTime<Utc>,
    ) {
        sqlx::query(
            "INSERT INTO price_history (book_id, source, price, observed_at) VALUES (?, ?, ?, ?)",
        )
        .bind(book_id)
        .bind(source)
        .bind(price)
        .bind(observed_at)
        .execute(pool)
        .await
        .unwrap();
    }

    fn comparator(pool: &SqlitePool, threshold: ThresholdPolicy) -> PriceComparator {
        let config = AlertingConfig {
            threshold,
            ..AlertingConfig::default()
        };
        PriceComparator::new(BookRepository::new(pool.clone()), &config)
    }

    #[tokio::test]
    async fn percentage_threshold_crossing_is_reported() {
        let pool = test_pool().await;
        let book_id = insert_book(&pool, "9780134685991", Some(30.0)).await;
        insert_observation(&pool, book_id, "alibris", 26.0, Utc::now()).await;

        let drops = comparator(&pool, ThresholdPolicy::Percentage(10.0))
            .compare()
            .await
            .unwrap();

        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].competing_source, "alibris");
        assert!((drops[0].difference - 4.0).abs() < 1e-9);
        assert!((drops[0].percentage - 13.333333333333334).abs() < 1e-9);
    }

    #[tokio::test]
    async fn drop_below_percentage_threshold_is_silent() {
        let pool = test_pool().await;
        let book_id = insert_book(&pool, "9780134685991", Some(30.0)).await;
        insert_observation(&pool, book_id, "alibris", 27.5, Utc::now()).await;

        let drops = comparator(&pool, ThresholdPolicy::Percentage(10.0))
            .compare()
            .await
            .unwrap();

        assert!(drops.is_empty());
    }

    #[tokio::test]
    async fn absolute_threshold_boundary_is_inclusive() {
        let pool = test_pool().await;
        let book_id = insert_book(&pool, "9780134685991", Some(30.0)).await;
        insert_observation(&pool, book_id, "abebooks", 25.0, Utc::now()).await;

        let drops = comparator(&pool, ThresholdPolicy::Absolute(5.0))
            .compare()
            .await
            .unwrap();

        assert_eq!(drops.len(), 1);
        assert!((drops[0].difference - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn competing_price_above_tracked_never_fires() {
        let pool = test_pool().await;
        let book_id = insert_book(&pool, "9780134685991", Some(20.0)).await;
        insert_observation(&pool, book_id, "alibris", 35.0, Utc::now()).await;

        let drops = comparator(&pool, ThresholdPolicy::Absolute(0.01))
            .compare()
            .await
            .unwrap();

        assert!(drops.is_empty());
    }

    #[tokio::test]
    async fn only_the_latest_observation_per_source_counts() {
        let pool = test_pool().await;
        let book_id = insert_book(&pool, "9780134685991", Some(30.0)).await;
        insert_observation(
            &pool,
            book_id,
            "alibris",
            20.0,
            Utc::now() - Duration::hours(2),
        )
        .await;
        insert_observation(&pool, book_id, "alibris", 29.0, Utc::now()).await;

        let drops = comparator(&pool, ThresholdPolicy::Percentage(10.0))
            .compare()
            .await
            .unwrap();

        // latest price is 29.0, a 3.3% delta, so the older 20.0 must not fire
        assert!(drops.is_empty());
    }

    #[tokio::test]
    async fn stale_observations_are_ignored() {
        let pool = test_pool().await;
        let book_id = insert_book(&pool, "9780134685991", Some(30.0)).await;
        insert_observation(
            &pool,
            book_id,
            "alibris",
            10.0,
            Utc::now() - Duration::hours(defaults_window_hours() + 1),
        )
        .await;

        let drops = comparator(&pool, ThresholdPolicy::Percentage(10.0))
            .compare()
            .await
            .unwrap();

        assert!(drops.is_empty());
    }

    fn defaults_window_hours() -> i64 {
        AlertingConfig::default().recency_window_hours as i64
    }

    #[tokio::test]
    async fn books_without_tracked_price_are_skipped() {
        let pool = test_pool().await;
        let book_id = insert_book(&pool, "9780134685991", None).await;
        insert_observation(&pool, book_id, "alibris", 5.0, Utc::now()).await;

        let drops = comparator(&pool, ThresholdPolicy::Absolute(0.01))
            .compare()
            .await
            .unwrap();

        assert!(drops.is_empty());
    }

    #[tokio::test]
    async fn each_source_is_evaluated_independently() {
        let pool = test_pool().await;
        let book_id = insert_book(&pool, "9780134685991", Some(30.0)).await;
        insert_observation(&pool, book_id, "alibris", 24.0, Utc::now()).await;
        insert_observation(&pool, book_id, "abebooks", 22.5, Utc::now()).await;
        insert_observation(&pool, book_id, "biblio", 29.5, Utc::now()).await;

        let mut drops = comparator(&pool, ThresholdPolicy::Percentage(10.0))
            .compare()
            .await
            .unwrap();
        drops.sort_by(|a, b| a.competing_source.cmp(&b.competing_source));

        let sources: Vec<&str> = drops.iter().map(|d| d.competing_source.as_str()).collect();
        assert_eq!(sources, vec!["abebooks", "alibris"]);
    }
}
