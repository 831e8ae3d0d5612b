//! Alert creation and dispatch
//!
//! Turns confirmed price drops into persisted alert rows and pushes
//! them through the notification channel. A (book, source) pair that
//! alerted recently is suppressed until the cooldown lapses; the
//! cooldown is anchored on the previous trigger time whatever its
//! dispatch outcome was, so a failed notification does not re-fire
//! every cycle.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::domain::alert::AlertStatus;
use crate::domain::alert::ThresholdPolicy;
use crate::infrastructure::alert_repository::AlertRepository;
use crate::infrastructure::book_repository::BookRepository;
use crate::infrastructure::config::AlertingConfig;
use crate::pipeline::comparator::PriceDrop;
use crate::pipeline::notifier::{AlertMessage, Notifier};
use crate::pipeline::WatchError;

/// Counters for one alerting pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertCycleOutcome {
    pub drops_evaluated: u32,
    pub suppressed_by_cooldown: u32,
    pub alerts_created: u32,
    pub alerts_sent: u32,
    pub alerts_failed: u32,
}

pub struct AlertManager {
    alerts: AlertRepository,
    books: BookRepository,
    notifier: Arc<dyn Notifier>,
    policy: ThresholdPolicy,
    cooldown: Duration,
    dispatch_timeout: std::time::Duration,
}

impl AlertManager {
    pub fn new(
        alerts: AlertRepository,
        books: BookRepository,
        notifier: Arc<dyn Notifier>,
        config: &AlertingConfig,
    ) -> Self {
        Self {
            alerts,
            books,
            notifier,
            policy: config.threshold.clone(),
            cooldown: Duration::hours(config.cooldown_hours as i64),
            dispatch_timeout: std::time::Duration::from_secs(config.dispatch_timeout_seconds),
        }
    }

    /// Persist and dispatch alerts for the given drops. One drop's
    /// dispatch failure never blocks the remaining drops.
    pub async fn process(&self, drops: &[PriceDrop]) -> Result<AlertCycleOutcome, WatchError> {
        let mut outcome = AlertCycleOutcome::default();

        for drop in drops {
            outcome.drops_evaluated += 1;
            let now = Utc::now();

            if let Some(last) = self
                .alerts
                .get_last_alert_for_pair(drop.book_id, &drop.competing_source)
                .await?
            {
                if last.within_cooldown(now, self.cooldown) {
                    tracing::debug!(
                        "Cooldown active for {} at {}, suppressing alert",
                        drop.isbn,
                        drop.competing_source
                    );
                    outcome.suppressed_by_cooldown += 1;
                    continue;
                }
            }

            let alert_id = self
                .alerts
                .insert_alert(
                    drop.book_id,
                    &self.policy,
                    drop.tracked_price,
                    drop.competing_price,
                    &drop.competing_source,
                    now,
                    AlertStatus::Pending,
                )
                .await?;
            outcome.alerts_created += 1;

            let delivered = self.dispatch_with_timeout(drop).await;
            let status = AlertStatus::Pending
                .dispatch_outcome(delivered)
                .map_err(|e| WatchError::Dispatch(e.to_string()))?;
            self.alerts.update_status(alert_id, status).await?;

            if delivered {
                outcome.alerts_sent += 1;
            } else {
                outcome.alerts_failed += 1;
            }
        }

        if outcome.drops_evaluated > 0 {
            tracing::info!(
                "Alert pass: {} drop(s), {} sent, {} failed, {} suppressed",
                outcome.drops_evaluated,
                outcome.alerts_sent,
                outcome.alerts_failed,
                outcome.suppressed_by_cooldown
            );
        }

        Ok(outcome)
    }

    async fn dispatch_with_timeout(&self, drop: &PriceDrop) -> bool {
        let book_title = match self.books.get_book_by_id(drop.book_id).await {
            Ok(book) => book.and_then(|b| b.title),
            Err(e) => {
                tracing::warn!("Could not load book {} for alert message: {}", drop.book_id, e);
                None
            }
        };

        let message = AlertMessage {
            book_title,
            isbn: drop.isbn.clone(),
            tracked_price: drop.tracked_price,
            competing_price: drop.competing_price,
            competing_source: drop.competing_source.clone(),
            difference: drop.difference,
            percentage: drop.percentage,
            policy: self.policy.clone(),
        };

        match tokio::time::timeout(self.dispatch_timeout, self.notifier.dispatch(&message)).await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(
                    "Notifier {} failed for {}: {}",
                    self.notifier.name(),
                    drop.isbn,
                    e
                );
                false
            }
            Err(_) => {
                tracing::warn!(
                    "Notifier {} timed out after {:?} for {}",
                    self.notifier.name(),
                    self.dispatch_timeout,
                    drop.isbn
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use async_trait::async_trait;
    use sqlx::SqlitePool;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct RecordingNotifier {
        calls: AtomicU32,
        messages: Mutex<Vec<AlertMessage>>,
        fail: bool,
        delay: Option<std::time::Duration>,
    }

    impl RecordingNotifier {
        fn working() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                messages: Mutex::new(Vec::new()),
                fail: false,
                delay: None,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                messages: Mutex::new(Vec::new()),
                fail: true,
                delay: None,
            })
        }

        fn slow(delay: std::time::Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                messages: Mutex::new(Vec::new()),
                fail: false,
                delay: Some(delay),
            })
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn dispatch(&self, message: &AlertMessage) -> Result<(), WatchError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(WatchError::Dispatch("channel unavailable".to_string()));
            }
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    async fn test_pool() -> SqlitePool {
        let connection = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        connection.migrate().await.unwrap();
        connection.pool().clone()
    }

    async fn insert_book(pool: &SqlitePool, isbn: &str, title: &str) -> i64 {
        let result = sqlx::query(
            r#"
            INSERT INTO books (isbn, title, tracked_price, last_updated, created_at)
            VALUES (?, ?, 29.99, ?, ?)
            "#,
        )
        .bind(isbn)
        .bind(title)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(pool)
        .await
        .unwrap();
        result.last_insert_rowid()
    }

    fn manager(
        pool: &SqlitePool,
        notifier: Arc<dyn Notifier>,
        config: &AlertingConfig,
    ) -> AlertManager {
        AlertManager::new(
            AlertRepository::new(pool.clone()),
            BookRepository::new(pool.clone()),
            notifier,
            config,
        )
    }

    fn sample_drop(book_id: i64, source: &str) -> PriceDrop {
        PriceDrop {
            book_id,
            isbn: "9780134685991".to_string(),
            tracked_price: 29.99,
            competing_price: 21.00,
            competing_source: source.to_string(),
            observed_at: Utc::now(),
            difference: 8.99,
            percentage: 29.98,
        }
    }

    async fn alert_statuses(pool: &SqlitePool) -> Vec<String> {
        sqlx::query_scalar::<_, String>("SELECT status FROM alerts ORDER BY id")
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn first_crossing_creates_and_sends_an_alert() {
        let pool = test_pool().await;
        let book_id = insert_book(&pool, "9780134685991", "Effective Java").await;
        let notifier = RecordingNotifier::working();
        let manager = manager(&pool, notifier.clone(), &AlertingConfig::default());

        let outcome = manager.process(&[sample_drop(book_id, "alibris")]).await.unwrap();

        assert_eq!(outcome.alerts_created, 1);
        assert_eq!(outcome.alerts_sent, 1);
        assert_eq!(outcome.alerts_failed, 0);
        assert_eq!(alert_statuses(&pool).await, vec!["sent"]);

        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].book_title.as_deref(), Some("Effective Java"));
        assert!((messages[0].difference - 8.99).abs() < 1e-9);
    }

    #[tokio::test]
    async fn repeat_crossing_within_cooldown_is_suppressed() {
        let pool = test_pool().await;
        let book_id = insert_book(&pool, "9780134685991", "Effective Java").await;
        let notifier = RecordingNotifier::working();
        let manager = manager(&pool, notifier.clone(), &AlertingConfig::default());
        let drop = sample_drop(book_id, "alibris");

        manager.process(&[drop.clone()]).await.unwrap();
        let second = manager.process(&[drop]).await.unwrap();

        assert_eq!(second.suppressed_by_cooldown, 1);
        assert_eq!(second.alerts_created, 0);
        assert_eq!(alert_statuses(&pool).await.len(), 1);
        assert_eq!(notifier.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn crossing_after_cooldown_alerts_again() {
        let pool = test_pool().await;
        let book_id = insert_book(&pool, "9780134685991", "Effective Java").await;
        let config = AlertingConfig::default();

        // a previous alert whose cooldown has already lapsed
        let alerts = AlertRepository::new(pool.clone());
        alerts
            .insert_alert(
                book_id,
                &config.threshold,
                29.99,
                21.00,
                "alibris",
                Utc::now() - Duration::hours(config.cooldown_hours as i64 + 1),
                AlertStatus::Sent,
            )
            .await
            .unwrap();

        let manager = manager(&pool, RecordingNotifier::working(), &config);
        let outcome = manager.process(&[sample_drop(book_id, "alibris")]).await.unwrap();

        assert_eq!(outcome.alerts_created, 1);
        assert_eq!(outcome.suppressed_by_cooldown, 0);
        assert_eq!(alert_statuses(&pool).await.len(), 2);
    }

    #[tokio::test]
    async fn failed_dispatch_is_recorded_and_still_cools_down() {
        let pool = test_pool().await;
        let book_id = insert_book(&pool, "9780134685991", "Effective Java").await;
        let manager = manager(&pool, RecordingNotifier::failing(), &AlertingConfig::default());
        let drop = sample_drop(book_id, "alibris");

        let first = manager.process(&[drop.clone()]).await.unwrap();
        assert_eq!(first.alerts_failed, 1);
        assert_eq!(alert_statuses(&pool).await, vec!["failed"]);

        let second = manager.process(&[drop]).await.unwrap();
        assert_eq!(second.suppressed_by_cooldown, 1);
        assert_eq!(alert_statuses(&pool).await.len(), 1);
    }

    #[tokio::test]
    async fn slow_notifier_times_out_and_marks_the_alert_failed() {
        let pool = test_pool().await;
        let book_id = insert_book(&pool, "9780134685991", "Effective Java").await;
        let config = AlertingConfig {
            dispatch_timeout_seconds: 0,
            ..AlertingConfig::default()
        };
        let manager = manager(
            &pool,
            RecordingNotifier::slow(std::time::Duration::from_millis(200)),
            &config,
        );

        let outcome = manager.process(&[sample_drop(book_id, "alibris")]).await.unwrap();

        assert_eq!(outcome.alerts_failed, 1);
        assert_eq!(alert_statuses(&pool).await, vec!["failed"]);
    }

    #[tokio::test]
    async fn distinct_sources_alert_independently() {
        let pool = test_pool().await;
        let book_id = insert_book(&pool, "9780134685991", "Effective Java").await;
        let manager = manager(&pool, RecordingNotifier::working(), &AlertingConfig::default());

        let outcome = manager
            .process(&[sample_drop(book_id, "alibris"), sample_drop(book_id, "abebooks")])
            .await
            .unwrap();

        assert_eq!(outcome.alerts_created, 2);
        assert_eq!(outcome.alerts_sent, 2);
        assert_eq!(alert_statuses(&pool).await.len(), 2);
    }
}
