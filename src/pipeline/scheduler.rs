//! Cycle scheduling
//!
//! One loop task owns the whole pipeline. Feed cycles and standalone
//! price checks are interleaved through `tokio::select!`, so two
//! cycles can never overlap and every stage sees the store in the
//! state the previous stage left it.

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::domain::events::{CycleStage, CycleStatus};
use crate::infrastructure::config::WatcherConfig;
use crate::infrastructure::sync_repository::SyncRepository;
use crate::pipeline::alert_manager::AlertManager;
use crate::pipeline::comparator::PriceComparator;
use crate::pipeline::enricher::MetadataEnricher;
use crate::pipeline::parser::FeedParser;
use crate::pipeline::synchronizer::CatalogSynchronizer;
use crate::pipeline::watcher::{FeedChange, FeedWatcher};
use crate::pipeline::WatchError;

pub struct Scheduler {
    watcher: FeedWatcher,
    parser: FeedParser,
    synchronizer: CatalogSynchronizer,
    enricher: MetadataEnricher,
    comparator: PriceComparator,
    alert_manager: AlertManager,
    sync_repository: SyncRepository,
    feed_poll_interval: std::time::Duration,
    price_check_interval: std::time::Duration,
}

/// Handle for a running scheduler loop
pub struct SchedulerHandle {
    cancellation_token: CancellationToken,
    join_handle: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    /// Cancel the loop and wait for the in-flight cycle to finish.
    pub async fn shutdown(self) {
        self.cancellation_token.cancel();
        if let Err(e) = self.join_handle.await {
            tracing::error!("Scheduler task ended abnormally: {}", e);
        }
    }
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        watcher: FeedWatcher,
        parser: FeedParser,
        synchronizer: CatalogSynchronizer,
        enricher: MetadataEnricher,
        comparator: PriceComparator,
        alert_manager: AlertManager,
        sync_repository: SyncRepository,
        config: &WatcherConfig,
    ) -> Self {
        Self {
            watcher,
            parser,
            synchronizer,
            enricher,
            comparator,
            alert_manager,
            sync_repository,
            feed_poll_interval: std::time::Duration::from_secs(
                (config.feed.poll_interval_minutes * 60).max(1),
            ),
            price_check_interval: std::time::Duration::from_secs(
                (config.alerting.price_check_interval_minutes * 60).max(1),
            ),
        }
    }

    /// Move the scheduler onto its own task. The first feed cycle runs
    /// immediately; later ticks follow the configured intervals.
    pub fn spawn(self) -> SchedulerHandle {
        let cancellation_token = CancellationToken::new();
        let loop_token = cancellation_token.clone();

        let join_handle = tokio::spawn(async move {
            self.run(loop_token).await;
        });

        SchedulerHandle {
            cancellation_token,
            join_handle,
        }
    }

    async fn run(self, cancellation_token: CancellationToken) {
        let mut feed_tick = tokio::time::interval(self.feed_poll_interval);
        feed_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut price_tick = tokio::time::interval(self.price_check_interval);
        price_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Scheduler started: feed poll every {:?}, price check every {:?}",
            self.feed_poll_interval,
            self.price_check_interval
        );

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    tracing::info!("Scheduler stopping");
                    break;
                }
                _ = feed_tick.tick() => {
                    let status = self.run_feed_cycle(&cancellation_token).await;
                    tracing::debug!("Feed cycle finished: {}", status);
                }
                _ = price_tick.tick() => {
                    let status = self.run_price_cycle().await;
                    tracing::debug!("Price cycle finished: {}", status);
                }
            }
        }
    }

    /// Full pipeline pass: feed check, parse, sync, enrich, compare,
    /// alert. Feed problems skip the cycle and are retried next tick;
    /// store failures abort it with nothing committed.
    async fn run_feed_cycle(&self, cancellation_token: &CancellationToken) -> CycleStatus {
        tracing::debug!("Cycle stage: {}", CycleStage::FeedCheck);
        let last_fingerprint = match self.sync_repository.get_last_fingerprint().await {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                tracing::error!("Could not load last feed fingerprint: {}", e);
                return CycleStatus::Error;
            }
        };

        let (content, fingerprint) =
            match self.watcher.check(last_fingerprint.as_deref()).await {
                Ok(FeedChange::Unchanged) => {
                    tracing::debug!("Feed unchanged, skipping cycle");
                    return CycleStatus::Unchanged;
                }
                Ok(FeedChange::Changed {
                    content,
                    fingerprint,
                }) => (content, fingerprint),
                Err(e @ (WatchError::FeedUnavailable(_) | WatchError::FeedMalformed(_))) => {
                    tracing::warn!("Feed check failed: {}", e);
                    return CycleStatus::Skipped;
                }
                Err(e) => {
                    tracing::error!("Feed check failed: {}", e);
                    return CycleStatus::Error;
                }
            };

        tracing::debug!("Cycle stage: {}", CycleStage::Parse);
        let parsed = match self.parser.parse(&content) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Feed rejected: {}", e);
                return CycleStatus::Skipped;
            }
        };
        if parsed.is_empty() {
            // Still synced: the ledger row records the defects and
            // advances the fingerprint past this content
            tracing::warn!(
                "Feed parsed to no valid rows ({} rejected)",
                parsed.defects.len()
            );
        }

        tracing::debug!("Cycle stage: {}", CycleStage::Sync);
        if let Err(e) = self
            .synchronizer
            .synchronize(&parsed, &self.watcher.filename(), &fingerprint)
            .await
        {
            tracing::error!("Sync failed, cycle rolled back: {}", e);
            return CycleStatus::Error;
        }

        tracing::debug!("Cycle stage: {}", CycleStage::Enrich);
        if let Err(e) = self.enricher.enrich(cancellation_token).await {
            tracing::error!("Enrichment pass failed: {}", e);
            return CycleStatus::Error;
        }

        match self.compare_and_alert().await {
            Ok(()) => CycleStatus::Completed,
            Err(e) => {
                tracing::error!("Comparison pass failed: {}", e);
                CycleStatus::Error
            }
        }
    }

    /// Standalone pass over existing observations, without touching
    /// the feed.
    async fn run_price_cycle(&self) -> CycleStatus {
        match self.compare_and_alert().await {
            Ok(()) => CycleStatus::Completed,
            Err(e) => {
                tracing::error!("Price check failed: {}", e);
                CycleStatus::Error
            }
        }
    }

    async fn compare_and_alert(&self) -> Result<(), WatchError> {
        tracing::debug!("Cycle stage: {}", CycleStage::Compare);
        let drops = self.comparator.compare().await?;

        tracing::debug!("Cycle stage: {}", CycleStage::Alert);
        self.alert_manager.process(&drops).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alert::ThresholdPolicy;
    use crate::infrastructure::alert_repository::AlertRepository;
    use crate::infrastructure::book_repository::BookRepository;
    use crate::infrastructure::config::{AlertingConfig, EnrichmentConfig};
    use crate::infrastructure::database_connection::DatabaseConnection;
    use crate::pipeline::notifier::ConsoleNotifier;
    use chrono::Utc;
    use sqlx::SqlitePool;
    use std::path::Path;
    use std::sync::Arc;

    const FEED: &str = "\
ISBN,Title,Author,Price,URL,Last-Updated
9780134685991,Effective Java,Joshua Bloch,29.99,https://example.com/ej,2026-01-10
9781492056300,Fluent Python,Luciano Ramalho,39.99,https://example.com/fp,2026-01-12
";

    async fn test_pool() -> SqlitePool {
        let connection = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        connection.migrate().await.unwrap();
        connection.pool().clone()
    }

    fn scheduler_for(pool: &SqlitePool, feed_path: &Path) -> Scheduler {
        let config = WatcherConfig::default();
        let alerting = AlertingConfig {
            threshold: ThresholdPolicy::Percentage(10.0),
            ..AlertingConfig::default()
        };
        let enrichment = EnrichmentConfig {
            providers: Vec::new(),
            ..EnrichmentConfig::default()
        };

        Scheduler::new(
            FeedWatcher::new(feed_path, std::time::Duration::from_secs(5)),
            FeedParser::new(),
            CatalogSynchronizer::new(pool.clone()),
            MetadataEnricher::new(BookRepository::new(pool.clone()), Vec::new(), &enrichment),
            PriceComparator::new(BookRepository::new(pool.clone()), &alerting),
            AlertManager::new(
                AlertRepository::new(pool.clone()),
                BookRepository::new(pool.clone()),
                Arc::new(ConsoleNotifier),
                &alerting,
            ),
            SyncRepository::new(pool.clone()),
            &config,
        )
    }

    async fn count(pool: &SqlitePool, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn feed_cycle_runs_the_full_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let feed_path = dir.path().join("books.csv");
        tokio::fs::write(&feed_path, FEED).await.unwrap();
        let pool = test_pool().await;
        let scheduler = scheduler_for(&pool, &feed_path);

        let status = scheduler.run_feed_cycle(&CancellationToken::new()).await;

        assert_eq!(status, CycleStatus::Completed);
        assert_eq!(count(&pool, "books").await, 2);
        assert_eq!(count(&pool, "sync_history").await, 1);
    }

    #[tokio::test]
    async fn unchanged_feed_short_circuits_the_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let feed_path = dir.path().join("books.csv");
        tokio::fs::write(&feed_path, FEED).await.unwrap();
        let pool = test_pool().await;
        let scheduler = scheduler_for(&pool, &feed_path);
        let token = CancellationToken::new();

        scheduler.run_feed_cycle(&token).await;
        let second = scheduler.run_feed_cycle(&token).await;

        assert_eq!(second, CycleStatus::Unchanged);
        assert_eq!(count(&pool, "sync_history").await, 1);
    }

    #[tokio::test]
    async fn missing_feed_skips_and_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool().await;
        let scheduler = scheduler_for(&pool, &dir.path().join("absent.csv"));

        let status = scheduler.run_feed_cycle(&CancellationToken::new()).await;

        assert_eq!(status, CycleStatus::Skipped);
        assert_eq!(count(&pool, "books").await, 0);
        assert_eq!(count(&pool, "sync_history").await, 0);
    }

    #[tokio::test]
    async fn malformed_feed_skips_and_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let feed_path = dir.path().join("books.csv");
        tokio::fs::write(&feed_path, "ISBN,Title\n123,Broken\n")
            .await
            .unwrap();
        let pool = test_pool().await;
        let scheduler = scheduler_for(&pool, &feed_path);

        let status = scheduler.run_feed_cycle(&CancellationToken::new()).await;

        assert_eq!(status, CycleStatus::Skipped);
        assert_eq!(count(&pool, "sync_history").await, 0);
    }

    #[tokio::test]
    async fn feed_with_only_rejected_rows_still_records_the_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let feed_path = dir.path().join("books.csv");
        tokio::fs::write(
            &feed_path,
            "ISBN,Title,Author,Price,URL,Last-Updated\nnot-an-isbn,Broken Row,,9.99,,\n",
        )
        .await
        .unwrap();
        let pool = test_pool().await;
        let scheduler = scheduler_for(&pool, &feed_path);

        let status = scheduler.run_feed_cycle(&CancellationToken::new()).await;

        // the ledger row commits so the fingerprint advances past this content
        assert_eq!(status, CycleStatus::Completed);
        assert_eq!(count(&pool, "books").await, 0);
        assert_eq!(count(&pool, "sync_history").await, 1);

        let second = scheduler.run_feed_cycle(&CancellationToken::new()).await;
        assert_eq!(second, CycleStatus::Unchanged);
    }

    #[tokio::test]
    async fn price_cycle_alerts_on_existing_observations() {
        let dir = tempfile::tempdir().unwrap();
        let feed_path = dir.path().join("books.csv");
        tokio::fs::write(&feed_path, FEED).await.unwrap();
        let pool = test_pool().await;
        let scheduler = scheduler_for(&pool, &feed_path);
        let token = CancellationToken::new();

        scheduler.run_feed_cycle(&token).await;

        let book_id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM books WHERE isbn = '9780134685991'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO price_history (book_id, source, price, observed_at) VALUES (?, 'alibris', 24.99, ?)",
        )
        .bind(book_id)
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();

        let status = scheduler.run_price_cycle().await;

        assert_eq!(status, CycleStatus::Completed);
        let statuses = sqlx::query_scalar::<_, String>("SELECT status FROM alerts")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(statuses, vec!["sent"]);
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let feed_path = dir.path().join("books.csv");
        tokio::fs::write(&feed_path, FEED).await.unwrap();
        let pool = test_pool().await;
        let handle = scheduler_for(&pool, &feed_path).spawn();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        tokio::time::timeout(std::time::Duration::from_secs(5), handle.shutdown())
            .await
            .expect("scheduler did not stop after cancellation");

        // the immediate first tick ran a full cycle before shutdown
        assert_eq!(count(&pool, "books").await, 2);
    }
}
