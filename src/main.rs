//! BookWatch daemon entry point
//!
//! Loads (or creates) the configuration file, opens the store, wires
//! the pipeline stages together, and runs the scheduler until Ctrl-C.
//! An explicit config path may be given as the first argument.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use bookwatch::infrastructure::alert_repository::AlertRepository;
use bookwatch::infrastructure::book_repository::BookRepository;
use bookwatch::infrastructure::logging::init_logging_with_config;
use bookwatch::infrastructure::metadata_providers::build_providers;
use bookwatch::infrastructure::sync_repository::SyncRepository;
use bookwatch::pipeline::{
    AlertManager, CatalogSynchronizer, ConsoleNotifier, FeedParser, FeedWatcher,
    MetadataEnricher, PriceComparator,
};
use bookwatch::{ConfigManager, DatabaseConnection, Scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    let config_manager = match std::env::args().nth(1) {
        Some(path) => ConfigManager::with_path(PathBuf::from(path)),
        None => ConfigManager::new()?,
    };
    let config = config_manager.initialize_on_first_run().await?;
    config.validate()?;

    init_logging_with_config(&config.logging)?;
    info!("BookWatch starting");
    info!("Watching feed: {}", config.feed.path.display());

    let database_path = config.database_path()?;
    let database_url = format!("sqlite:{}", database_path.display());
    let connection =
        DatabaseConnection::with_max_connections(&database_url, config.database.max_connections)
            .await
            .with_context(|| format!("Could not open database at {}", database_path.display()))?;
    connection.migrate().await?;
    let pool = connection.pool().clone();
    info!("Database ready: {}", database_path.display());

    let providers = build_providers(&config.enrichment)?;
    info!(
        "Metadata providers: {}",
        providers
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let scheduler = Scheduler::new(
        FeedWatcher::new(
            &config.feed.path,
            std::time::Duration::from_secs(config.feed.read_timeout_seconds),
        ),
        FeedParser::new(),
        CatalogSynchronizer::new(pool.clone()),
        MetadataEnricher::new(BookRepository::new(pool.clone()), providers, &config.enrichment),
        PriceComparator::new(BookRepository::new(pool.clone()), &config.alerting),
        AlertManager::new(
            AlertRepository::new(pool.clone()),
            BookRepository::new(pool.clone()),
            Arc::new(ConsoleNotifier),
            &config.alerting,
        ),
        SyncRepository::new(pool),
        &config,
    );
    let handle = scheduler.spawn();

    tokio::signal::ctrl_c()
        .await
        .context("Could not listen for the shutdown signal")?;
    info!("Shutdown signal received, finishing the current cycle");
    handle.shutdown().await;
    info!("BookWatch stopped");

    Ok(())
}
