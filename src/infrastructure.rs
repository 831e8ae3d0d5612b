//! Infrastructure layer for persistence, configuration, and external integrations
//!
//! This module provides the SQLite store behind the catalog, the HTTP
//! plumbing for metadata providers, and the configuration and logging
//! bootstrap shared by the binary and the tests.

pub mod alert_repository;
pub mod book_repository;
pub mod config;
pub mod database_connection;
pub mod http_client;
pub mod logging;
pub mod metadata_providers;
pub mod retry;
pub mod sync_repository;

// Re-export commonly used items
pub use alert_repository::AlertRepository;
pub use book_repository::BookRepository;
pub use config::{ConfigManager, WatcherConfig};
pub use database_connection::DatabaseConnection;
pub use http_client::{HttpClient, HttpClientConfig};
pub use metadata_providers::{build_providers, MetadataProvider, ProviderError};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use sync_repository::SyncRepository;
