// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;

use crate::infrastructure::config::defaults;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_max_connections(database_url, defaults::DB_MAX_CONNECTIONS).await
    }

    pub async fn with_max_connections(database_url: &str, max_connections: u32) -> Result<Self> {
        // Create database file directory if it doesn't exist
        let db_path = if database_url.starts_with("sqlite://") {
            database_url.trim_start_matches("sqlite://")
        } else if database_url.starts_with("sqlite:") {
            database_url.trim_start_matches("sqlite:")
        } else {
            database_url
        };

        // A memory database exists per connection, so the pool must
        // hold exactly one or later queries see an empty database
        let max_connections = if db_path == ":memory:" {
            1
        } else {
            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            // Ensure the database file exists by creating it if necessary
            if !Path::new(db_path).exists() {
                std::fs::File::create(db_path)?;
            }
            max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_books_sql = r#"
            CREATE TABLE IF NOT EXISTS books (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                isbn TEXT NOT NULL UNIQUE,
                title TEXT,
                author TEXT,
                tracked_price REAL,
                source_url TEXT,
                row_hash TEXT,
                last_enrichment_attempt TEXT,
                last_updated TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
        "#;

        let create_price_history_sql = r#"
            CREATE TABLE IF NOT EXISTS price_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                book_id INTEGER NOT NULL,
                source TEXT NOT NULL,
                price REAL,
                observed_at TEXT NOT NULL,
                FOREIGN KEY (book_id) REFERENCES books (id)
            )
        "#;

        let create_alerts_sql = r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                book_id INTEGER NOT NULL,
                threshold_type TEXT NOT NULL,
                threshold_value REAL NOT NULL,
                tracked_price REAL NOT NULL,
                competing_price REAL NOT NULL,
                competing_source TEXT NOT NULL,
                triggered_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                FOREIGN KEY (book_id) REFERENCES books (id)
            )
        "#;

        let create_sync_history_sql = r#"
            CREATE TABLE IF NOT EXISTS sync_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                processed_at TEXT NOT NULL,
                rows_processed INTEGER NOT NULL DEFAULT 0,
                rows_inserted INTEGER NOT NULL DEFAULT 0,
                rows_updated INTEGER NOT NULL DEFAULT 0,
                defect_count INTEGER NOT NULL DEFAULT 0
            )
        "#;

        sqlx::query(create_books_sql).execute(&self.pool).await?;
        sqlx::query(create_price_history_sql)
            .execute(&self.pool)
            .await?;
        sqlx::query(create_alerts_sql).execute(&self.pool).await?;
        sqlx::query(create_sync_history_sql)
            .execute(&self.pool)
            .await?;

        let index_statements = [
            "CREATE INDEX IF NOT EXISTS idx_price_history_book_id ON price_history (book_id)",
            "CREATE INDEX IF NOT EXISTS idx_price_history_observed_at ON price_history (observed_at)",
            "CREATE INDEX IF NOT EXISTS idx_alerts_book_id ON alerts (book_id)",
            "CREATE INDEX IF NOT EXISTS idx_alerts_status ON alerts (status)",
            "CREATE INDEX IF NOT EXISTS idx_alerts_triggered_at ON alerts (triggered_at)",
            "CREATE INDEX IF NOT EXISTS idx_sync_history_processed_at ON sync_history (processed_at)",
        ];
        for statement in index_statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }
}
