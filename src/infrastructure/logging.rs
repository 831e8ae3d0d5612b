//! Logging system configuration and initialization
//!
//! Sets up `tracing` with:
//! - Configuration file based log level control
//! - Structured JSON logging (optional)
//! - Console and daily-rotated file output
//! - `RUST_LOG` environment variable override

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use tracing::info;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

// Re-export LoggingConfig from config module
pub use crate::infrastructure::config::LoggingConfig;

// Global guard to keep the non-blocking log file writer alive
static LOG_GUARDS: Lazy<Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>>> =
    Lazy::new(|| Mutex::new(Vec::new()));

/// Get the log directory relative to the executable location
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Initialize logging with custom configuration
///
/// `RUST_LOG` overrides the configured filters entirely:
/// ```bash
/// # Show all SQL queries even on DEBUG level
/// RUST_LOG="debug,sqlx::query=debug" cargo run
/// ```
/// Without the override, noisy dependency targets (sqlx, reqwest, hyper)
/// are held back unless the configured level is "trace".
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = EnvFilter::new(&config.level);

        if !config.level.eq_ignore_ascii_case("trace") {
            filter = filter
                .add_directive("sqlx::query=warn".parse().unwrap())
                .add_directive("sqlx::sqlite=warn".parse().unwrap())
                .add_directive("reqwest=info".parse().unwrap())
                .add_directive("hyper=warn".parse().unwrap())
                .add_directive("h2=warn".parse().unwrap())
                .add_directive("tokio=info".parse().unwrap());
        }

        for (module, level) in &config.module_filters {
            if let Ok(directive) = format!("{module}={level}").parse() {
                filter = filter.add_directive(directive);
            }
        }

        filter
    });

    let registry = Registry::default().with(env_filter);

    match (config.file_output, config.console_output) {
        (true, true) => {
            let log_dir = create_log_directory()?;
            let file_appender = rolling::daily(&log_dir, "bookwatch.log");
            let (file_writer, file_guard) = non_blocking(file_appender);
            LOG_GUARDS.lock().unwrap().push(file_guard);

            if config.json_format {
                let file_layer = fmt::Layer::new()
                    .json()
                    .with_writer(file_writer)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_target(true)
                    .with_ansi(false);
                let console_layer = fmt::Layer::new()
                    .with_writer(std::io::stdout)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_target(false);

                registry.with(file_layer).with(console_layer).init();
            } else {
                let file_layer = fmt::Layer::new()
                    .with_writer(file_writer)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_target(false)
                    .with_ansi(false);
                let console_layer = fmt::Layer::new()
                    .with_writer(std::io::stdout)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_target(false);

                registry.with(file_layer).with(console_layer).init();
            }
        }
        (true, false) => {
            let log_dir = create_log_directory()?;
            let file_appender = rolling::daily(&log_dir, "bookwatch.log");
            let (file_writer, file_guard) = non_blocking(file_appender);
            LOG_GUARDS.lock().unwrap().push(file_guard);

            if config.json_format {
                let file_layer = fmt::Layer::new()
                    .json()
                    .with_writer(file_writer)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_target(true)
                    .with_ansi(false);
                registry.with(file_layer).init();
            } else {
                let file_layer = fmt::Layer::new()
                    .with_writer(file_writer)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_target(false)
                    .with_ansi(false);
                registry.with(file_layer).init();
            }
        }
        (false, true) => {
            let console_layer = fmt::Layer::new()
                .with_writer(std::io::stdout)
                .with_timer(ChronoUtc::rfc_3339())
                .with_target(false);
            registry.with(console_layer).init();
        }
        (false, false) => {
            return Err(anyhow!("No logging output configured"));
        }
    }

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if !config.level.eq_ignore_ascii_case("trace") {
        info!("SQL and verbose dependency logs suppressed (use trace level to see all logs)");
    }

    Ok(())
}

fn create_log_directory() -> Result<PathBuf> {
    let log_dir = get_log_directory();
    std::fs::create_dir_all(&log_dir)
        .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;
    Ok(log_dir)
}
