//! Feed change detection
//!
//! Reads the feed file and fingerprints its full byte content. The
//! last accepted fingerprint lives in the sync ledger, not here, so a
//! crash between detection and commit re-processes the same content
//! instead of losing it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::WatchError;

/// Outcome of one watcher tick
#[derive(Debug, Clone, PartialEq)]
pub enum FeedChange {
    /// Fingerprint matches the last accepted one; nothing to do.
    Unchanged,
    /// New or first-seen content, handed on to the parser.
    Changed { content: String, fingerprint: String },
}

pub struct FeedWatcher {
    feed_path: PathBuf,
    read_timeout: Duration,
}

impl FeedWatcher {
    pub fn new(feed_path: impl Into<PathBuf>, read_timeout: Duration) -> Self {
        Self {
            feed_path: feed_path.into(),
            read_timeout,
        }
    }

    pub fn feed_path(&self) -> &Path {
        &self.feed_path
    }

    /// Feed file name recorded in the sync ledger.
    pub fn filename(&self) -> String {
        self.feed_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.feed_path.display().to_string())
    }

    /// Read and fingerprint the feed, comparing against the last
    /// accepted fingerprint. An unreadable feed is reported for this
    /// tick and retried on the next one.
    pub async fn check(&self, last_fingerprint: Option<&str>) -> Result<FeedChange, WatchError> {
        let read = tokio::time::timeout(self.read_timeout, tokio::fs::read(&self.feed_path));
        let bytes = match read.await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                return Err(WatchError::FeedUnavailable(format!(
                    "{}: {e}",
                    self.feed_path.display()
                )));
            }
            Err(_) => {
                return Err(WatchError::FeedUnavailable(format!(
                    "{}: read timed out",
                    self.feed_path.display()
                )));
            }
        };

        let fingerprint = fingerprint(&bytes);

        if last_fingerprint == Some(fingerprint.as_str()) {
            tracing::debug!("Feed unchanged: {}", self.feed_path.display());
            return Ok(FeedChange::Unchanged);
        }

        let content = String::from_utf8(bytes)
            .map_err(|_| WatchError::FeedMalformed("feed is not valid UTF-8".to_string()))?;

        tracing::info!(
            "Feed changed: {} (fingerprint {})",
            self.feed_path.display(),
            &fingerprint[..12]
        );

        Ok(FeedChange::Changed {
            content,
            fingerprint,
        })
    }
}

/// Hex fingerprint over the full feed byte content.
pub fn fingerprint(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
