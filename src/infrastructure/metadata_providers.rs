//! Metadata providers: Google Books and Open Library
//!
//! Each provider wraps its public JSON API behind the common
//! `MetadataProvider` trait. Providers are tried in configuration
//! order by the enricher; a provider that finds nothing returns
//! `Ok(None)` so the next one gets a chance.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::domain::book::BookMetadata;
use crate::infrastructure::config::EnrichmentConfig;
use crate::infrastructure::http_client::{HttpClient, HttpClientConfig};
use crate::infrastructure::retry::{retry_with_backoff, RetryPolicy};

pub const GOOGLE_BOOKS: &str = "google-books";
pub const OPEN_LIBRARY: &str = "open-library";

const GOOGLE_BOOKS_ENDPOINT: &str = "https://www.googleapis.com/books/v1/volumes";
const OPEN_LIBRARY_ENDPOINT: &str = "https://openlibrary.org/api/books";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to {provider} failed: {message}")]
    Request {
        provider: &'static str,
        message: String,
    },
    #[error("{provider} returned an unusable payload: {message}")]
    Payload {
        provider: &'static str,
        message: String,
    },
    #[error("lookup attempt timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),
}

/// External metadata source keyed by ISBN
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Look up one ISBN. `Ok(None)` means the provider has no record,
    /// which is not an error.
    async fn lookup(
        &self,
        isbn: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<Option<BookMetadata>, ProviderError>;
}

/// Instantiate the configured provider chain in priority order.
pub fn build_providers(config: &EnrichmentConfig) -> anyhow::Result<Vec<Arc<dyn MetadataProvider>>> {
    let mut providers: Vec<Arc<dyn MetadataProvider>> = Vec::new();

    for provider_config in &config.providers {
        let http_config = HttpClientConfig {
            timeout_seconds: provider_config.timeout_seconds,
            max_requests_per_second: provider_config.requests_per_second,
            ..Default::default()
        };
        let retry_policy = RetryPolicy {
            max_retries: provider_config.max_retries,
            // The reqwest timeout fires first; this is the outer bound
            attempt_timeout: Duration::from_secs(provider_config.timeout_seconds + 2),
            ..Default::default()
        };

        match provider_config.name.as_str() {
            GOOGLE_BOOKS => providers.push(Arc::new(GoogleBooksProvider::new(
                HttpClient::new(http_config)?,
                retry_policy,
            ))),
            OPEN_LIBRARY => providers.push(Arc::new(OpenLibraryProvider::new(
                HttpClient::new(http_config)?,
                retry_policy,
            ))),
            other => anyhow::bail!("unknown metadata provider in configuration: {other}"),
        }
    }

    Ok(providers)
}

fn clean_isbn(isbn: &str) -> String {
    isbn.replace(['-', ' '], "")
}

/// Decode a fetched body into the provider's response shape. A body
/// that arrives but does not match is a payload problem, distinct from
/// the transport failures mapped to `ProviderError::Request`.
fn decode_payload<T: DeserializeOwned>(
    provider: &'static str,
    body: serde_json::Value,
) -> Result<T, ProviderError> {
    serde_json::from_value(body).map_err(|e| ProviderError::Payload {
        provider,
        message: e.to_string(),
    })
}

// ===============================
// GOOGLE BOOKS
// ===============================

#[derive(Debug, Deserialize)]
struct GoogleBooksResponse {
    #[serde(rename = "totalItems", default)]
    total_items: i64,
    #[serde(default)]
    items: Vec<GoogleBooksItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleBooksItem {
    #[serde(rename = "volumeInfo")]
    volume_info: Option<GoogleVolumeInfo>,
}

#[derive(Debug, Deserialize)]
struct GoogleVolumeInfo {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(rename = "infoLink")]
    info_link: Option<String>,
}

fn metadata_from_google(response: GoogleBooksResponse) -> Option<BookMetadata> {
    if response.total_items == 0 {
        return None;
    }
    let volume_info = response.items.into_iter().next()?.volume_info?;

    let author = if volume_info.authors.is_empty() {
        None
    } else {
        Some(volume_info.authors.join(", "))
    };

    // A matched volume with no usable fields is as good as no match;
    // returning None lets the next provider try
    let metadata = BookMetadata {
        title: volume_info.title,
        author,
        url: volume_info.info_link,
    };
    (!metadata.is_empty()).then_some(metadata)
}

pub struct GoogleBooksProvider {
    client: HttpClient,
    retry_policy: RetryPolicy,
}

impl GoogleBooksProvider {
    pub fn new(client: HttpClient, retry_policy: RetryPolicy) -> Self {
        Self {
            client,
            retry_policy,
        }
    }

    async fn fetch_once(
        &self,
        isbn: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<Option<BookMetadata>, ProviderError> {
        let url = Url::parse_with_params(
            GOOGLE_BOOKS_ENDPOINT,
            &[("q", format!("isbn:{isbn}")), ("maxResults", "1".into())],
        )
        .map_err(|e| ProviderError::Request {
            provider: GOOGLE_BOOKS,
            message: e.to_string(),
        })?;

        let body: serde_json::Value = self
            .client
            .get_json_with_cancellation(url.as_str(), cancellation_token)
            .await
            .map_err(|e| ProviderError::Request {
                provider: GOOGLE_BOOKS,
                message: e.to_string(),
            })?;

        Ok(metadata_from_google(decode_payload(GOOGLE_BOOKS, body)?))
    }
}

#[async_trait]
impl MetadataProvider for GoogleBooksProvider {
    fn name(&self) -> &'static str {
        GOOGLE_BOOKS
    }

    async fn lookup(
        &self,
        isbn: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<Option<BookMetadata>, ProviderError> {
        let isbn = clean_isbn(isbn);
        retry_with_backoff(&self.retry_policy, || {
            self.fetch_once(&isbn, cancellation_token)
        })
        .await
    }
}

// ===============================
// OPEN LIBRARY
// ===============================

#[derive(Debug, Deserialize)]
struct OpenLibraryRecord {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<OpenLibraryAuthor>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenLibraryAuthor {
    name: Option<String>,
}

fn metadata_from_open_library(
    mut response: HashMap<String, OpenLibraryRecord>,
    bibkey: &str,
) -> Option<BookMetadata> {
    let record = response.remove(bibkey)?;

    let names: Vec<String> = record
        .authors
        .into_iter()
        .filter_map(|author| author.name)
        .collect();
    let author = if names.is_empty() {
        None
    } else {
        Some(names.join(", "))
    };

    let metadata = BookMetadata {
        title: record.title,
        author,
        url: record.url,
    };
    (!metadata.is_empty()).then_some(metadata)
}

pub struct OpenLibraryProvider {
    client: HttpClient,
    retry_policy: RetryPolicy,
}

impl OpenLibraryProvider {
    pub fn new(client: HttpClient, retry_policy: RetryPolicy) -> Self {
        Self {
            client,
            retry_policy,
        }
    }

    async fn fetch_once(
        &self,
        bibkey: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<Option<BookMetadata>, ProviderError> {
        let url = Url::parse_with_params(
            OPEN_LIBRARY_ENDPOINT,
            &[
                ("bibkeys", bibkey),
                ("format", "json"),
                ("jscmd", "data"),
            ],
        )
        .map_err(|e| ProviderError::Request {
            provider: OPEN_LIBRARY,
            message: e.to_string(),
        })?;

        let body: serde_json::Value = self
            .client
            .get_json_with_cancellation(url.as_str(), cancellation_token)
            .await
            .map_err(|e| ProviderError::Request {
                provider: OPEN_LIBRARY,
                message: e.to_string(),
            })?;

        let response: HashMap<String, OpenLibraryRecord> = decode_payload(OPEN_LIBRARY, body)?;
        Ok(metadata_from_open_library(response, bibkey))
    }
}

#[async_trait]
impl MetadataProvider for OpenLibraryProvider {
    fn name(&self) -> &'static str {
        OPEN_LIBRARY
    }

    async fn lookup(
        &self,
        isbn: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<Option<BookMetadata>, ProviderError> {
        let bibkey = format!("ISBN:{}", clean_isbn(isbn));
        retry_with_backoff(&self.retry_policy, || {
            self.fetch_once(&bibkey, cancellation_token)
        })
        .await
    }
}
