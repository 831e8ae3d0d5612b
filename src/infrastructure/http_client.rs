//! HTTP client for metadata provider calls
//!
//! Wraps `reqwest` with a per-client rate limiter so each provider
//! stays inside its published request budget, and threads a
//! `CancellationToken` through every await point so shutdown does not
//! wait out slow provider responses.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::{
    clock::DefaultClock,
    state::{direct::NotKeyed, InMemoryState},
    Quota, RateLimiter,
};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

/// HTTP client configuration for one provider endpoint
#[derive(Debug, Clone, serde::Serialize)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_requests_per_second: u32,
    pub follow_redirects: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: "bookwatch/0.2 (book price monitor)".to_string(),
            timeout_seconds: 10,
            max_requests_per_second: 2,
            follow_redirects: true,
        }
    }
}

/// Rate-limited HTTP client. Each provider owns its own instance so
/// one provider's quota never throttles another.
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .gzip(true)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second)
                .context("Rate limit must be greater than 0")?,
        );
        let rate_limiter = RateLimiter::direct(quota);

        Ok(Self {
            client,
            rate_limiter,
            config,
        })
    }

    /// GET a URL and deserialize the JSON body, honoring the rate
    /// limiter and the cancellation token at every await point.
    pub async fn get_json_with_cancellation<T: DeserializeOwned>(
        &self,
        url: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<T> {
        if cancellation_token.is_cancelled() {
            anyhow::bail!("Request cancelled before starting");
        }

        tokio::select! {
            _ = self.rate_limiter.until_ready() => {},
            _ = cancellation_token.cancelled() => {
                anyhow::bail!("Request cancelled during rate limiting");
            }
        }

        tracing::debug!("Fetching JSON from: {}", url);

        let response = tokio::select! {
            result = self.client.get(url).send() => {
                result.with_context(|| format!("Failed to fetch URL: {url}"))?
            },
            _ = cancellation_token.cancelled() => {
                tracing::warn!("HTTP request cancelled for URL: {}", url);
                anyhow::bail!("HTTP request cancelled");
            }
        };

        if !response.status().is_success() {
            anyhow::bail!(
                "HTTP request failed with status {}: {}",
                response.status(),
                url
            );
        }

        let value = tokio::select! {
            result = response.json::<T>() => {
                result.with_context(|| format!("Failed to decode JSON body from: {url}"))?
            },
            _ = cancellation_token.cancelled() => {
                tracing::warn!("Response reading cancelled for URL: {}", url);
                anyhow::bail!("Response reading cancelled");
            }
        };

        Ok(value)
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}
