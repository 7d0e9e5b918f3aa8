//! Rate limiting and retry logic for external API calls
//!
//! Every outbound HTTP client (search providers, the image service, the media
//! server) goes through a `RateLimitedClient` so a large scan cannot burst
//! past an upstream's request budget.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, warn};

/// Configuration for rate limiting
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per second
    pub requests_per_second: u32,
    /// Burst capacity (allows short bursts above the rate)
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2,
            burst_size: 5,
        }
    }
}

/// A rate-limited HTTP client wrapper
pub struct RateLimitedClient {
    client: Client,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    name: String,
}

impl RateLimitedClient {
    /// Create a new rate-limited client
    pub fn new(name: &str, config: RateLimitConfig) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("postersync/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!(client = %name, error = %e, "Falling back to default HTTP client");
                Client::new()
            });

        Self {
            client,
            limiter: Arc::new(RateLimiter::direct(quota)),
            name: name.to_string(),
        }
    }

    /// Client for TMDB API
    pub fn for_tmdb() -> Self {
        // TMDB allows ~40 requests per 10 seconds, so ~4/sec with burst of 10
        Self::new(
            "tmdb",
            RateLimitConfig {
                requests_per_second: 4,
                burst_size: 10,
            },
        )
    }

    /// Client for the IMDb suggestion endpoint
    pub fn for_imdb() -> Self {
        // No published limits; stay conservative
        Self::new(
            "imdb",
            RateLimitConfig {
                requests_per_second: 2,
                burst_size: 4,
            },
        )
    }

    /// Client for the poster image service
    pub fn for_image_service() -> Self {
        Self::new(
            "images",
            RateLimitConfig {
                requests_per_second: 5,
                burst_size: 10,
            },
        )
    }

    /// Client for a local media server
    pub fn for_media_server() -> Self {
        Self::new(
            "plex",
            RateLimitConfig {
                requests_per_second: 10,
                burst_size: 20,
            },
        )
    }

    /// Wait for rate limit and make a GET request
    pub async fn get(&self, url: &str) -> reqwest::Result<Response> {
        self.wait_for_permit().await;
        debug!(client = %self.name, url = %url, "Making rate-limited GET request");
        self.client.get(url).send().await
    }

    /// Wait for rate limit and make a GET request with query parameters
    pub async fn get_with_query<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        query: &T,
    ) -> reqwest::Result<Response> {
        self.wait_for_permit().await;
        debug!(client = %self.name, url = %url, "Making rate-limited GET request with query");
        self.client.get(url).query(query).send().await
    }

    /// Wait for rate limit and send a prepared request
    pub async fn send(&self, request: RequestBuilder) -> reqwest::Result<Response> {
        self.wait_for_permit().await;
        request.send().await
    }

    /// Get a reference to the underlying client for custom requests
    /// (caller is responsible for calling wait_for_permit or `send`)
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Wait for a rate limit permit
    pub async fn wait_for_permit(&self) {
        self.limiter.until_ready().await;
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_interval: Duration,
    /// Maximum backoff duration
    pub max_interval: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create an ExponentialBackoff from this config
    pub fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        }
    }
}

/// Execute an async operation, retrying only failures accepted by `should_retry`
pub async fn retry_async_if<T, E, Fut, F, P>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
    should_retry: P,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempts = 0;
    let mut backoff = config.to_backoff();

    loop {
        attempts += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !should_retry(&e) {
                    return Err(e);
                }
                if attempts >= config.max_retries {
                    warn!(
                        operation = %operation_name,
                        attempts = attempts,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                if let Some(duration) = backoff.next_backoff() {
                    let retry_ms: u128 = duration.as_millis();
                    warn!(
                        operation = %operation_name,
                        attempt = attempts,
                        error = %e,
                        retry_in_ms = retry_ms,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(duration).await;
                } else {
                    return Err(e);
                }
            }
        }
    }
}

/// Helper trait for retrying HTTP responses that might indicate rate limiting
pub trait ResponseExt {
    /// Check if the response indicates rate limiting (429)
    fn is_rate_limited(&self) -> bool;
}

impl ResponseExt for Response {
    fn is_rate_limited(&self) -> bool {
        self.status().as_u16() == 429
    }
}

/// 429 (rate limit), 408 (timeout) and 5xx are worth retrying
pub fn is_transient_status(status: u16) -> bool {
    status == 429 || status == 408 || (500..600).contains(&status)
}
