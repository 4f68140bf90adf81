//! Resilient HTTP+JSON fetching
//!
//! [`ResilientFetcher`] performs one logical GET with retries:
//!
//! - 5xx, 429, timeouts, and connection failures are transient. The same
//!   egress is retried after an exponential backoff until the
//!   [`RetryPolicy`] budget runs out.
//! - 403 rotates to the next egress in the [`EgressPool`] and retries
//!   immediately. Once every egress has refused, the call fails.
//! - Any other non-success status is returned as [`FetchError::Rejected`]
//!   without retrying.
//!
//! Callers only ever see `Exhausted` for failures that were retried.

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::FetchConfig;

pub mod policy;
pub mod proxy;

pub use policy::RetryPolicy;
pub use proxy::{Egress, EgressPool};

#[derive(Debug, Error)]
pub enum FetchError {
    /// Retryable failure of a single attempt
    #[error("Transient failure fetching {url}: {reason}")]
    Transient { url: String, reason: String },

    /// The egress was refused; rotate before retrying
    #[error("Forbidden (403) fetching {url} via {egress}")]
    Forbidden { url: String, egress: String },

    /// Retry budget or full proxy cycle consumed
    #[error("Gave up fetching {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },

    /// Non-retryable status such as 404
    #[error("Request to {url} rejected with status {status}")]
    Rejected { url: String, status: u16 },

    #[error("Invalid JSON from {url}: {reason}")]
    InvalidBody { url: String, reason: String },

    #[error("Cannot build request URL from {base}: {reason}")]
    InvalidUrl { base: String, reason: String },

    /// Client construction or request building failed
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// HTTP fetcher with retry, backoff, and egress rotation
#[derive(Debug)]
pub struct ResilientFetcher {
    pool: EgressPool,
    policy: RetryPolicy,
}

impl ResilientFetcher {
    pub fn new(pool: EgressPool, policy: RetryPolicy) -> Self {
        Self { pool, policy }
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        let pool = EgressPool::build(&config.proxies, config.timeout(), &config.user_agent)?;
        Ok(Self::new(pool, RetryPolicy::from_config(config)))
    }

    /// GET `url` with `query` and no extra headers
    pub async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
        self.fetch(url, query, &HeaderMap::new()).await
    }

    /// GET `url` with `query` and per-request `headers`, decoding the body as JSON
    pub async fn fetch(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &HeaderMap,
    ) -> Result<Value, FetchError> {
        let (mut index, mut egress) = self.pool.current();
        let mut attempts = 0u32;
        let mut transient_failures = 0u32;
        let mut refusals = 0usize;

        loop {
            attempts += 1;
            debug!(url, egress = %egress.label, attempt = attempts, "Fetching");

            let error = match self.attempt(egress, url, query, headers).await {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };

            match error {
                FetchError::Forbidden { .. } => {
                    refusals += 1;
                    if refusals >= self.pool.len() {
                        return Err(FetchError::Exhausted {
                            url: url.to_string(),
                            attempts,
                            last: format!("all {} egress points refused", self.pool.len()),
                        });
                    }

                    let refused = egress.label.clone();
                    (index, egress) = self.pool.rotate_from(index);
                    warn!(url, refused = %refused, next = %egress.label, "Forbidden, rotating egress");
                },
                FetchError::Transient { ref reason, .. } => {
                    transient_failures += 1;
                    if !self.policy.should_retry(transient_failures) {
                        return Err(FetchError::Exhausted {
                            url: url.to_string(),
                            attempts,
                            last: reason.clone(),
                        });
                    }

                    let delay = self.policy.delay_for(transient_failures);
                    warn!(
                        url,
                        attempt = transient_failures,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure: {}. Retrying",
                        reason
                    );
                    tokio::time::sleep(delay).await;
                },
                other => return Err(other),
            }
        }
    }

    async fn attempt(
        &self,
        egress: &Egress,
        url: &str,
        query: &[(&str, String)],
        headers: &HeaderMap,
    ) -> Result<Value, FetchError> {
        let response = egress
            .client
            .get(url)
            .query(query)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| classify_send_error(url, e))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(FetchError::Forbidden {
                url: url.to_string(),
                egress: egress.label.clone(),
            });
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::Transient {
                url: url.to_string(),
                reason: format!("status {}", status.as_u16()),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Rejected {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| classify_send_error(url, e))?;

        serde_json::from_slice(&body).map_err(|e| FetchError::InvalidBody {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

fn classify_send_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
        FetchError::Transient {
            url: url.to_string(),
            reason: error.to_string(),
        }
    } else {
        FetchError::Client(error)
    }
}
