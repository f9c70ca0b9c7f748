//! Rate-limited HTTP fetch client
//!
//! This module handles all requests to the upstream API, including:
//! - Building the HTTP client with the configured user agent and timeouts
//! - Linear backoff on HTTP 429
//! - Bounded retries on timeouts
//! - Error classification into the crawl failure taxonomy
//! - The mandatory delay after every logical request

use crate::config::{ApiConfig, CrawlerConfig};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Upstream API endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Archive metadata: earliest/latest dates and notice count
    Info,
    /// Notices published on one date
    ListByDate,
    /// Full-text search over tender titles
    SearchByTitle,
    /// Search by awarded/bidding company name
    SearchByCompany,
    /// One tender's detail document
    Tender,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Info => "getinfo",
            Self::ListByDate => "listbydate",
            Self::SearchByTitle => "searchbytitle",
            Self::SearchByCompany => "searchbycompanyname",
            Self::Tender => "tender",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// Terminal failure of one logical request
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rate limited by {endpoint} after {attempts} attempts")]
    RateLimited { endpoint: Endpoint, attempts: u32 },

    #[error("{endpoint} timed out after {attempts} attempts")]
    Timeout { endpoint: Endpoint, attempts: u32 },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: Endpoint, status: u16 },

    #[error("transport error on {endpoint}: {message}")]
    Transport { endpoint: Endpoint, message: String },

    #[error("undecodable response from {endpoint}: {message}")]
    Decode { endpoint: Endpoint, message: String },
}

/// Failure classes the crawlers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    RateLimited,
    Timeout,
    Transport,
    Decode,
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Status { .. } | Self::Transport { .. } => FailureKind::Transport,
            Self::Decode { .. } => FailureKind::Decode,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::RateLimited => "rate limited",
            Self::Timeout => "timeout",
            Self::Transport => "network error",
            Self::Decode => "decode error",
        };
        write!(f, "{}", label)
    }
}

/// Pacing and retry settings for one client
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub rate_limit_backoff: Duration,
    pub timeout_retry_delay: Duration,
    pub request_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            rate_limit_backoff: config.rate_limit_backoff(),
            timeout_retry_delay: config.timeout_retry_delay(),
            request_delay: config.request_delay(),
        }
    }

    /// Wait after the `attempt`-th (1-based) consecutive 429
    pub fn rate_limit_wait(&self, attempt: u32) -> Duration {
        self.rate_limit_backoff.saturating_mul(attempt)
    }
}

/// How a single HTTP attempt ended
enum Attempt {
    Done(Result<Value, FetchError>),
    RateLimited,
    TimedOut,
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use pcc_harvest::config::ApiConfig;
/// use pcc_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&ApiConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &ApiConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.request_timeout())
        .connect_timeout(config.connect_timeout())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Client for one upstream API, shared by every crawl pass of a run
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    base_url: String,
    policy: RetryPolicy,
}

impl FetchClient {
    pub fn new(api: &ApiConfig, crawler: &CrawlerConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(
            build_http_client(api)?,
            &api.base_url,
            RetryPolicy::from_config(crawler),
        ))
    }

    pub fn with_client(client: Client, base_url: &str, policy: RetryPolicy) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn endpoint_url(&self, endpoint: Endpoint) -> String {
        format!("{}/{}", self.base_url, endpoint.path())
    }

    /// Issues one logical request and parses the JSON body
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 429 | Sleep `backoff * attempt`, retry up to `max_attempts` → RateLimited |
    /// | Timeout | Sleep fixed delay, retry up to `max_attempts` → Timeout |
    /// | Other HTTP error | Immediate → Status |
    /// | Connection/DNS error | Immediate → Transport |
    /// | Body is not JSON | Immediate → Decode |
    ///
    /// Whatever the outcome, the configured request delay elapses before
    /// this returns.
    pub async fn fetch(
        &self,
        endpoint: Endpoint,
        params: &[(&str, &str)],
    ) -> Result<Value, FetchError> {
        let result = self.fetch_with_retry(endpoint, params).await;

        if !self.policy.request_delay.is_zero() {
            tokio::time::sleep(self.policy.request_delay).await;
        }

        result
    }

    async fn fetch_with_retry(
        &self,
        endpoint: Endpoint,
        params: &[(&str, &str)],
    ) -> Result<Value, FetchError> {
        let url = self.endpoint_url(endpoint);
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.attempt(endpoint, &url, params).await {
                Attempt::Done(result) => return result,

                Attempt::RateLimited => {
                    if attempt >= max_attempts {
                        return Err(FetchError::RateLimited {
                            endpoint,
                            attempts: attempt,
                        });
                    }
                    let wait = self.policy.rate_limit_wait(attempt);
                    tracing::warn!(
                        "{} {:?}: too many requests, waiting {:?} before retry {}/{}",
                        endpoint,
                        params,
                        wait,
                        attempt + 1,
                        max_attempts
                    );
                    tokio::time::sleep(wait).await;
                }

                Attempt::TimedOut => {
                    if attempt >= max_attempts {
                        return Err(FetchError::Timeout {
                            endpoint,
                            attempts: attempt,
                        });
                    }
                    tracing::debug!(
                        "{} {:?}: timed out, retry {}/{}",
                        endpoint,
                        params,
                        attempt + 1,
                        max_attempts
                    );
                    tokio::time::sleep(self.policy.timeout_retry_delay).await;
                }
            }
        }
    }

    async fn attempt(&self, endpoint: Endpoint, url: &str, params: &[(&str, &str)]) -> Attempt {
        let response = match self.client.get(url).query(params).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Attempt::TimedOut,
            Err(e) => {
                return Attempt::Done(Err(FetchError::Transport {
                    endpoint,
                    message: e.to_string(),
                }))
            }
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Attempt::RateLimited;
        }

        if !status.is_success() {
            return Attempt::Done(Err(FetchError::Status {
                endpoint,
                status: status.as_u16(),
            }));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => return Attempt::TimedOut,
            Err(e) => {
                return Attempt::Done(Err(FetchError::Transport {
                    endpoint,
                    message: e.to_string(),
                }))
            }
        };

        Attempt::Done(
            serde_json::from_str(&body).map_err(|e| FetchError::Decode {
                endpoint,
                message: e.to_string(),
            }),
        )
    }
}
