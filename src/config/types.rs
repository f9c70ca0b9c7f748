use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for pcc-harvest
///
/// Every table and key is optional; a missing config file behaves like an
/// empty one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Upstream API connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL the endpoint names are appended to
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// User agent sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Whole-request timeout (milliseconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Connection establishment timeout (milliseconds)
    #[serde(rename = "connect-timeout", default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

/// Crawl pacing, retry and checkpoint policy
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Delay applied after every logical request (milliseconds)
    #[serde(rename = "request-delay", default = "default_request_delay")]
    pub request_delay: u64,

    /// Attempts per logical request before a rate limit or timeout is terminal
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the linear backoff applied on HTTP 429 (milliseconds)
    #[serde(rename = "rate-limit-backoff", default = "default_rate_limit_backoff")]
    pub rate_limit_backoff: u64,

    /// Fixed sleep between timed-out attempts (milliseconds)
    #[serde(rename = "timeout-retry-delay", default = "default_timeout_retry_delay")]
    pub timeout_retry_delay: u64,

    /// Cooldown before the next unit once rate limiting is exhausted (milliseconds)
    #[serde(rename = "rate-limit-cooldown", default = "default_rate_limit_cooldown")]
    pub rate_limit_cooldown: u64,

    /// Pause before the next unit after any other failure (milliseconds)
    #[serde(rename = "failure-pause", default = "default_failure_pause")]
    pub failure_pause: u64,

    /// List-pass units processed between checkpoint flushes
    #[serde(rename = "checkpoint-interval", default = "default_checkpoint_interval")]
    pub checkpoint_interval: u32,

    /// Detail-pass completions between sink and checkpoint flushes
    #[serde(rename = "detail-batch-size", default = "default_detail_batch_size")]
    pub detail_batch_size: u32,

    /// Failures after which a unit is abandoned (0 retries forever)
    #[serde(rename = "max-unit-failures", default)]
    pub max_unit_failures: u32,

    /// Length of the recent-days window
    #[serde(rename = "recent-days", default = "default_recent_days")]
    pub recent_days: u32,

    /// Page cap for keyword searches
    #[serde(rename = "search-max-pages", default = "default_search_max_pages")]
    pub search_max_pages: u32,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory holding record files, checkpoints and the run lock
    #[serde(default = "default_output_directory")]
    pub directory: String,
}

impl CrawlerConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff)
    }

    pub fn timeout_retry_delay(&self) -> Duration {
        Duration::from_millis(self.timeout_retry_delay)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_millis(self.rate_limit_cooldown)
    }

    pub fn failure_pause(&self) -> Duration {
        Duration::from_millis(self.failure_pause)
    }

    /// The abandon threshold, if one is configured
    pub fn abandon_after(&self) -> Option<u32> {
        (self.max_unit_failures > 0).then_some(self.max_unit_failures)
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            request_delay: default_request_delay(),
            max_attempts: default_max_attempts(),
            rate_limit_backoff: default_rate_limit_backoff(),
            timeout_retry_delay: default_timeout_retry_delay(),
            rate_limit_cooldown: default_rate_limit_cooldown(),
            failure_pause: default_failure_pause(),
            checkpoint_interval: default_checkpoint_interval(),
            detail_batch_size: default_detail_batch_size(),
            max_unit_failures: 0,
            recent_days: default_recent_days(),
            search_max_pages: default_search_max_pages(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
        }
    }
}

fn default_base_url() -> String {
    "https://pcc-api.openfun.app/api".to_string()
}

fn default_user_agent() -> String {
    format!("pcc-harvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_request_delay() -> u64 {
    500
}

fn default_max_attempts() -> u32 {
    3
}

fn default_rate_limit_backoff() -> u64 {
    10_000
}

fn default_timeout_retry_delay() -> u64 {
    5_000
}

fn default_rate_limit_cooldown() -> u64 {
    30_000
}

fn default_failure_pause() -> u64 {
    5_000
}

fn default_checkpoint_interval() -> u32 {
    100
}

fn default_detail_batch_size() -> u32 {
    1000
}

fn default_recent_days() -> u32 {
    7
}

fn default_search_max_pages() -> u32 {
    100
}

fn default_output_directory() -> String {
    "pcc_data".to_string()
}
