use crate::config::types::{ApiConfig, Config, CrawlerConfig, OutputConfig};
use crate::ConfigError;
use url::Url;

/// Upper bound for every pause, backoff and delay setting (one day)
pub const MAX_WAIT_MS: u64 = 24 * 60 * 60 * 1000;

/// Upper bound for the recent-days window (about a century)
pub const MAX_RECENT_DAYS: u32 = 36_500;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates upstream API settings
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout == 0 {
        return Err(ConfigError::Validation(
            "request-timeout must be > 0ms".to_string(),
        ));
    }

    if config.connect_timeout == 0 {
        return Err(ConfigError::Validation(
            "connect-timeout must be > 0ms".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawl pacing and checkpoint policy
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 20 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be between 1 and 20, got {}",
            config.max_attempts
        )));
    }

    for (name, value) in [
        ("request-delay", config.request_delay),
        ("rate-limit-backoff", config.rate_limit_backoff),
        ("timeout-retry-delay", config.timeout_retry_delay),
        ("rate-limit-cooldown", config.rate_limit_cooldown),
        ("failure-pause", config.failure_pause),
    ] {
        if value > MAX_WAIT_MS {
            return Err(ConfigError::Validation(format!(
                "{} must be <= {}ms, got {}",
                name, MAX_WAIT_MS, value
            )));
        }
    }

    if config.checkpoint_interval < 1 {
        return Err(ConfigError::Validation(format!(
            "checkpoint-interval must be >= 1, got {}",
            config.checkpoint_interval
        )));
    }

    if config.detail_batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "detail-batch-size must be >= 1, got {}",
            config.detail_batch_size
        )));
    }

    if config.recent_days < 1 || config.recent_days > MAX_RECENT_DAYS {
        return Err(ConfigError::Validation(format!(
            "recent-days must be between 1 and {}, got {}",
            MAX_RECENT_DAYS, config.recent_days
        )));
    }

    if config.search_max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "search-max-pages must be >= 1, got {}",
            config.search_max_pages
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    Ok(())
}
