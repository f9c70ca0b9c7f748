//! pcc-harvest: a resumable bulk crawler for the procurement notice API
//!
//! This crate walks the date-indexed listing endpoint and the per-tender
//! detail endpoint of the public procurement API, writing every fetched
//! record to append-only JSON-lines files and tracking completed units of
//! work in checkpoint files so an interrupted crawl resumes where it stopped.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for pcc-harvest operations
///
/// Per-unit fetch failures never reach this type during a crawl; they are
/// recorded against the unit and the crawl moves on. What does surface here
/// is fatal for the run.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Output directory {} is not usable: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Input file not found: {}", .0.display())]
    MissingInput(PathBuf),
}

/// Result type alias for pcc-harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{FailureKind, FetchClient, FetchError};
pub use state::{DateKey, DateRange, DetailKey, UnitState};
