//! Error types for the collaborator seams of the pipeline
//!
//! None of these abort the work queue except `FetchError::QuotaExceeded`,
//! which disables it until the next drain. An id that cannot be resolved is
//! not an error at all: resolution returns `Outcome::NoMatch`.

use std::path::PathBuf;

use thiserror::Error;

/// Failures talking to the artwork image service or writing its output
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("image service refused the request (HTTP {status}): {body}")]
    QuotaExceeded { status: u16, body: String },

    #[error("artwork not available (HTTP {0})")]
    NotAvailable(u16),

    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures from a title search provider or id translation
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("provider returned HTTP {0}")]
    Status(u16),

    #[error("provider rate limit exceeded")]
    RateLimited,

    #[error("provider is not configured: {0}")]
    NotConfigured(&'static str),
}

/// Technical probe failures; badge derivation is skipped but fetching continues
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run ffprobe: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("ffprobe failed for '{path}': {message}")]
    Failed { path: PathBuf, message: String },

    #[error("failed to decode probe output: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum MediaServerError {
    #[error("media server is not configured")]
    NotConfigured,

    #[error("media server request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("media server returned HTTP {0}")]
    Status(u16),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rejections from scan and re-match requests
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("a full scan was started less than 5 seconds ago")]
    TooSoon,

    #[error("a full scan is already running")]
    AlreadyRunning,

    #[error("'{0}' is not a valid IMDb id")]
    InvalidId(String),

    #[error("no folder named '{0}' in the media folders")]
    FolderNotFound(String),

    #[error("no API key configured for the image service")]
    MissingApiKey,
}
