//! Typed errors for the harvester library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can tell
//! per-listing failures apart from failures that must abort a run.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a harvest run or one of its setup steps.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Configuration could not be loaded
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Persistence layer failed in a way that threatens data integrity
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Descriptor input could not be read or parsed
    #[error("invalid input {path}: {reason}")]
    Input { path: PathBuf, reason: String },

    /// Run was cancelled before the input was exhausted
    #[error("harvest cancelled")]
    Cancelled,
}

/// Why a single listing could not be fetched.
///
/// Never aborts a run: the listing is reported and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// Non-200 status that is not rate limiting; retrying will not help
    #[error("unexpected status {code}")]
    UnexpectedStatus { code: u16 },

    /// Every attempt hit a transient condition
    #[error("retries exhausted after {attempts} attempts (last: {last_error})")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl FetchFailure {
    /// Short machine-readable reason, used in logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnexpectedStatus { .. } => "unexpected_status",
            Self::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

/// Network-level failure of one request attempt. Always transient.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request or body read exceeded the per-request timeout
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// Could not connect (refused, reset, DNS)
    #[error("connection failed for {url}: {message}")]
    Connect { url: String, message: String },

    /// Any other request failure
    #[error("request failed for {url}: {message}")]
    Request { url: String, message: String },
}

impl TransportError {
    /// Classify a `reqwest` error for the given URL.
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if err.is_connect() {
            Self::Connect {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            Self::Request {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Errors from the append log and snapshot files.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record could not be serialized
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Append failed twice in a row; the run must stop
    #[error("failed to append {url} to {path}: {source}")]
    WriteFailed {
        url: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Existing snapshot is not a JSON array of records
    #[error("malformed snapshot {path}: {reason}")]
    MalformedSnapshot { path: PathBuf, reason: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Invalid configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable present but unparseable
    #[error("{name} has invalid value {value:?}: {reason}")]
    InvalidEnv {
        name: String,
        value: String,
        reason: String,
    },

    /// Value parsed but out of the accepted range
    #[error("{field} out of range: {reason}")]
    OutOfRange { field: &'static str, reason: String },
}

/// Result type alias for harvest operations.
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchFailure>;

/// Result type alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
