//! Error types for hn-digest
//!
//! This module provides the crate-wide error enum plus focused sub-enums for
//! each external collaborator:
//! - [`FetchError`] for item-store lookups (absorbed by the comment fetcher)
//! - [`GenerationError`] for the text-generation backend
//! - [`DeliveryError`] for the outbound messaging channel

use thiserror::Error;

/// Result type alias for hn-digest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for hn-digest
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error, including caller contract violations such as a zero
    /// fan-out cap or a zero chunk length
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "fetch.max_depth")
        key: Option<String>,
    },

    /// Item store lookup failed
    #[error("item store error: {0}")]
    Fetch(#[from] FetchError),

    /// Text-generation backend failed
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Outbound delivery failed
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML config parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Config file watching error
    #[error("config watch error: {0}")]
    ConfigWatch(String),

    /// Digest or story not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress
    #[error("shutdown in progress")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a [`Error::Config`] tied to a config key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Item store lookup failures
///
/// Every variant is a soft failure from the comment fetcher's point of view:
/// the id is dropped and recorded, never propagated.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The request exceeded its per-request timeout
    #[error("request timed out")]
    Timeout,

    /// Connection or transport-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The store answered with a non-success status
    #[error("unexpected status {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// The document could not be decoded
    #[error("malformed document: {0}")]
    Malformed(String),

    /// The store answered with an empty (`null`) document
    #[error("item does not exist")]
    Missing,
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Status {
                status: status.as_u16(),
            }
        } else if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Text-generation backend failures
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The backend answered with a non-success status
    #[error("backend returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },

    /// The backend answered without any choices
    #[error("backend returned no choices")]
    EmptyResponse,

    /// The backend reply could not be decoded
    #[error("malformed backend reply: {0}")]
    Malformed(String),
}

/// Outbound delivery failures
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The channel answered with a non-success status
    #[error("channel returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },

    /// The channel accepted the request but refused the message
    #[error("message rejected: {description}")]
    Rejected {
        /// Description reported by the channel
        description: String,
    },
}
