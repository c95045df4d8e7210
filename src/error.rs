//! Error types for alidns-sync
//!
//! Every failure inside a reconciliation cycle is one of four kinds. None of
//! them is retried in place; the next scheduled cycle is the retry.

use thiserror::Error;

/// Result type alias for alidns-sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration field
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport failure reaching the discovery endpoint or the DNS API
    #[error("Network error: {0}")]
    Network(String),

    /// Remote service answered with a non-success status
    #[error("Upstream error (HTTP {status}): {body}")]
    Upstream {
        /// HTTP status code
        status: u16,
        /// Response body, kept as the diagnostic message
        body: String,
    },

    /// Response body could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a configuration error naming a missing field
    pub fn missing(field: &str) -> Self {
        Self::Config(format!("missing required field `{field}`"))
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create an upstream error from a status code and response body
    pub fn upstream(status: u16, body: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            body: body.into(),
        }
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Network(_) => "network",
            Self::Upstream { .. } => "upstream",
            Self::Parse(_) => "parse",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
