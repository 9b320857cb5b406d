//! Error types for the console client.

use assist_core::{FetchError, StorageError};
use thiserror::Error;

/// Errors raised while setting up or driving the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration could not be loaded or deserialized.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The console base URL is not a valid absolute URL.
    #[error("invalid base url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The cache storage directory could not be opened.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A request failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Invalid command line usage.
    #[error("{0}")]
    Usage(String),
}

impl ClientError {
    pub fn invalid_url(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }
}
