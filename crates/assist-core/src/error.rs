//! Error types for Assist.
//!
//! Every failure a caller of a cached fetch can observe is a [`FetchError`].
//! Backends report errors in several shapes (HTTP failures with a JSON or
//! HTML body, `200 OK` envelopes carrying a traceback or a non-zero status,
//! client side timeouts...). [`FetchError::message`] collapses all of them
//! into the single human readable string handed to error callbacks.
//!
//! # Example
//!
//! ```
//! use assist_core::FetchError;
//! use serde_json::json;
//!
//! let error = FetchError::Backend(json!({ "status": 1, "message": "Table not found" }));
//! assert_eq!(error.message(), "Table not found");
//! assert_eq!(error.status(), Some(1));
//! ```

use std::io;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Message used when no better description can be extracted.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error occurred";

/// Result alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Errors produced by cached fetches and the transports behind them.
///
/// The type is `Clone` because one in-flight request may be shared by many
/// callers, and each of them receives the same outcome.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The HTTP exchange failed, or the server answered with an error status.
    #[error("request failed: {status_text}")]
    Transport {
        /// HTTP status code, when a response was received.
        status: Option<u16>,
        /// Short description of the failure (reason phrase or client error).
        status_text: String,
        /// Raw response body, when one was received.
        body: Option<String>,
    },

    /// The request was aborted by its caller.
    #[error("request aborted")]
    Aborted,

    /// The request did not complete within its timeout.
    #[error("request timed out after {0:?}")]
    TimedOut(Duration),

    /// The backend answered successfully at the HTTP level but the payload
    /// describes an error (traceback, non-zero status, 500/503 code).
    #[error("backend error: {}", extract_message(.0))]
    Backend(Value),

    /// Cached-only lookup found no fresh entry.
    #[error("not available in cache")]
    NotAvailable,

    /// The call was configured with a zero timeout and never attempted.
    #[error("request not attempted")]
    NotAttempted,

    /// The request was issued without a source type.
    #[error("no source type supplied")]
    MissingSourceType,

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),
}

impl FetchError {
    /// Creates a transport error without a response.
    pub fn transport(status_text: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            status_text: status_text.into(),
            body: None,
        }
    }

    /// Creates a transport error for an HTTP error response.
    pub fn http(status: u16, status_text: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Transport {
            status: Some(status),
            status_text: status_text.into(),
            body: Some(body.into()),
        }
    }

    /// Returns the numeric status associated with the error, if any.
    ///
    /// HTTP failures report the HTTP status, backend envelopes their
    /// `status` field, and calls that were never attempted report `-1`.
    pub fn status(&self) -> Option<i64> {
        match self {
            Self::Transport { status, .. } => status.map(i64::from),
            Self::Backend(value) => value.get("status").and_then(Value::as_i64),
            Self::NotAttempted => Some(-1),
            _ => None,
        }
    }

    /// Returns true if the caller aborted the request.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Returns true for the cached-only miss sentinel.
    pub fn is_not_available(&self) -> bool {
        matches!(self, Self::NotAvailable)
    }

    /// Returns true if the error should reach error callbacks.
    ///
    /// Aborts are intentional and cached-only misses are expected, so
    /// neither is reported.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, Self::Aborted | Self::NotAvailable)
    }

    /// Normalizes the error into a single human readable message.
    ///
    /// The first available of: the structured `message` field of a JSON
    /// body, the raw response body, the status text, an `error` string.
    pub fn message(&self) -> String {
        match self {
            Self::Transport {
                body: Some(body), ..
            } => match serde_json::from_str::<Value>(body) {
                Ok(parsed) => match parsed.get("message") {
                    Some(Value::String(message)) => message.clone(),
                    Some(message) if !message.is_null() => message.to_string(),
                    _ => body.clone(),
                },
                Err(_) => body.clone(),
            },
            Self::Transport { status_text, .. } if !status_text.is_empty() => status_text.clone(),
            Self::Transport { .. } => UNKNOWN_ERROR_MESSAGE.to_string(),
            Self::Aborted => "abort".to_string(),
            Self::TimedOut(_) => "timeout".to_string(),
            Self::Backend(value) => extract_message(value),
            Self::NotAvailable => "not available".to_string(),
            Self::NotAttempted => UNKNOWN_ERROR_MESSAGE.to_string(),
            Self::MissingSourceType => "No source type supplied".to_string(),
            Self::Decode(reason) => reason.clone(),
        }
    }
}

/// Extracts a message from a backend error envelope.
fn extract_message(value: &Value) -> String {
    if let Value::String(message) = value {
        return message.clone();
    }

    ["message", "statusText", "error"]
        .iter()
        .find_map(|field| value.get(*field).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string())
}

/// Errors raised by persistent storage backends.
///
/// These never reach callers of cached fetches: caching is best-effort and
/// storage failures are logged and swallowed.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored blob could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Writing the blob would exceed the storage quota.
    #[error("storage quota exceeded: {needed} bytes needed, quota is {quota} bytes")]
    QuotaExceeded {
        /// Total bytes the storage would hold after the write.
        needed: usize,
        /// Configured quota in bytes.
        quota: usize,
    },
}

impl StorageError {
    /// Creates a new quota error.
    pub fn quota(needed: usize, quota: usize) -> Self {
        Self::QuotaExceeded { needed, quota }
    }
}
