//! Assist Core - Domain types and error taxonomy
//!
//! This crate provides the foundational types shared by the Assist cache
//! and the console API client:
//!
//! - [`SourceType`], [`CacheType`] and [`Identity`], the coordinates of
//!   every cache namespace
//! - [`FetchError`], the single error type seen by callers of cached fetches,
//!   including message normalization for the error callback contract
//! - the [`envelope`] rules that decide when a successful HTTP response is
//!   in fact a backend error

pub mod envelope;
pub mod error;
pub mod types;

pub use error::{FetchError, FetchResult, StorageError, UNKNOWN_ERROR_MESSAGE};
pub use types::{CacheType, Identity, SourceType};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
