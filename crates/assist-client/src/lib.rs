//! Assist Client - console API endpoint wrappers.
//!
//! This crate provides:
//!
//! - [`ApiClient`]: file browser, repository, HBase, SQL metadata, optimizer
//!   and search endpoints on top of the Assist cache
//! - [`Transport`] and the `reqwest` based [`HttpTransport`]
//! - [`ClientConfig`]: layered configuration (defaults, file, environment)

pub mod api;
pub mod config;
pub mod error;
pub mod transport;

pub use api::{ApiClient, CallOptions, ClearDbCache, GitFileType, PathListing, SearchQuery};
pub use config::{ClientConfig, ENV_PREFIX};
pub use error::ClientError;
pub use transport::{HttpRequest, HttpTransport, Method, Transport};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
