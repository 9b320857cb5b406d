//! Client configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! file (format picked from its extension), then `ASSIST_*` environment
//! variables. Nested keys use `__`, e.g. `ASSIST_CACHE__TTL_OVERRIDE_MS`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use assist_cache::CacheConfig;
use assist_core::Identity;
use config::{Config, Environment, File};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Prefix of the environment variables read by [`ClientConfig::load`].
pub const ENV_PREFIX: &str = "ASSIST";

/// Configuration of the console client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Console base URL (default: `http://localhost:8888`)
    pub base_url: String,
    /// Logged in user, part of every cache namespace.
    pub user: String,
    /// Host part of cache namespaces. Defaults to the base URL host.
    pub host: Option<String>,
    /// Directory of the persistent cache. In memory when unset.
    pub storage_dir: Option<PathBuf>,
    /// Transport timeout of every request, in seconds (default: 60)
    pub request_timeout_seconds: u64,
    /// Page size of file browser listings (default: 500)
    pub page_size: u32,
    pub cache: CacheConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8888".to_string(),
            user: "admin".to_string(),
            host: None,
            storage_dir: None,
            request_timeout_seconds: 60,
            page_size: 500,
            cache: CacheConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Loads the configuration from an optional file and the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ClientError> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load) but reading variables from `env` instead of
    /// the process environment when given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ClientError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the base URL is absolute.
    pub fn validate(&self) -> Result<(), ClientError> {
        self.parsed_base_url().map(|_| ())
    }

    /// Identity used for cache namespaces.
    pub fn identity(&self) -> Identity {
        let host = self.host.clone().unwrap_or_else(|| {
            self.parsed_base_url()
                .ok()
                .and_then(|url| url.host_str().map(str::to_string))
                .unwrap_or_else(|| "localhost".to_string())
        });
        Identity::new(self.user.clone(), host)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    fn parsed_base_url(&self) -> Result<Url, ClientError> {
        Url::parse(&self.base_url).map_err(|e| ClientError::invalid_url(&self.base_url, e))
    }
}
