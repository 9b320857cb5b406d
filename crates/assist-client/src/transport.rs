//! HTTP transport.
//!
//! A [`Transport`] turns an [`HttpRequest`] into a cancellable JSON result.
//! [`HttpTransport`] runs each exchange on its own tokio task so the request
//! can be aborted through the returned operation.

use std::fmt;
use std::time::Duration;

use assist_cache::CancellableOperation;
use assist_core::{FetchError, FetchResult};
use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// A request against the console API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    /// Path and query, relative to the console base URL.
    pub url: String,
    /// Form fields of POST requests.
    pub form: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            form: Vec::new(),
            timeout: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(url)
        }
    }

    /// Adds a form field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Value of a form field, if present.
    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Sends requests to the console.
pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> CancellableOperation<Value>;
}

/// `reqwest` based transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Creates a transport for `base_url` with a default request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn execute(client: reqwest::Client, url: String, request: HttpRequest) -> FetchResult<Value> {
        let mut builder = match request.method {
            Method::Get => client.get(&url),
            Method::Post => client.post(&url).form(&request.form),
        };
        builder = builder.header(ACCEPT, "application/json");
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| match request.timeout {
            Some(timeout) if e.is_timeout() => FetchError::TimedOut(timeout),
            _ => FetchError::transport(e.to_string()),
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::transport(e.to_string()))?;
        trace!(status = %status, bytes = body.len(), "Response received");

        if !status.is_success() {
            return Err(FetchError::http(
                status.as_u16(),
                status.canonical_reason().unwrap_or_default(),
                body,
            ));
        }

        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: HttpRequest) -> CancellableOperation<Value> {
        let url = format!("{}{}", self.base_url, request.url);
        debug!(method = %request.method, url = %url, "Sending request");

        let task = tokio::spawn(Self::execute(self.client.clone(), url, request));
        let abort = task.abort_handle();

        CancellableOperation::new(async move {
            match task.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(FetchError::Aborted),
                Err(e) => Err(FetchError::transport(e.to_string())),
            }
        })
        .with_request(abort)
    }
}
