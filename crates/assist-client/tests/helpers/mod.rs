//! Test helpers for assist-client.
//!
//! `MockConsole` runs an axum backend on an ephemeral port that answers with
//! canned responses per path and records every request it receives.

#![allow(dead_code, unused_imports)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use assist_cache::{CacheConfig, EventBus, MemoryStorage};
use assist_client::{ApiClient, HttpTransport};
use assist_core::Identity;
use axum::Router;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri, header};
use axum::response::IntoResponse;
use parking_lot::Mutex;
use serde_json::Value;

/// Canned response.
#[derive(Debug, Clone)]
pub struct Canned {
    pub status: StatusCode,
    pub body: String,
    pub delay: Duration,
}

impl Canned {
    pub fn json(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            ..Self::json(body)
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Request seen by the backend.
#[derive(Debug, Clone)]
pub struct Received {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub body: String,
}

impl Received {
    /// Decoded field of an urlencoded form body.
    pub fn form_value(&self, name: &str) -> Option<String> {
        self.body.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == name).then(|| {
                urlencoding::decode(&value.replace('+', " "))
                    .map(|v| v.into_owned())
                    .unwrap_or_default()
            })
        })
    }
}

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<String, Canned>>,
    received: Mutex<Vec<Received>>,
}

/// Simulated console backend.
pub struct MockConsole {
    base_url: String,
    state: Arc<MockState>,
}

impl MockConsole {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sets the response for `path` (without query).
    pub fn route(&self, path: &str, canned: Canned) {
        self.state.routes.lock().insert(path.to_string(), canned);
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state
            .received
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    pub fn received(&self) -> Vec<Received> {
        self.state.received.lock().clone()
    }

    /// In-memory client against this backend.
    pub fn client(&self) -> ApiClient {
        let transport = HttpTransport::new(self.base_url.clone(), Duration::from_secs(10)).unwrap();
        ApiClient::with_storage(
            Arc::new(transport),
            Arc::new(MemoryStorage::new()),
            CacheConfig::default(),
            Identity::new("alice", "127.0.0.1"),
            EventBus::new(),
            500,
        )
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    body: String,
) -> impl IntoResponse {
    state.received.lock().push(Received {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        body,
    });

    let canned = state.routes.lock().get(uri.path()).cloned();
    let Some(canned) = canned else {
        return (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/html")],
            "<html>Not Found</html>".to_string(),
        );
    };

    if !canned.delay.is_zero() {
        tokio::time::sleep(canned.delay).await;
    }
    (
        canned.status,
        [(header::CONTENT_TYPE, "application/json")],
        canned.body,
    )
}

/// Collects error messages.
#[derive(Clone, Default)]
pub struct Messages(Arc<Mutex<Vec<String>>>);

impl Messages {
    pub fn callback(&self) -> impl Fn(&str) + Send + Sync + 'static {
        let messages = self.0.clone();
        move |message: &str| messages.lock().push(message.to_string())
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}
