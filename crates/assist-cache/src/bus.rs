//! Invalidation signals and UI notifications.

use std::sync::Arc;

use assist_core::{CacheType, Identity, SourceType};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::invalidation::InvalidationResult;
use crate::keyed_cache::KeyedCache;
use crate::namespace::Namespace;

const BUS_CAPACITY: usize = 64;

/// Messages exchanged over the [`EventBus`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistEvent {
    /// Clear one namespace.
    ClearSource {
        source_type: SourceType,
        #[serde(default)]
        cache_type: CacheType,
    },
    /// Drop one key of a namespace.
    ClearKey {
        source_type: SourceType,
        #[serde(default)]
        cache_type: CacheType,
        key: String,
    },
    /// Drop every key of a namespace matching a glob.
    ClearPattern {
        source_type: SourceType,
        #[serde(default)]
        cache_type: CacheType,
        pattern: String,
    },
    /// Clear every registered namespace.
    ClearAll,
    /// Emitted after a clear signal was handled.
    CacheCleared {
        source_type: Option<SourceType>,
        count: usize,
    },
    /// Emitted for every non silenced error.
    ErrorReported { message: String },
}

/// Process wide publish/subscribe channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AssistEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Publishes an event. Returns how many subscribers received it.
    pub fn publish(&self, event: AssistEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AssistEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle of a running listener. Stopping (or dropping) it unsubscribes.
pub struct SubscriptionHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl SubscriptionHandle {
    /// Signals the listener to stop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Clears cache namespaces in response to bus signals.
#[derive(Debug, Clone)]
pub struct InvalidationListener {
    cache: Arc<KeyedCache>,
    identity: Identity,
    bus: EventBus,
}

impl InvalidationListener {
    pub fn new(cache: Arc<KeyedCache>, identity: Identity, bus: EventBus) -> Self {
        Self { cache, identity, bus }
    }

    /// Subscribes to the bus and handles signals on a background task.
    ///
    /// The subscription is active as soon as this returns.
    pub fn start(self) -> SubscriptionHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let events = self.bus.subscribe();

        tokio::spawn(self.run(events, shutdown_rx));

        SubscriptionHandle { shutdown_tx }
    }

    async fn run(
        self,
        mut events: broadcast::Receiver<AssistEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!(identity = %self.identity, "Cache invalidation listener started");

        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => {
                        self.handle(&event);
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Invalidation listener lagged behind");
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("Cache invalidation listener shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Applies one signal. Returns `None` for events that are not clear
    /// signals.
    pub fn handle(&self, event: &AssistEvent) -> Option<InvalidationResult> {
        let (source_type, result) = match event {
            AssistEvent::ClearSource {
                source_type,
                cache_type,
            } => {
                let namespace = self.namespace(source_type, *cache_type);
                let count = self.cache.entry_count(&namespace);
                self.cache.clear(&namespace);
                let result = InvalidationResult {
                    count,
                    patterns: vec![namespace.storage_key()],
                };
                (Some(source_type.clone()), result)
            },
            AssistEvent::ClearKey {
                source_type,
                cache_type,
                key,
            } => {
                let removed = self
                    .cache
                    .invalidate(&self.namespace(source_type, *cache_type), key);
                let result = InvalidationResult {
                    count: usize::from(removed),
                    patterns: vec![key.clone()],
                };
                (Some(source_type.clone()), result)
            },
            AssistEvent::ClearPattern {
                source_type,
                cache_type,
                pattern,
            } => {
                let result = self
                    .cache
                    .invalidate_by_pattern(&self.namespace(source_type, *cache_type), pattern);
                (Some(source_type.clone()), result)
            },
            AssistEvent::ClearAll => (None, self.cache.clear_all(&self.identity)),
            AssistEvent::CacheCleared { .. } | AssistEvent::ErrorReported { .. } => return None,
        };

        debug!(source_type = ?source_type, count = result.count, "Handled clear signal");
        self.bus.publish(AssistEvent::CacheCleared {
            source_type,
            count: result.count,
        });
        Some(result)
    }

    fn namespace(&self, source_type: &SourceType, cache_type: CacheType) -> Namespace {
        Namespace::new(source_type.clone(), self.identity.clone()).with_cache_type(cache_type)
    }
}
