//! Test helpers for assist-cache.

#![allow(dead_code, unused_imports)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use assist_cache::{
    CacheConfig, CacheStore, CachedFetch, CancellableOperation, KeyedCache, ManualClock,
    MemoryStorage, RequestQueue,
};
use assist_core::{FetchError, Identity};
use parking_lot::Mutex;
use serde_json::Value;

pub fn alice() -> Identity {
    Identity::new("alice", "console.local")
}

/// Decorator over in-memory storage with a manual clock.
pub struct Harness {
    pub fetcher: CachedFetch,
    pub clock: Arc<ManualClock>,
    pub storage: Arc<MemoryStorage>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_config(CacheConfig::with_ttl_override(ttl))
    }

    pub fn with_config(config: CacheConfig) -> Self {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let storage = Arc::new(MemoryStorage::new());
        let cache = Arc::new(KeyedCache::with_clock(storage.clone(), config, clock.clone()));
        let fetcher = CachedFetch::new(cache, RequestQueue::new(), alice());
        Self {
            fetcher,
            clock,
            storage,
        }
    }

    pub fn cache(&self) -> &Arc<KeyedCache> {
        self.fetcher.cache()
    }
}

/// Counts invocations of the fetch function.
#[derive(Clone, Default)]
pub struct FetchCounter(Arc<AtomicUsize>);

impl FetchCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Fetch answering `data` after `delay` and offering it to the cache.
    pub fn responding(
        &self,
        data: Value,
        delay: Duration,
    ) -> impl FnOnce(CacheStore) -> CancellableOperation<Value> + use<> {
        let calls = self.0.clone();
        move |store| {
            calls.fetch_add(1, Ordering::SeqCst);
            CancellableOperation::new(async move {
                tokio::time::sleep(delay).await;
                store.store(&data);
                Ok(data)
            })
        }
    }

    /// Fetch failing with `error` after `delay`.
    pub fn failing(
        &self,
        error: FetchError,
        delay: Duration,
    ) -> impl FnOnce(CacheStore) -> CancellableOperation<Value> + use<> {
        let calls = self.0.clone();
        move |_store| {
            calls.fetch_add(1, Ordering::SeqCst);
            CancellableOperation::new(async move {
                tokio::time::sleep(delay).await;
                Err(error)
            })
        }
    }

    /// Fetch backed by an abortable task that never finishes on its own.
    pub fn hanging(&self) -> impl FnOnce(CacheStore) -> CancellableOperation<Value> + use<> {
        let calls = self.0.clone();
        move |_store| {
            calls.fetch_add(1, Ordering::SeqCst);
            let task = tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Value::Null
            });
            let abort = task.abort_handle();
            CancellableOperation::new(async move {
                match task.await {
                    Ok(value) => Ok(value),
                    Err(e) if e.is_cancelled() => Err(FetchError::Aborted),
                    Err(e) => Err(FetchError::transport(e.to_string())),
                }
            })
            .with_request(abort)
        }
    }
}

/// Records the messages handed to the error callback.
#[derive(Clone, Default)]
pub struct Messages(Arc<Mutex<Vec<String>>>);

impl Messages {
    pub fn callback(&self) -> impl Fn(&str) + Send + Sync + 'static {
        let sink = self.0.clone();
        move |message| sink.lock().push(message.to_string())
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}
