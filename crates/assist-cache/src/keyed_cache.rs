//! Namespaced TTL cache persisted to a [`Storage`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use assist_core::CacheType;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::metrics::CacheMetrics;
use crate::namespace::Namespace;
use crate::storage::Storage;

/// A cached value and the time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Key within the namespace. Not persisted, it is the map key.
    #[serde(skip)]
    pub key: String,
    /// Write time in epoch milliseconds.
    pub timestamp: i64,
    /// Payload as returned by the backend.
    pub value: Value,
}

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL of the `default` class in seconds (default: 864000 = 10 days)
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,
    /// TTL of the `optimizer` class in seconds (default: 86400 = 1 day)
    #[serde(default = "optimizer_ttl_seconds")]
    pub optimizer_ttl_seconds: u64,
    /// Global TTL in milliseconds replacing every class (debug/tests)
    #[serde(default)]
    pub ttl_override_ms: Option<u64>,
}

fn default_ttl_seconds() -> u64 {
    864_000
}

fn optimizer_ttl_seconds() -> u64 {
    86_400
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: default_ttl_seconds(),
            optimizer_ttl_seconds: optimizer_ttl_seconds(),
            ttl_override_ms: None,
        }
    }
}

impl CacheConfig {
    /// Configuration with a single TTL for every class.
    pub fn with_ttl_override(ttl: Duration) -> Self {
        Self {
            ttl_override_ms: Some(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)),
            ..Self::default()
        }
    }

    /// Returns the TTL of a cache class.
    pub fn ttl(&self, cache_type: CacheType) -> Duration {
        if let Some(ms) = self.ttl_override_ms {
            return Duration::from_millis(ms);
        }
        match cache_type {
            CacheType::Default => Duration::from_secs(self.default_ttl_seconds),
            CacheType::Optimizer => Duration::from_secs(self.optimizer_ttl_seconds),
        }
    }
}

/// TTL cache partitioned by [`Namespace`].
///
/// Each namespace lives in one storage slot as a JSON map
/// `key -> {timestamp, value}`. Writes read, modify and save the whole
/// namespace under a per-namespace mutex. Expired entries read as absent and
/// are never purged.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use assist_cache::{CacheConfig, KeyedCache, MemoryStorage, Namespace};
/// use assist_core::{Identity, SourceType};
/// use serde_json::json;
///
/// let cache = KeyedCache::new(Arc::new(MemoryStorage::new()), CacheConfig::default());
/// let ns = Namespace::new(SourceType::Hdfs, Identity::new("alice", "localhost"));
///
/// cache.put(&ns, "/user/alice", json!({ "files": [] }));
/// assert!(cache.get(&ns, "/user/alice").is_some());
/// ```
#[derive(Debug)]
pub struct KeyedCache {
    storage: Arc<dyn Storage>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    metrics: CacheMetrics,
}

impl KeyedCache {
    /// Creates a cache on top of `storage`.
    pub fn new(storage: Arc<dyn Storage>, config: CacheConfig) -> Self {
        Self::with_clock(storage, config, Arc::new(SystemClock))
    }

    /// Creates a cache with an injected clock.
    pub fn with_clock(storage: Arc<dyn Storage>, config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            config,
            clock,
            locks: Mutex::new(HashMap::new()),
            metrics: CacheMetrics::new(),
        }
    }

    /// Returns the entry for `key` unless it is missing or expired.
    pub fn get(&self, namespace: &Namespace, key: &str) -> Option<CacheEntry> {
        let source = namespace.source_type().as_str();
        let entry = self
            .load_map(namespace)
            .remove(key)
            .and_then(|raw| serde_json::from_value::<CacheEntry>(raw).ok())
            .filter(|entry| !self.has_expired(entry.timestamp, namespace.cache_type()));

        match entry {
            Some(mut entry) => {
                self.metrics.record_hit(source);
                debug!(namespace = %namespace, key = %key, "Cache hit");
                entry.key = key.to_string();
                Some(entry)
            },
            None => {
                self.metrics.record_miss(source);
                None
            },
        }
    }

    /// Stores `value` stamped with the current time and persists the namespace.
    ///
    /// Storage failures (e.g. quota exceeded) are logged and dropped.
    pub fn put(&self, namespace: &Namespace, key: &str, value: Value) {
        let lock = self.namespace_lock(namespace);
        let _guard = lock.lock();

        let mut map = self.load_map(namespace);
        let entry = CacheEntry {
            key: key.to_string(),
            timestamp: self.clock.now_millis(),
            value,
        };
        match serde_json::to_value(&entry) {
            Ok(raw) => {
                map.insert(key.to_string(), raw);
            },
            Err(e) => {
                warn!(namespace = %namespace, key = %key, error = %e, "Failed to encode cache entry");
                return;
            },
        }

        if self.persist(namespace, map) {
            self.metrics.record_store(namespace.source_type().as_str());
            debug!(namespace = %namespace, key = %key, "Cache entry stored");
        }
    }

    /// Removes one entry. Returns true if it existed.
    pub fn invalidate(&self, namespace: &Namespace, key: &str) -> bool {
        let lock = self.namespace_lock(namespace);
        let _guard = lock.lock();

        let mut map = self.load_map(namespace);
        if map.remove(key).is_none() {
            return false;
        }
        self.persist(namespace, map);
        debug!(namespace = %namespace, key = %key, "Cache entry invalidated");
        true
    }

    /// Replaces the namespace map with an empty one.
    pub fn clear(&self, namespace: &Namespace) {
        let lock = self.namespace_lock(namespace);
        let _guard = lock.lock();

        self.persist(namespace, Map::new());
        debug!(namespace = %namespace, "Cache namespace cleared");
    }

    /// Keys of the live entries in the namespace.
    pub fn keys(&self, namespace: &Namespace) -> Vec<String> {
        self.load_map(namespace)
            .into_iter()
            .filter_map(|(key, raw)| {
                let entry = serde_json::from_value::<CacheEntry>(raw).ok()?;
                (!self.has_expired(entry.timestamp, namespace.cache_type())).then_some(key)
            })
            .collect()
    }

    pub fn entry_count(&self, namespace: &Namespace) -> usize {
        self.keys(namespace).len()
    }

    /// True if an entry written at `timestamp` is past the TTL of `cache_type`.
    ///
    /// Timestamps that cannot be aged (overflow, or later than now) count as
    /// expired.
    pub fn has_expired(&self, timestamp: i64, cache_type: CacheType) -> bool {
        let ttl = self.config.ttl(cache_type).as_millis();
        let age = self
            .clock
            .now_millis()
            .checked_sub(timestamp)
            .and_then(|age| u128::try_from(age).ok());
        age.is_none_or(|age| age > ttl)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cache metrics.
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub(crate) fn namespace_lock(&self, namespace: &Namespace) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(namespace.storage_key()).or_default())
    }

    pub(crate) fn load_map(&self, namespace: &Namespace) -> Map<String, Value> {
        let slot = namespace.storage_key();
        let loaded = self
            .metrics
            .time_operation("load", || self.storage.load(&slot));

        match loaded {
            Ok(Some(Value::Object(map))) => map,
            Ok(Some(_)) => {
                warn!(slot = %slot, "Ignoring malformed cache namespace");
                Map::new()
            },
            Ok(None) => Map::new(),
            Err(e) => {
                warn!(slot = %slot, error = %e, "Failed to load cache namespace");
                Map::new()
            },
        }
    }

    /// Saves the whole map. Returns false if the storage rejected it.
    pub(crate) fn persist(&self, namespace: &Namespace, map: Map<String, Value>) -> bool {
        let slot = namespace.storage_key();
        let value = Value::Object(map);
        let saved = self
            .metrics
            .time_operation("save", || self.storage.save(&slot, &value));

        match saved {
            Ok(()) => true,
            Err(e) => {
                self.metrics
                    .record_store_failure(namespace.source_type().as_str());
                warn!(slot = %slot, error = %e, "Failed to persist cache namespace");
                false
            },
        }
    }
}
