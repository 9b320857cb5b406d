//! Cached, de-duplicated fetches.
//!
//! [`CachedFetch::run`] wraps a caller supplied fetch function with:
//!
//! 1. source type validation
//! 2. the zero timeout sentinel (never attempted, status `-1`)
//! 3. a fresh cache lookup, unless bypassed
//! 4. the cached-only mode
//! 5. de-duplication through the [`RequestQueue`]
//! 6. a conditional cache write exposed to the fetch as a [`CacheStore`]
//!
//! Backend envelopes describing an error are turned into
//! [`FetchError::Backend`] and are never cached.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use assist_core::envelope;
use assist_core::{CacheType, FetchError, Identity, SourceType};
use futures::future::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cancellable::CancellableOperation;
use crate::keyed_cache::KeyedCache;
use crate::metrics::CacheMetrics;
use crate::namespace::Namespace;
use crate::queue::{Admission, QueueKey, RequestQueue};
use crate::report::{ErrorCallback, ErrorOptions, ErrorReporter};

/// Predicate deciding whether a response is worth caching.
pub type CacheCondition = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Optional visual busy indicator toggled around network calls.
pub trait BusyIndicator: Send + Sync {
    fn show_busy(&self);
    fn hide_busy(&self);
}

/// Options of a single cached fetch.
#[derive(Clone, Default)]
pub struct FetchOptions {
    /// Cache namespace selector. Required.
    pub source_type: Option<SourceType>,
    pub cache_type: CacheType,
    /// Logical endpoint, also the cache key.
    pub url: String,
    /// Discriminator appended to the cache key and used for de-duplication.
    pub hash: Option<String>,
    /// Neither read nor write the cache.
    pub no_cache: bool,
    /// Skip the cache read but store the fresh answer.
    pub refresh_cache: bool,
    /// Answer from the cache only.
    pub cached_only: bool,
    /// `Some(ZERO)` means "do not attempt".
    pub timeout: Option<Duration>,
    pub cache_condition: Option<CacheCondition>,
    pub silence_errors: bool,
    pub error_callback: Option<ErrorCallback>,
    pub busy: Option<Arc<dyn BusyIndicator>>,
}

impl FetchOptions {
    pub fn new(source_type: impl Into<SourceType>, url: impl Into<String>) -> Self {
        Self {
            source_type: Some(source_type.into()),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn cache_type(mut self, cache_type: CacheType) -> Self {
        self.cache_type = cache_type;
        self
    }

    pub fn hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }

    pub fn refresh_cache(mut self, refresh_cache: bool) -> Self {
        self.refresh_cache = refresh_cache;
        self
    }

    pub fn cached_only(mut self, cached_only: bool) -> Self {
        self.cached_only = cached_only;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cache_condition(mut self, condition: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.cache_condition = Some(Arc::new(condition));
        self
    }

    pub fn silence_errors(mut self, silence: bool) -> Self {
        self.silence_errors = silence;
        self
    }

    pub fn error_callback(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.error_callback = Some(Arc::new(callback));
        self
    }

    pub fn busy(mut self, busy: Arc<dyn BusyIndicator>) -> Self {
        self.busy = Some(busy);
        self
    }

    /// Key of the response inside its namespace: url plus hash.
    pub fn cache_key(&self) -> String {
        match &self.hash {
            Some(hash) => format!("{}{}", self.url, hash),
            None => self.url.clone(),
        }
    }

    /// De-duplication key: url plus hash, or url plus source type.
    pub fn queue_key(&self) -> QueueKey {
        let discriminator = match (&self.hash, &self.source_type) {
            (Some(hash), _) => hash.clone(),
            (None, Some(source_type)) => source_type.to_string(),
            (None, None) => String::new(),
        };
        QueueKey::new(self.url.clone(), discriminator)
    }

    fn error_options(&self) -> ErrorOptions {
        ErrorOptions {
            silence: self.silence_errors,
            callback: self.error_callback.clone(),
        }
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("source_type", &self.source_type)
            .field("cache_type", &self.cache_type)
            .field("url", &self.url)
            .field("hash", &self.hash)
            .field("no_cache", &self.no_cache)
            .field("refresh_cache", &self.refresh_cache)
            .field("cached_only", &self.cached_only)
            .field("timeout", &self.timeout)
            .field("silence_errors", &self.silence_errors)
            .finish_non_exhaustive()
    }
}

/// Cache write capability handed to fetch functions.
#[derive(Clone)]
pub struct CacheStore {
    cache: Arc<KeyedCache>,
    namespace: Namespace,
    key: String,
    condition: Option<CacheCondition>,
    enabled: bool,
}

impl CacheStore {
    /// Stores `data` if caching is enabled for the call, `data` is not an
    /// error envelope and the cache condition holds. Returns true if written.
    pub fn store(&self, data: &Value) -> bool {
        if !self.enabled || envelope::is_failure(data) {
            return false;
        }
        if let Some(condition) = &self.condition
            && !condition(data)
        {
            return false;
        }

        self.cache.put(&self.namespace, &self.key, data.clone());
        true
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("namespace", &self.namespace)
            .field("key", &self.key)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Composes [`KeyedCache`], [`RequestQueue`] and [`ErrorReporter`] around
/// fetch functions.
#[derive(Debug, Clone)]
pub struct CachedFetch {
    cache: Arc<KeyedCache>,
    queue: RequestQueue,
    identity: Identity,
    reporter: ErrorReporter,
    metrics: CacheMetrics,
}

impl CachedFetch {
    pub fn new(cache: Arc<KeyedCache>, queue: RequestQueue, identity: Identity) -> Self {
        let metrics = cache.metrics().clone();
        Self {
            cache,
            queue,
            identity,
            reporter: ErrorReporter::new(),
            metrics,
        }
    }

    pub fn with_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn cache(&self) -> &Arc<KeyedCache> {
        &self.cache
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    /// Namespace a call with `options` reads and writes.
    pub fn namespace(&self, source_type: SourceType, cache_type: CacheType) -> Namespace {
        Namespace::new(source_type, self.identity.clone()).with_cache_type(cache_type)
    }

    /// Runs `fetch` behind the cache and the request queue.
    ///
    /// `fetch` is invoked at most once, and only when neither the cache nor
    /// an in-flight request can answer. It receives a [`CacheStore`] and is
    /// expected to call [`CacheStore::store`] with the response.
    ///
    /// Must be called within a tokio runtime.
    pub fn run<F>(&self, options: FetchOptions, fetch: F) -> CancellableOperation<Arc<Value>>
    where
        F: FnOnce(CacheStore) -> CancellableOperation<Value>,
    {
        let Some(source_type) = options.source_type.clone() else {
            warn!(url = %options.url, "Cached fetch issued without a source type");
            return self.fail_now(&options, FetchError::MissingSourceType);
        };

        if options.timeout == Some(Duration::ZERO) {
            debug!(url = %options.url, "Zero timeout, request not attempted");
            return self.fail_now(&options, FetchError::NotAttempted);
        }

        let namespace = self.namespace(source_type, options.cache_type);
        let cache_key = options.cache_key();

        if !options.no_cache
            && !options.refresh_cache
            && let Some(entry) = self.cache.get(&namespace, &cache_key)
        {
            return CancellableOperation::ready(Arc::new(entry.value));
        }

        if options.cached_only {
            debug!(namespace = %namespace, key = %cache_key, "Not available in cache");
            return CancellableOperation::failed(FetchError::NotAvailable);
        }

        let pending = match self.queue.join_or_register(options.queue_key()) {
            Admission::Joined(pending) => {
                self.metrics.record_join();
                pending
            },
            Admission::Vacant(reservation) => {
                let store = CacheStore {
                    cache: Arc::clone(&self.cache),
                    namespace,
                    key: cache_key,
                    condition: options.cache_condition.clone(),
                    enabled: !options.no_cache,
                };

                if let Some(busy) = &options.busy {
                    busy.show_busy();
                }
                let mut operation = bound(fetch(store), options.timeout);
                if let Some(busy) = options.busy.clone() {
                    operation = operation.on_settled(move || busy.hide_busy());
                }
                reservation.start(operation)
            },
        };

        let reporter = self.reporter.clone();
        let error_options = options.error_options();
        pending.into_operation().on_failure(move |error| {
            reporter.report(error, &error_options);
        })
    }

    fn fail_now(&self, options: &FetchOptions, error: FetchError) -> CancellableOperation<Arc<Value>> {
        self.reporter.report(&error, &options.error_options());
        CancellableOperation::failed(error)
    }
}

/// Applies the timeout and envelope normalization to a raw fetch.
fn bound(operation: CancellableOperation<Value>, timeout: Option<Duration>) -> CancellableOperation<Arc<Value>> {
    let (future, handle) = operation.into_parts();
    let cancel = handle.clone();

    let future = async move {
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, future).await {
                Ok(result) => result,
                Err(_) => {
                    cancel.cancel();
                    Err(FetchError::TimedOut(limit))
                },
            },
            None => future.await,
        };

        let value = result?;
        if envelope::is_failure(&value) {
            return Err(FetchError::Backend(value));
        }
        Ok(Arc::new(value))
    };

    CancellableOperation::from_parts(future.boxed(), handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyed_cache::CacheConfig;
    use crate::storage::MemoryStorage;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fetcher() -> CachedFetch {
        let cache = Arc::new(KeyedCache::new(
            Arc::new(MemoryStorage::new()),
            CacheConfig::default(),
        ));
        CachedFetch::new(cache, RequestQueue::new(), Identity::new("alice", "localhost"))
    }

    #[test]
    fn test_cache_and_queue_keys() {
        let options = FetchOptions::new("hive", "/notebook/api/autocomplete/default");
        assert_eq!(options.cache_key(), "/notebook/api/autocomplete/default");
        assert_eq!(
            options.queue_key(),
            QueueKey::new("/notebook/api/autocomplete/default", "hive")
        );

        let options = options.hash("#a1b2");
        assert_eq!(options.cache_key(), "/notebook/api/autocomplete/default#a1b2");
        assert_eq!(options.queue_key().discriminator(), "#a1b2");
    }

    #[test]
    fn test_store_rules() {
        let fetcher = fetcher();
        let store = CacheStore {
            cache: fetcher.cache().clone(),
            namespace: fetcher.namespace(SourceType::Hdfs, CacheType::Default),
            key: "/tmp".to_string(),
            condition: Some(Arc::new(|v: &Value| v["files"].as_array().is_some_and(|f| f.len() > 2))),
            enabled: true,
        };

        assert!(!store.store(&json!({ "files": [1] })));
        assert!(!store.store(&json!({ "status": 1, "files": [1, 2, 3] })));
        assert!(!store.store(&json!({ "traceback": "", "files": [1, 2, 3] })));
        assert!(store.store(&json!({ "files": [1, 2, 3] })));

        let disabled = CacheStore {
            enabled: false,
            ..store.clone()
        };
        assert!(!disabled.store(&json!({ "files": [1, 2, 3] })));
    }

    #[tokio::test]
    async fn test_missing_source_type_is_reported() {
        let fetcher = fetcher();
        let reported = Arc::new(AtomicUsize::new(0));
        let r = reported.clone();

        let options = FetchOptions {
            url: "/filebrowser/view=/".to_string(),
            ..FetchOptions::default()
        }
        .error_callback(move |message| {
            assert_eq!(message, "No source type supplied");
            r.fetch_add(1, Ordering::SeqCst);
        });

        let op = fetcher.run(options, |_| -> CancellableOperation<Value> {
            panic!("fetch must not run")
        });

        // Reported before the operation is even polled
        assert_eq!(reported.load(Ordering::SeqCst), 1);
        assert!(matches!(op.await, Err(FetchError::MissingSourceType)));
    }

    #[tokio::test]
    async fn test_refresh_cache_skips_read_but_stores() {
        let fetcher = fetcher();
        let ns = fetcher.namespace(SourceType::Git, CacheType::Default);
        fetcher.cache().put(&ns, "/repo", json!({ "v": 1 }));

        let options = FetchOptions::new(SourceType::Git, "/repo").refresh_cache(true);
        let value = fetcher
            .run(options, |store| {
                CancellableOperation::ready(json!({ "v": 2 })).on_success(move |data| {
                    store.store(data);
                })
            })
            .await
            .unwrap();

        assert_eq!(*value, json!({ "v": 2 }));
        assert_eq!(fetcher.cache().get(&ns, "/repo").unwrap().value, json!({ "v": 2 }));
    }

    #[tokio::test]
    async fn test_no_cache_never_writes() {
        let fetcher = fetcher();
        let ns = fetcher.namespace(SourceType::Git, CacheType::Default);

        let options = FetchOptions::new(SourceType::Git, "/repo").no_cache(true);
        fetcher
            .run(options, |store| {
                CancellableOperation::ready(json!({ "v": 1 })).on_success(move |data| {
                    assert!(!store.store(data));
                })
            })
            .await
            .unwrap();

        assert!(fetcher.cache().get(&ns, "/repo").is_none());
    }

    #[tokio::test]
    async fn test_backend_envelope_becomes_error() {
        let fetcher = fetcher();
        let messages = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = messages.clone();

        let options = FetchOptions::new("impala", "/notebook/api/autocomplete/")
            .silence_errors(true)
            .error_callback(move |m| sink.lock().push(m.to_string()));
        let result = fetcher
            .run(options, |_| {
                CancellableOperation::ready(json!({ "status": -1, "message": "Impala is down" }))
            })
            .await;

        assert!(matches!(result, Err(FetchError::Backend(_))));
        assert_eq!(*messages.lock(), vec!["Impala is down".to_string()]);
    }

    #[tokio::test]
    async fn test_not_found_envelope_is_success() {
        let fetcher = fetcher();
        let value = fetcher
            .run(FetchOptions::new("hive", "/autocomplete/db/missing"), |_| {
                CancellableOperation::ready(json!({ "status": 0, "code": 500, "notFound": true }))
            })
            .await
            .unwrap();

        assert_eq!(value["notFound"], json!(true));
    }

    #[tokio::test]
    async fn test_busy_indicator_toggled() {
        #[derive(Default)]
        struct Spinner {
            shown: AtomicUsize,
            hidden: AtomicUsize,
        }
        impl BusyIndicator for Spinner {
            fn show_busy(&self) {
                self.shown.fetch_add(1, Ordering::SeqCst);
            }
            fn hide_busy(&self) {
                self.hidden.fetch_add(1, Ordering::SeqCst);
            }
        }

        let fetcher = fetcher();
        let spinner = Arc::new(Spinner::default());
        let options = FetchOptions::new(SourceType::Hdfs, "/tmp").busy(spinner.clone());

        fetcher
            .run(options, |_| CancellableOperation::ready(json!({ "files": [] })))
            .await
            .unwrap();

        assert_eq!(spinner.shown.load(Ordering::SeqCst), 1);
        assert_eq!(spinner.hidden.load(Ordering::SeqCst), 1);
    }
}
