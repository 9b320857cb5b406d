//! Assist Cache - cached, de-duplicated fetches for console API clients.
//!
//! This crate provides:
//!
//! - [`KeyedCache`]: namespaced TTL cache persisted to a [`Storage`]
//! - [`RequestQueue`]: in-flight request registry sharing one request among
//!   concurrent callers
//! - [`CancellableOperation`]: futures carrying their cancellation targets
//! - [`CachedFetch`]: the decorator composing all of the above
//! - [`EventBus`] and [`InvalidationListener`]: clear signals over pub/sub
//! - [`SettingsStore`]: per-user settings next to the cache
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use assist_cache::{CacheConfig, CachedFetch, CancellableOperation, FetchOptions, KeyedCache, MemoryStorage, RequestQueue};
//! use assist_core::{Identity, SourceType};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache = Arc::new(KeyedCache::new(Arc::new(MemoryStorage::new()), CacheConfig::default()));
//! let fetcher = CachedFetch::new(cache, RequestQueue::new(), Identity::new("alice", "localhost"));
//!
//! let options = FetchOptions::new(SourceType::Hdfs, "/filebrowser/view=/user/alice");
//! let listing = fetcher
//!     .run(options, |store| {
//!         CancellableOperation::ready(json!({ "files": [".", "..", "data"] }))
//!             .on_success(move |data| { store.store(data); })
//!     })
//!     .await
//!     .unwrap();
//!
//! assert_eq!(listing["files"][2], "data");
//! # }
//! ```

pub mod bus;
pub mod cancellable;
pub mod clock;
pub mod decorator;
mod defer;
pub mod invalidation;
pub mod keyed_cache;
pub mod metrics;
pub mod namespace;
pub mod queue;
pub mod report;
pub mod settings;
pub mod storage;

pub use bus::{AssistEvent, EventBus, InvalidationListener, SubscriptionHandle};
pub use cancellable::{CancelHandle, Cancellable, CancellableOperation, RequestHandle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use decorator::{BusyIndicator, CacheCondition, CacheStore, CachedFetch, FetchOptions};
pub use invalidation::InvalidationResult;
pub use keyed_cache::{CacheConfig, CacheEntry, KeyedCache};
pub use metrics::{CacheMetrics, register_cache_metrics};
pub use namespace::{DEFAULT_OWNER, Namespace};
pub use queue::{Admission, Pending, QueueKey, RequestQueue, Reservation, SharedFetch};
pub use report::{ErrorCallback, ErrorOptions, ErrorReporter};
pub use settings::SettingsStore;
pub use storage::{FileStorage, MemoryStorage, Storage};
