//! Cache invalidation with pattern matching support.

use assist_core::{Identity, SourceType};
use glob::Pattern;
use tracing::{debug, info};

use crate::keyed_cache::KeyedCache;
use crate::namespace::Namespace;

/// Outcome of an invalidation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationResult {
    /// Entries removed (namespaces, for `clear_all`).
    pub count: usize,
    /// Patterns or namespaces applied.
    pub patterns: Vec<String>,
}

impl KeyedCache {
    /// Removes the entries of a namespace whose key matches a glob.
    ///
    /// - `*`: matches any sequence of characters
    /// - `?`: matches one character
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use assist_cache::{CacheConfig, KeyedCache, MemoryStorage, Namespace};
    /// # use assist_core::{Identity, SourceType};
    /// # use serde_json::json;
    /// # let cache = KeyedCache::new(Arc::new(MemoryStorage::new()), CacheConfig::default());
    /// let ns = Namespace::new(SourceType::engine("hive"), Identity::new("alice", "localhost"));
    /// cache.put(&ns, "/notebook/api/autocomplete/sales/orders", json!({ "status": 0 }));
    /// cache.put(&ns, "/notebook/api/autocomplete/sales/items", json!({ "status": 0 }));
    ///
    /// // Every table of the "sales" database
    /// let result = cache.invalidate_by_pattern(&ns, "/notebook/api/autocomplete/sales/*");
    /// assert_eq!(result.count, 2);
    /// ```
    pub fn invalidate_by_pattern(&self, namespace: &Namespace, pattern_str: &str) -> InvalidationResult {
        let pattern = match Pattern::new(pattern_str) {
            Ok(p) => p,
            Err(e) => {
                debug!(pattern = %pattern_str, error = %e, "Invalid glob pattern");
                return InvalidationResult {
                    count: 0,
                    patterns: vec![pattern_str.to_string()],
                };
            },
        };

        let lock = self.namespace_lock(namespace);
        let _guard = lock.lock();

        let mut map = self.load_map(namespace);
        let before = map.len();
        map.retain(|key, _| !pattern.matches(key));
        let count = before - map.len();

        if count > 0 {
            self.persist(namespace, map);
        }

        info!(
            namespace = %namespace,
            pattern = %pattern_str,
            count = count,
            "Cache entries invalidated by pattern"
        );

        InvalidationResult {
            count,
            patterns: vec![pattern_str.to_string()],
        }
    }

    /// Applies several patterns, summing the counts.
    pub fn invalidate_by_patterns(&self, namespace: &Namespace, patterns: &[&str]) -> InvalidationResult {
        patterns
            .iter()
            .map(|pattern| self.invalidate_by_pattern(namespace, pattern))
            .fold(InvalidationResult::default(), |mut acc, result| {
                acc.count += result.count;
                acc.patterns.extend(result.patterns);
                acc
            })
    }

    /// Clears the namespace of every registered source type.
    ///
    /// Only the `default` class is touched; optimizer entries survive.
    pub fn clear_all(&self, identity: &Identity) -> InvalidationResult {
        let cleared: Vec<String> = SourceType::registry()
            .into_iter()
            .map(|source| {
                let namespace = Namespace::new(source, identity.clone());
                self.clear(&namespace);
                namespace.storage_key()
            })
            .collect();

        info!(identity = %identity, count = cleared.len(), "All cache namespaces cleared");

        InvalidationResult {
            count: cleared.len(),
            patterns: cleared,
        }
    }
}
