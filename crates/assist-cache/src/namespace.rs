//! Cache namespace identification.

use std::fmt;

use assist_core::{CacheType, Identity, SourceType};

/// Default owner scope of cache namespaces.
pub const DEFAULT_OWNER: &str = "assist";

/// A scoped partition of the cache.
///
/// Each namespace maps to exactly one storage slot, named
/// `{owner}.{cache_type}.{source_type}_{user}_{host}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    owner: String,
    cache_type: CacheType,
    source_type: SourceType,
    identity: Identity,
}

impl Namespace {
    /// Creates the default namespace of a source type for the given identity.
    ///
    /// # Examples
    ///
    /// ```
    /// use assist_cache::Namespace;
    /// use assist_core::{CacheType, Identity, SourceType};
    ///
    /// let identity = Identity::new("alice", "console.local");
    /// let ns = Namespace::new(SourceType::Hdfs, identity);
    /// assert_eq!(ns.storage_key(), "assist.default.hdfs_alice_console.local");
    ///
    /// let ns = ns.with_cache_type(CacheType::Optimizer);
    /// assert_eq!(ns.storage_key(), "assist.optimizer.hdfs_alice_console.local");
    /// ```
    pub fn new(source_type: SourceType, identity: Identity) -> Self {
        Self {
            owner: DEFAULT_OWNER.to_string(),
            cache_type: CacheType::Default,
            source_type,
            identity,
        }
    }

    /// Sets the cache class.
    pub fn with_cache_type(mut self, cache_type: CacheType) -> Self {
        self.cache_type = cache_type;
        self
    }

    /// Sets the owner scope.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn cache_type(&self) -> CacheType {
        self.cache_type
    }

    pub fn source_type(&self) -> &SourceType {
        &self.source_type
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Returns the storage slot name backing this namespace.
    pub fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.owner,
            self.cache_type,
            self.identity.scoped(self.source_type.as_str())
        )
    }
}
