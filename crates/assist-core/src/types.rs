//! Common type definitions for Assist.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Query engines whose database lists are cached by default.
pub const KNOWN_ENGINES: [&str; 2] = ["hive", "impala"];

/// Backend a request is issued against.
///
/// Every cache namespace is scoped to one source type, so clearing the
/// HDFS cache never touches cached S3 listings or Hive metadata.
///
/// Query engines are open-ended: anything that is not one of the storage
/// or document backends is an [`SourceType::Engine`].
///
/// # Example
///
/// ```
/// use assist_core::SourceType;
///
/// assert_eq!(SourceType::from("hdfs"), SourceType::Hdfs);
/// assert_eq!(SourceType::from("Hive").as_str(), "hive");
/// assert!(SourceType::from("impala").is_engine());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceType {
    /// Hadoop distributed file system.
    Hdfs,
    /// Azure Data Lake Storage.
    Adls,
    /// S3 compatible object store.
    S3,
    /// Version control repository contents.
    Git,
    /// Search index collections.
    Collections,
    /// Wide-column store tables.
    Hbase,
    /// Saved console documents.
    Document,
    /// SQL query engine (hive, impala, ...).
    Engine(String),
}

impl SourceType {
    /// Shorthand for an SQL engine source type.
    pub fn engine(name: impl Into<String>) -> Self {
        Self::from(name.into())
    }

    /// Returns the identifier used in storage slot names and request payloads.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Hdfs => "hdfs",
            Self::Adls => "adls",
            Self::S3 => "s3",
            Self::Git => "git",
            Self::Collections => "collections",
            Self::Hbase => "hbase",
            Self::Document => "document",
            Self::Engine(name) => name,
        }
    }

    /// Returns true for SQL query engines.
    pub fn is_engine(&self) -> bool {
        matches!(self, Self::Engine(_))
    }

    /// The fixed registry of source types cleared by a "clear all" signal.
    pub fn registry() -> Vec<SourceType> {
        let mut sources = vec![
            Self::Hdfs,
            Self::Adls,
            Self::Git,
            Self::S3,
            Self::Collections,
            Self::Hbase,
            Self::Document,
        ];
        sources.extend(KNOWN_ENGINES.iter().map(|name| Self::engine(*name)));
        sources
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for SourceType {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "hdfs" => Self::Hdfs,
            "adls" => Self::Adls,
            "s3" => Self::S3,
            "git" => Self::Git,
            "collections" => Self::Collections,
            "hbase" => Self::Hbase,
            "document" => Self::Document,
            other => Self::Engine(other.to_string()),
        }
    }
}

impl From<&str> for SourceType {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<SourceType> for String {
    fn from(source: SourceType) -> Self {
        source.as_str().to_string()
    }
}

/// Cache class, selecting the TTL applied to a namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    /// Metadata and file listings.
    #[default]
    Default,
    /// Optimizer statistics (popular tables, joins, filters...).
    Optimizer,
}

impl CacheType {
    /// Returns the identifier used in storage slot names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Optimizer => "optimizer",
        }
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session identity, part of every namespace so users sharing a client
/// never see each other's cached data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    user: String,
    host: String,
}

impl Identity {
    /// Creates a new identity for the given user and host.
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
        }
    }

    /// Returns the logged in user name.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Returns the console host name.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the `{scope}_{user}_{host}` prefix used for storage slots.
    pub fn scoped(&self, scope: &str) -> String {
        format!("{}_{}_{}", scope, self.user, self.host)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_roundtrip() {
        for source in SourceType::registry() {
            assert_eq!(SourceType::from(source.as_str()), source);
        }
    }

    #[test]
    fn test_unknown_source_is_engine() {
        let source = SourceType::from("SparkSQL");
        assert_eq!(source, SourceType::Engine("sparksql".to_string()));
        assert!(source.is_engine());
        assert!(!SourceType::Hdfs.is_engine());
    }

    #[test]
    fn test_registry_contains_engines() {
        let registry = SourceType::registry();
        assert_eq!(registry.len(), 9);
        assert!(registry.contains(&SourceType::engine("hive")));
        assert!(registry.contains(&SourceType::engine("impala")));
        assert!(registry.contains(&SourceType::Document));
    }

    #[test]
    fn test_source_type_serde() {
        let json = serde_json::to_string(&SourceType::S3).unwrap();
        assert_eq!(json, "\"s3\"");

        let parsed: SourceType = serde_json::from_str("\"impala\"").unwrap();
        assert_eq!(parsed, SourceType::engine("impala"));
    }

    #[test]
    fn test_cache_type_default() {
        assert_eq!(CacheType::default(), CacheType::Default);
        assert_eq!(CacheType::Optimizer.to_string(), "optimizer");

        let parsed: CacheType = serde_json::from_str("\"optimizer\"").unwrap();
        assert_eq!(parsed, CacheType::Optimizer);
    }

    #[test]
    fn test_identity_scoped() {
        let identity = Identity::new("alice", "console.example.com");
        assert_eq!(identity.scoped("hdfs"), "hdfs_alice_console.example.com");
        assert_eq!(identity.to_string(), "alice@console.example.com");
    }
}
