//! Persistent key/value storage for cache namespaces.
//!
//! A storage holds one JSON blob per slot name, the way browser local
//! storage holds one string per key. Namespaces and settings are each
//! persisted as a whole in a single slot.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use assist_core::StorageError;
use parking_lot::RwLock;
use serde_json::Value;

/// A slot-addressed JSON blob store.
pub trait Storage: Send + Sync + fmt::Debug {
    /// Loads a slot, `None` if it was never written.
    fn load(&self, slot: &str) -> Result<Option<Value>, StorageError>;

    /// Replaces the content of a slot.
    fn save(&self, slot: &str, value: &Value) -> Result<(), StorageError>;

    /// Deletes a slot. Deleting a missing slot is not an error.
    fn remove(&self, slot: &str) -> Result<(), StorageError>;
}

/// In-memory storage with an optional byte quota.
///
/// Blobs are kept serialized so the quota accounts for the same bytes a
/// persistent medium would hold.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: RwLock<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    /// Creates an unbounded storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage that rejects writes once it would hold more than
    /// `quota_bytes` of serialized data.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Number of slots currently stored.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Total serialized bytes currently stored.
    pub fn used_bytes(&self) -> usize {
        self.slots.read().values().map(String::len).sum()
    }
}

impl Storage for MemoryStorage {
    fn load(&self, slot: &str) -> Result<Option<Value>, StorageError> {
        match self.slots.read().get(slot) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn save(&self, slot: &str, value: &Value) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        let mut slots = self.slots.write();

        if let Some(quota) = self.quota_bytes {
            let others: usize = slots
                .iter()
                .filter(|(name, _)| name.as_str() != slot)
                .map(|(_, blob)| blob.len())
                .sum();
            let needed = others + raw.len();
            if needed > quota {
                return Err(StorageError::quota(needed, quota));
            }
        }

        slots.insert(slot.to_string(), raw);
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<(), StorageError> {
        self.slots.write().remove(slot);
        Ok(())
    }
}

/// File backed storage: one JSON file per slot inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Opens (and creates if needed) a storage directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Returns the storage directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file backing a slot.
    ///
    /// Characters outside `[A-Za-z0-9._-]` are replaced so user and host
    /// names can never escape the storage directory.
    pub fn slot_path(&self, slot: &str) -> PathBuf {
        let file_name: String = slot
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{}.json", file_name))
    }
}

impl Storage for FileStorage {
    fn load(&self, slot: &str) -> Result<Option<Value>, StorageError> {
        match fs::read_to_string(self.slot_path(slot)) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, slot: &str, value: &Value) -> Result<(), StorageError> {
        let path = self.slot_path(slot);
        let tmp = path.with_extension("json.tmp");

        // Write then rename so readers never see a truncated blob
        fs::write(&tmp, serde_json::to_vec(value)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.slot_path(slot)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
