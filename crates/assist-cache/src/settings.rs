//! Per-user settings persisted next to the cache.

use std::sync::Arc;

use assist_core::Identity;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use crate::storage::Storage;

/// Small JSON settings store, one slot per owner and identity.
///
/// Slot name: `settings.{owner}_{user}_{host}`. Like the cache, writes are
/// best effort and never fail the caller.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use assist_cache::{MemoryStorage, SettingsStore};
/// use assist_core::Identity;
///
/// let settings = SettingsStore::new(Arc::new(MemoryStorage::new()), Identity::new("alice", "localhost"));
/// settings.set("assist", "panel_visible", Some(&true));
///
/// assert_eq!(settings.get::<bool>("assist", "panel_visible"), Some(true));
/// assert_eq!(settings.get_or("assist", "last_path", "/".to_string()), "/");
/// ```
#[derive(Debug)]
pub struct SettingsStore {
    storage: Arc<dyn Storage>,
    identity: Identity,
    lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(storage: Arc<dyn Storage>, identity: Identity) -> Self {
        Self {
            storage,
            identity,
            lock: Mutex::new(()),
        }
    }

    /// Storage slot holding the settings of `owner`.
    pub fn slot(&self, owner: &str) -> String {
        format!("settings.{}", self.identity.scoped(owner))
    }

    /// Reads a setting, `None` if missing or of another type.
    pub fn get<T: DeserializeOwned>(&self, owner: &str, id: &str) -> Option<T> {
        self.load(owner)
            .remove(id)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    pub fn get_or<T: DeserializeOwned>(&self, owner: &str, id: &str, default: T) -> T {
        self.get(owner, id).unwrap_or(default)
    }

    /// Writes a setting. `None` (or a value serializing to null) removes it.
    pub fn set<T: Serialize>(&self, owner: &str, id: &str, value: Option<&T>) {
        let value = match value.map(serde_json::to_value) {
            Some(Ok(Value::Null)) | None => None,
            Some(Ok(value)) => Some(value),
            Some(Err(e)) => {
                warn!(owner = %owner, id = %id, error = %e, "Failed to encode setting");
                return;
            },
        };

        let _guard = self.lock.lock();
        let mut settings = self.load(owner);
        match value {
            Some(value) => {
                settings.insert(id.to_string(), value);
            },
            None => {
                if settings.remove(id).is_none() {
                    return;
                }
            },
        }

        let slot = self.slot(owner);
        if let Err(e) = self.storage.save(&slot, &Value::Object(settings)) {
            warn!(slot = %slot, error = %e, "Failed to persist settings");
        }
    }

    pub fn remove(&self, owner: &str, id: &str) {
        self.set::<Value>(owner, id, None);
    }

    fn load(&self, owner: &str) -> Map<String, Value> {
        let slot = self.slot(owner);
        match self.storage.load(&slot) {
            Ok(Some(Value::Object(map))) => map,
            Ok(_) => Map::new(),
            Err(e) => {
                warn!(slot = %slot, error = %e, "Failed to load settings");
                Map::new()
            },
        }
    }
}
