//! Local persistence adapter: JSON collections over a key-value string store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::OwnedMutexGuard;

use crate::error::LocalStoreError;

/// Well-known storage keys besides the entity collections.
pub mod keys {
    pub const SYNC_QUEUE: &str = "crm_sync_queue";
    pub const LAST_SYNC: &str = "crm_last_sync";
    pub const NOTIFICATIONS: &str = "crm_notifications";
    pub const INVENTORY: &str = "crm_inventory";
    pub const COMPANY_SETTINGS: &str = "crm_company_settings";
    pub const WHATSAPP_CONFIG: &str = "whatsapp_config";
    /// Per-collection ID high-water marks.
    pub const SEQUENCES: &str = "crm_sequences";

    pub fn integration(kind: &str) -> String {
        format!("crm_integration_{kind}")
    }
}

/// Key-value string store (the browser `localStorage` contract).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError>;

    async fn set(&self, key: &str, value: String) -> Result<(), LocalStoreError>;

    async fn remove(&self, key: &str) -> Result<(), LocalStoreError>;

    async fn keys(&self) -> Result<Vec<String>, LocalStoreError>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: BTreeMap<String, String>,
    quota: Option<usize>,
}

impl MemoryInner {
    fn used_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

/// In-process store with an optional byte quota (keys and values counted).
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(bytes: usize) -> Self {
        let store = Self::new();
        store.set_quota(Some(bytes));
        store
    }

    /// Change the quota; existing entries are kept even if they exceed it.
    pub fn set_quota(&self, bytes: Option<usize>) {
        self.inner().quota = bytes;
    }

    pub fn used_bytes(&self) -> usize {
        self.inner().used_bytes()
    }

    /// Raw stored value, bypassing the async trait.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner().entries.get(key).cloned()
    }

    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner().entries.insert(key.into(), value.into());
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        Ok(self.inner().entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), LocalStoreError> {
        let mut inner = self.inner();
        if let Some(quota) = inner.quota {
            let current = inner
                .entries
                .get(key)
                .map(|old| key.len() + old.len())
                .unwrap_or(0);
            let others = inner.used_bytes() - current;
            let needed = key.len() + value.len();
            if others + needed > quota {
                return Err(LocalStoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available: quota.saturating_sub(others),
                });
            }
        }
        inner.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), LocalStoreError> {
        self.inner().entries.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, LocalStoreError> {
        Ok(self.inner().entries.keys().cloned().collect())
    }
}

/// JSON adapter over a [`KeyValueStore`].
///
/// Reads never fail: missing or malformed values degrade to empty state after
/// a warning. Writes report backend rejection (quota, I/O) to the caller.
///
/// Writers of a key serialize through [`LocalStore::lock`]; the read/write
/// methods themselves do not lock, so a caller holding the guard can
/// read-modify-write atomically.
#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn KeyValueStore>,
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl core::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LocalStore").finish_non_exhaustive()
    }
}

impl LocalStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKeyValueStore::new()))
    }

    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }

    /// Acquire the write guard of `key`.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(key.to_string()).or_default().clone()
        };
        mutex.lock_owned().await
    }

    async fn read_raw(&self, key: &str) -> Option<String> {
        match self.backend.get(key).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("failed to read '{key}' from local store: {err}");
                None
            }
        }
    }

    /// Raw records of a collection; `None` when the key was never written.
    ///
    /// A value that is not a JSON array is treated as an empty collection.
    pub async fn read_values(&self, key: &str) -> Option<Vec<Value>> {
        let raw = self.read_raw(key).await?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => Some(items),
            Ok(other) => {
                tracing::warn!(
                    "collection '{key}' is not a JSON array ({}), treating as empty",
                    json_kind(&other)
                );
                Some(Vec::new())
            }
            Err(err) => {
                tracing::warn!("malformed JSON in collection '{key}', treating as empty: {err}");
                Some(Vec::new())
            }
        }
    }

    /// Typed records of a collection, each passed through `upgrade` first.
    ///
    /// Records that fail to deserialize are skipped individually.
    pub async fn read_records<T: DeserializeOwned>(
        &self,
        key: &str,
        upgrade: fn(&mut Value),
    ) -> Option<Vec<T>> {
        let values = self.read_values(key).await?;
        let total = values.len();
        let records: Vec<T> = values
            .into_iter()
            .enumerate()
            .filter_map(|(index, mut value)| {
                upgrade(&mut value);
                match serde_json::from_value(value) {
                    Ok(record) => Some(record),
                    Err(err) => {
                        tracing::warn!("skipping unreadable record #{index} in '{key}': {err}");
                        None
                    }
                }
            })
            .collect();

        if records.len() < total {
            tracing::warn!(
                "loaded {} of {} records from '{key}'",
                records.len(),
                total
            );
        }
        Some(records)
    }

    /// Typed records; missing or malformed collections read as `[]`.
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        self.read_records(key, |_| {}).await.unwrap_or_default()
    }

    pub async fn write<T: Serialize>(&self, key: &str, items: &[T]) -> Result<(), LocalStoreError> {
        let payload = serde_json::to_string(items).map_err(|source| LocalStoreError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.backend.set(key, payload).await
    }

    /// Object-valued key (settings, stamps); `None` when absent or malformed.
    pub async fn read_object<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read_raw(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!("malformed JSON under '{key}', ignoring: {err}");
                None
            }
        }
    }

    pub async fn write_object<T: Serialize>(&self, key: &str, value: &T) -> Result<(), LocalStoreError> {
        let payload = serde_json::to_string(value).map_err(|source| LocalStoreError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.backend.set(key, payload).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), LocalStoreError> {
        self.backend.remove(key).await
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
