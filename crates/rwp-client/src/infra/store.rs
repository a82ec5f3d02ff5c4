//! Partitioned, transactional key-value store.
//!
//! The store holds three named partitions (`context`, `prefs`, `user`) of
//! JSON values. Mutations go through [`KvStore::transaction`]: the closure
//! runs against a staged copy, and the commit (including the file write)
//! only happens when it returns `Ok`. A read that discovers an expired
//! entry can therefore delete it atomically with the read itself.
//!
//! File persistence is best-effort: a store that cannot be opened degrades
//! to memory-only operation, and a commit whose file write fails keeps the
//! in-memory state and logs a warning. Callers never see storage trouble
//! as a fatal error.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;

/// The named partitions of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Device-scoped state: ids, tokens, seed, cached server key.
    Context,
    /// Per-user presentation preferences.
    Prefs,
    /// Per-user credentials, keyed `"<userId>:<baseKey>"`.
    User,
}

impl Partition {
    fn name(self) -> &'static str {
        match self {
            Partition::Context => "context",
            Partition::Prefs => "prefs",
            Partition::User => "user",
        }
    }
}

/// Keys of the `context` partition.
pub mod context_keys {
    pub const COMPAT: &str = "compat";
    pub const LAST_LOGIN_UID: &str = "last_login_uid";
    pub const DEVICE_ID: &str = "device_id";
    pub const DEVICE_TOKEN: &str = "device_token";
    pub const DEVICE_SEED: &str = "device_seed";
    pub const SERVER_PUBKEY: &str = "server_pubkey";
}

/// Keys of the `prefs` partition (composite, per user).
pub mod prefs_keys {
    pub const THEME: &str = "theme";
    pub const LANG: &str = "lang";
}

/// Base keys of the `user` partition (composite, per user).
pub mod user_keys {
    pub const USERNAME: &str = "username";
    pub const USER_TOKEN: &str = "token";
}

/// Build a composite per-user key: `"<userId>:<baseKey>"`.
pub fn user_key(user_id: &str, base_key: &str) -> String {
    format!("{user_id}:{base_key}")
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    context: HashMap<String, Value>,
    #[serde(default)]
    prefs: HashMap<String, Value>,
    #[serde(default)]
    user: HashMap<String, Value>,
}

impl StoreData {
    fn partition(&self, p: Partition) -> &HashMap<String, Value> {
        match p {
            Partition::Context => &self.context,
            Partition::Prefs => &self.prefs,
            Partition::User => &self.user,
        }
    }

    fn partition_mut(&mut self, p: Partition) -> &mut HashMap<String, Value> {
        match p {
            Partition::Context => &mut self.context,
            Partition::Prefs => &mut self.prefs,
            Partition::User => &mut self.user,
        }
    }
}

pub struct KvStore {
    data: Mutex<StoreData>,
    path: Option<PathBuf>,
}

impl KvStore {
    /// Open a file-backed store, loading existing contents if present.
    ///
    /// A corrupted file is logged and replaced with an empty store rather
    /// than surfaced as an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::Storage(format!("Cannot create data directory: {e}")))?;
        }

        let data = if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| AppError::Storage(format!("Cannot read {}: {e}", path.display())))?;
            match serde_json::from_str(&content) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "store file corrupted, starting empty");
                    StoreData::default()
                }
            }
        } else {
            StoreData::default()
        };

        Ok(Self {
            data: Mutex::new(data),
            path: Some(path),
        })
    }

    /// A memory-only store. Used directly by tests and as the degraded
    /// fallback when the file store cannot be opened.
    pub fn in_memory() -> Self {
        Self {
            data: Mutex::new(StoreData::default()),
            path: None,
        }
    }

    /// Open the file store, degrading to a memory-only store (with a
    /// warning) when that fails. Values then live only for the process
    /// lifetime, which is exactly the documented degradation.
    pub fn open_or_ephemeral(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::open(&path) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "persistent store unavailable, using ephemeral store");
                Self::in_memory()
            }
        }
    }

    /// Whether values put into this store survive the process.
    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    pub fn get(&self, partition: Partition, key: &str) -> Option<Value> {
        self.data.lock().partition(partition).get(key).cloned()
    }

    /// Typed read; a value that fails to deserialize reads as absent.
    pub fn get_json<T: DeserializeOwned>(&self, partition: Partition, key: &str) -> Option<T> {
        let value = self.get(partition, key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(partition = partition.name(), key, error = %e, "stored value has unexpected shape");
                None
            }
        }
    }

    pub fn put(&self, partition: Partition, key: &str, value: Value) -> Result<(), AppError> {
        self.transaction(|txn| {
            txn.put(partition, key, value);
            Ok(())
        })
    }

    pub fn put_json<T: Serialize>(
        &self,
        partition: Partition,
        key: &str,
        value: &T,
    ) -> Result<(), AppError> {
        let value = serde_json::to_value(value)
            .map_err(|e| AppError::Storage(format!("Failed to serialize: {e}")))?;
        self.put(partition, key, value)
    }

    pub fn delete(&self, partition: Partition, key: &str) -> Result<(), AppError> {
        self.transaction(|txn| {
            txn.delete(partition, key);
            Ok(())
        })
    }

    /// Run `f` against a staged copy of the store. The staged copy replaces
    /// the live data, and is flushed to disk, only when `f` returns `Ok`;
    /// an `Err` discards every staged mutation.
    ///
    /// The closure must not call back into this store.
    pub fn transaction<R>(
        &self,
        f: impl FnOnce(&mut StoreTxn<'_>) -> Result<R, AppError>,
    ) -> Result<R, AppError> {
        let mut guard = self.data.lock();
        let mut staged = guard.clone();

        let out = f(&mut StoreTxn { data: &mut staged })?;

        if let Err(e) = self.persist(&staged) {
            tracing::warn!(error = %e, "store flush failed, keeping in-memory state");
        }
        *guard = staged;
        Ok(out)
    }

    fn persist(&self, data: &StoreData) -> Result<(), AppError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let content = serde_json::to_string_pretty(data)
            .map_err(|e| AppError::Storage(format!("Failed to serialize store: {e}")))?;

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, &content)
            .map_err(|e| AppError::Storage(format!("Failed to write store: {e}")))?;
        fs::rename(&tmp_path, path)
            .map_err(|e| AppError::Storage(format!("Failed to commit store write: {e}")))?;

        set_restrictive_permissions(path)?;
        Ok(())
    }
}

/// A staged view of the store inside one transaction.
pub struct StoreTxn<'a> {
    data: &'a mut StoreData,
}

impl StoreTxn<'_> {
    pub fn get(&self, partition: Partition, key: &str) -> Option<&Value> {
        self.data.partition(partition).get(key)
    }

    pub fn get_json<T: DeserializeOwned>(&self, partition: Partition, key: &str) -> Option<T> {
        let value = self.get(partition, key)?.clone();
        serde_json::from_value(value).ok()
    }

    pub fn put(&mut self, partition: Partition, key: &str, value: Value) {
        self.data
            .partition_mut(partition)
            .insert(key.to_string(), value);
    }

    pub fn put_json<T: Serialize>(
        &mut self,
        partition: Partition,
        key: &str,
        value: &T,
    ) -> Result<(), AppError> {
        let value = serde_json::to_value(value)
            .map_err(|e| AppError::Storage(format!("Failed to serialize: {e}")))?;
        self.put(partition, key, value);
        Ok(())
    }

    pub fn delete(&mut self, partition: Partition, key: &str) {
        self.data.partition_mut(partition).remove(key);
    }
}

#[cfg(unix)]
fn set_restrictive_permissions(path: &PathBuf) -> Result<(), AppError> {
    use std::os::unix::fs::PermissionsExt;
    let perms = fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, perms)
        .map_err(|e| AppError::Storage(format!("Failed to set file permissions: {e}")))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_restrictive_permissions(_path: &PathBuf) -> Result<(), AppError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_put_delete_roundtrip() {
        let store = KvStore::in_memory();
        store
            .put(Partition::Context, context_keys::DEVICE_ID, json!("dev-1"))
            .unwrap();
        assert_eq!(
            store.get_json::<String>(Partition::Context, context_keys::DEVICE_ID),
            Some("dev-1".to_string())
        );

        store
            .delete(Partition::Context, context_keys::DEVICE_ID)
            .unwrap();
        assert!(store.get(Partition::Context, context_keys::DEVICE_ID).is_none());
    }

    #[test]
    fn failed_transaction_discards_staged_writes() {
        let store = KvStore::in_memory();
        store
            .put(Partition::User, "u1:token", json!("keep-me"))
            .unwrap();

        let result: Result<(), AppError> = store.transaction(|txn| {
            txn.put(Partition::User, "u1:token", json!("lost"));
            txn.delete(Partition::User, "u1:token");
            Err(AppError::Storage("boom".into()))
        });
        assert!(result.is_err());

        assert_eq!(
            store.get_json::<String>(Partition::User, "u1:token"),
            Some("keep-me".to_string())
        );
    }

    #[test]
    fn transaction_spans_partitions_atomically() {
        let store = KvStore::in_memory();
        store
            .transaction(|txn| {
                txn.put(Partition::Context, context_keys::LAST_LOGIN_UID, json!("u1"));
                txn.put(Partition::User, &user_key("u1", user_keys::USERNAME), json!("ada"));
                Ok(())
            })
            .unwrap();

        assert_eq!(
            store.get_json::<String>(Partition::Context, context_keys::LAST_LOGIN_UID),
            Some("u1".to_string())
        );
        assert_eq!(
            store.get_json::<String>(Partition::User, &user_key("u1", user_keys::USERNAME)),
            Some("ada".to_string())
        );
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let store = KvStore::open(&path).unwrap();
            store
                .put(Partition::Context, context_keys::DEVICE_SEED, json!("c2VlZA"))
                .unwrap();
        }

        let store = KvStore::open(&path).unwrap();
        assert_eq!(
            store.get_json::<String>(Partition::Context, context_keys::DEVICE_SEED),
            Some("c2VlZA".to_string())
        );
    }

    #[test]
    fn corrupted_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "not json at all").unwrap();

        let store = KvStore::open(&path).unwrap();
        assert!(store.get(Partition::Context, context_keys::DEVICE_SEED).is_none());
    }

    #[test]
    fn user_key_format() {
        assert_eq!(user_key("u-42", user_keys::USER_TOKEN), "u-42:token");
    }

    #[test]
    fn prefs_are_partitioned_per_user() {
        let store = KvStore::in_memory();
        store
            .put(Partition::Prefs, &user_key("u-1", prefs_keys::THEME), json!("dark"))
            .unwrap();
        store
            .put(Partition::Prefs, &user_key("u-2", prefs_keys::THEME), json!("light"))
            .unwrap();

        assert_eq!(
            store.get_json::<String>(Partition::Prefs, &user_key("u-1", prefs_keys::THEME)),
            Some("dark".to_string())
        );
        assert_eq!(
            store.get_json::<String>(Partition::Prefs, &user_key("u-2", prefs_keys::THEME)),
            Some("light".to_string())
        );
    }
}
