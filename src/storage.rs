//! Durable key/value storage used to keep session tokens between runs.
//!
//! [`StorageBackend`] is the narrow interface the SDK consumes. Two implementations are provided:
//! [`MemoryStorage`] (tests, ephemeral apps) and [`FileStorage`] (JSON files in a directory). The
//! [`Storage`] handle namespaces every key with a branch-key-derived prefix.
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, OnceLock, PoisonError},
};

use serde_json::{Map, Value};

use crate::Result;

/// Storage scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Resolves to [`Scope::User`].
    Default,
    /// Host-wide setting.
    Host,
    /// Per-user setting.
    User,
}

impl Scope {
    fn resolve(self) -> Scope {
        match self {
            Scope::Default => Scope::User,
            scope => scope,
        }
    }
}

/// Scoped string and boolean store.
pub trait StorageBackend: Send + Sync {
    /// `true` if `key` is stored in `scope`.
    fn has(&self, key: &str, scope: Scope) -> bool;
    /// String stored under `key`. `None` if absent or not a string.
    fn get_string(&self, key: &str, scope: Scope) -> Option<String>;
    /// Store a string under `key`.
    fn set_string(&self, key: &str, value: &str, scope: Scope) -> Result<()>;
    /// Boolean stored under `key`.
    fn get_bool(&self, key: &str, scope: Scope) -> Option<bool>;
    /// Store a boolean under `key`.
    fn set_bool(&self, key: &str, value: bool, scope: Scope) -> Result<()>;
    /// Remove `key`. Returns `true` if it was present.
    fn remove(&self, key: &str, scope: Scope) -> Result<bool>;
    /// Remove every key in `scope`.
    fn clear(&self, scope: Scope) -> Result<()>;
}

type ScopedMaps = HashMap<Scope, Map<String, Value>>;

/// In-memory storage. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<ScopedMaps>,
}

impl MemoryStorage {
    /// Empty storage.
    pub fn new() -> MemoryStorage {
        MemoryStorage::default()
    }

    fn with_scope<T>(&self, scope: Scope, f: impl FnOnce(&mut Map<String, Value>) -> T) -> T {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        f(values.entry(scope.resolve()).or_default())
    }
}

impl StorageBackend for MemoryStorage {
    fn has(&self, key: &str, scope: Scope) -> bool {
        self.with_scope(scope, |map| map.contains_key(key))
    }

    fn get_string(&self, key: &str, scope: Scope) -> Option<String> {
        self.with_scope(scope, |map| map.get(key)?.as_str().map(str::to_owned))
    }

    fn set_string(&self, key: &str, value: &str, scope: Scope) -> Result<()> {
        self.with_scope(scope, |map| map.insert(key.to_owned(), value.into()));
        Ok(())
    }

    fn get_bool(&self, key: &str, scope: Scope) -> Option<bool> {
        self.with_scope(scope, |map| map.get(key)?.as_bool())
    }

    fn set_bool(&self, key: &str, value: bool, scope: Scope) -> Result<()> {
        self.with_scope(scope, |map| map.insert(key.to_owned(), value.into()));
        Ok(())
    }

    fn remove(&self, key: &str, scope: Scope) -> Result<bool> {
        Ok(self.with_scope(scope, |map| map.shift_remove(key).is_some()))
    }

    fn clear(&self, scope: Scope) -> Result<()> {
        self.with_scope(scope, Map::clear);
        Ok(())
    }
}

/// Storage persisted as one JSON file per scope (`user.json`, `host.json`) inside a directory.
///
/// Files are loaded lazily on first access and rewritten after every mutation. A mutation only
/// becomes visible once its file was written, so memory never runs ahead of disk.
pub struct FileStorage {
    directory: PathBuf,
    loaded: Mutex<ScopedMaps>,
}

impl FileStorage {
    /// Name of the directory under the user's home directory used by [`default_storage`].
    pub const DEFAULT_DIRECTORY_NAME: &'static str = ".branchio";

    /// Storage in `directory`, created on first write.
    pub fn new(directory: impl Into<PathBuf>) -> FileStorage {
        FileStorage {
            directory: directory.into(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding the storage files.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path(&self, scope: Scope) -> PathBuf {
        let file_name = match scope.resolve() {
            Scope::Host => "host.json",
            _ => "user.json",
        };
        self.directory.join(file_name)
    }

    fn load(&self, scope: Scope) -> Map<String, Value> {
        let path = self.path(scope);
        let Ok(bytes) = fs::read(&path) else {
            return Map::new();
        };
        match serde_json::from_slice(&bytes) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                log::warn!(target: "branch", path:? = path; "ignoring unreadable storage file");
                Map::new()
            }
        }
    }

    fn flush(&self, scope: Scope, map: &Map<String, Value>) -> Result<()> {
        fs::create_dir_all(&self.directory)?;
        let bytes = serde_json::to_vec_pretty(map)?;
        fs::write(self.path(scope), bytes)?;
        Ok(())
    }

    fn read<T>(&self, scope: Scope, f: impl FnOnce(&Map<String, Value>) -> T) -> T {
        let scope = scope.resolve();
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        let map = loaded.entry(scope).or_insert_with(|| self.load(scope));
        f(map)
    }

    fn write<T>(&self, scope: Scope, f: impl FnOnce(&mut Map<String, Value>) -> T) -> Result<T> {
        let scope = scope.resolve();
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        let map = loaded.entry(scope).or_insert_with(|| self.load(scope));
        let mut updated = map.clone();
        let result = f(&mut updated);
        self.flush(scope, &updated)?;
        *map = updated;
        Ok(result)
    }
}

impl StorageBackend for FileStorage {
    fn has(&self, key: &str, scope: Scope) -> bool {
        self.read(scope, |map| map.contains_key(key))
    }

    fn get_string(&self, key: &str, scope: Scope) -> Option<String> {
        self.read(scope, |map| map.get(key)?.as_str().map(str::to_owned))
    }

    fn set_string(&self, key: &str, value: &str, scope: Scope) -> Result<()> {
        self.write(scope, |map| {
            map.insert(key.to_owned(), value.into());
        })
    }

    fn get_bool(&self, key: &str, scope: Scope) -> Option<bool> {
        self.read(scope, |map| map.get(key)?.as_bool())
    }

    fn set_bool(&self, key: &str, value: bool, scope: Scope) -> Result<()> {
        self.write(scope, |map| {
            map.insert(key.to_owned(), value.into());
        })
    }

    fn remove(&self, key: &str, scope: Scope) -> Result<bool> {
        if !self.has(key, scope) {
            return Ok(false);
        }
        self.write(scope, |map| map.shift_remove(key).is_some())
    }

    fn clear(&self, scope: Scope) -> Result<()> {
        let scope = scope.resolve();
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(self.path(scope)) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        loaded.insert(scope, Map::new());
        Ok(())
    }
}

/// Process-wide default storage: a [`FileStorage`] in `~/.branchio`, or [`MemoryStorage`] when
/// no home directory can be determined.
///
/// Clients use this unless [`ClientConfig::storage`](crate::ClientConfig::storage) overrides it.
pub fn default_storage() -> Arc<dyn StorageBackend> {
    static DEFAULT: OnceLock<Arc<dyn StorageBackend>> = OnceLock::new();
    DEFAULT
        .get_or_init(|| match dirs::home_dir() {
            Some(home) => Arc::new(FileStorage::new(
                home.join(FileStorage::DEFAULT_DIRECTORY_NAME),
            )),
            None => {
                log::warn!(target: "branch", "no home directory, session tokens will not be persisted");
                Arc::new(MemoryStorage::new())
            }
        })
        .clone()
}

/// Global (unprefixed) flag recording that legacy keys have been migrated.
const LEGACY_MIGRATED_KEY: &str = "legacy_migrated";

/// A handle to a [`StorageBackend`] that namespaces keys as `"{prefix}.{key}"`.
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn StorageBackend>,
    prefix: String,
    scope: Scope,
}

impl Storage {
    /// Create a handle without a prefix, using [`Scope::User`] for all keys.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Storage {
        Storage {
            backend,
            prefix: String::new(),
            scope: Scope::User,
        }
    }

    /// Namespace all further keys with `prefix`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Storage {
        self.prefix = prefix.into();
        self
    }

    /// Use `scope` for every access through this handle.
    pub fn with_scope(mut self, scope: Scope) -> Storage {
        self.scope = scope;
        self
    }

    /// Prefix prepended to every key.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_owned()
        } else {
            format!("{}.{}", self.prefix, key)
        }
    }

    /// `true` if `key` is stored.
    pub fn has(&self, key: &str) -> bool {
        self.backend.has(&self.key(key), self.scope)
    }

    /// String stored under `key`.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.backend.get_string(&self.key(key), self.scope)
    }

    /// Store `value` under `key`.
    pub fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.backend.set_string(&self.key(key), value, self.scope)
    }

    /// Boolean stored under `key`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.backend.get_bool(&self.key(key), self.scope)
    }

    /// Store `value` under `key`.
    pub fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.backend.set_bool(&self.key(key), value, self.scope)
    }

    /// Remove `key`. Returns `true` if it was present.
    pub fn remove(&self, key: &str) -> Result<bool> {
        self.backend.remove(&self.key(key), self.scope)
    }

    /// Copy unprefixed values of `keys` written by older SDK versions into this prefix.
    ///
    /// Runs at most once per backend: the first prefixed handle to call it receives the legacy
    /// values, and the legacy entries themselves are left untouched. Existing prefixed values are
    /// never overwritten.
    pub fn migrate_legacy(&self, keys: &[&str]) -> Result<()> {
        if self.prefix.is_empty()
            || self
                .backend
                .get_bool(LEGACY_MIGRATED_KEY, self.scope)
                .unwrap_or(false)
        {
            return Ok(());
        }

        for key in keys {
            let Some(value) = self.backend.get_string(key, self.scope) else {
                continue;
            };
            if !self.has(key) {
                log::debug!(target: "branch", key; "migrating legacy storage key");
                self.set_string(key, &value)?;
            }
        }

        self.backend.set_bool(LEGACY_MIGRATED_KEY, true, self.scope)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{FileStorage, MemoryStorage, Scope, Storage, StorageBackend};

    #[test]
    fn memory_storage_scopes_are_independent() {
        let storage = MemoryStorage::new();
        storage.set_string("key", "user", Scope::User).unwrap();
        storage.set_string("key", "host", Scope::Host).unwrap();

        assert_eq!(storage.get_string("key", Scope::User).as_deref(), Some("user"));
        assert_eq!(storage.get_string("key", Scope::Default).as_deref(), Some("user"));
        assert_eq!(storage.get_string("key", Scope::Host).as_deref(), Some("host"));

        storage.clear(Scope::User).unwrap();
        assert!(!storage.has("key", Scope::User));
        assert!(storage.has("key", Scope::Host));
    }

    #[test]
    fn memory_storage_booleans() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get_bool("flag", Scope::User), None);
        storage.set_bool("flag", true, Scope::User).unwrap();
        assert_eq!(storage.get_bool("flag", Scope::User), Some(true));
        assert!(storage.remove("flag", Scope::User).unwrap());
        assert!(!storage.remove("flag", Scope::User).unwrap());
    }

    #[test]
    fn file_storage_persists_between_instances() {
        let dir = tempfile::tempdir().unwrap();

        {
            let storage = FileStorage::new(dir.path());
            storage.set_string("token", "abc", Scope::User).unwrap();
            storage.set_bool("flag", true, Scope::Host).unwrap();
        }

        let storage = FileStorage::new(dir.path());
        assert_eq!(storage.get_string("token", Scope::User).as_deref(), Some("abc"));
        assert_eq!(storage.get_bool("flag", Scope::Host), Some(true));
        assert!(!storage.has("token", Scope::Host));

        storage.clear(Scope::User).unwrap();
        assert!(!FileStorage::new(dir.path()).has("token", Scope::User));
    }

    #[test]
    fn failed_file_write_leaves_memory_unchanged() {
        let file = tempfile::NamedTempFile::new().unwrap();
        // A directory nested under a regular file can never be created.
        let storage = FileStorage::new(file.path().join("storage"));

        assert!(storage.set_string("token", "abc", Scope::User).is_err());
        assert_eq!(storage.get_string("token", Scope::User), None);
        assert!(!storage.has("token", Scope::User));
    }

    #[test]
    fn prefixed_keys() {
        let backend = Arc::new(MemoryStorage::new());
        let storage = Storage::new(backend.clone()).with_prefix("key_live_1");
        storage.set_string("session.token", "abc").unwrap();

        assert_eq!(
            backend.get_string("key_live_1.session.token", Scope::User).as_deref(),
            Some("abc")
        );
        assert!(!backend.has("session.token", Scope::User));
    }

    #[test]
    fn legacy_keys_migrate_into_first_prefix_only() {
        let backend = Arc::new(MemoryStorage::new());
        backend.set_string("session.token", "legacy", Scope::User).unwrap();

        let first = Storage::new(backend.clone()).with_prefix("first");
        first.migrate_legacy(&["session.token"]).unwrap();
        assert_eq!(first.get_string("session.token").as_deref(), Some("legacy"));

        let second = Storage::new(backend.clone()).with_prefix("second");
        second.migrate_legacy(&["session.token"]).unwrap();
        assert_eq!(second.get_string("session.token"), None);

        // legacy value is left alone
        assert!(backend.has("session.token", Scope::User));
    }

    #[test]
    fn migration_does_not_overwrite_prefixed_values() {
        let backend = Arc::new(MemoryStorage::new());
        backend.set_string("session.token", "legacy", Scope::User).unwrap();
        let storage = Storage::new(backend).with_prefix("app");
        storage.set_string("session.token", "current").unwrap();

        storage.migrate_legacy(&["session.token"]).unwrap();
        assert_eq!(storage.get_string("session.token").as_deref(), Some("current"));
    }
}
