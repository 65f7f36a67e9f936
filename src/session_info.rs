use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{defines::keys, storage::Storage, PropertyBag};

const STORAGE_SECTION: &str = "session";

/// Storage keys read by [`SessionInfo`], including legacy names. Used for legacy migration.
pub(crate) const STORED_KEYS: &[&str] = &[
    "session.randomized_device_token",
    "session.device_fingerprint_id",
    "session.randomized_bundle_token",
    "session.identity_id",
];

/// Server-assigned session state: session id plus the randomized device and bundle tokens.
///
/// Tokens are persisted to [`Storage`] as soon as they change. The session id lives in memory
/// only, a new one is assigned by every session open.
pub struct SessionInfo {
    properties: Mutex<PropertyBag>,
    storage: Storage,
}

impl SessionInfo {
    /// Create session info, loading persisted tokens from `storage`.
    ///
    /// Each token is read under its current key first and falls back to the legacy key only when
    /// the current one is absent.
    pub fn new(storage: Storage) -> SessionInfo {
        let mut properties = PropertyBag::new();
        for (key, legacy_key) in [
            (keys::RANDOMIZED_DEVICE_TOKEN, keys::DEVICE_FINGERPRINT_ID),
            (keys::RANDOMIZED_BUNDLE_TOKEN, keys::IDENTITY_ID),
        ] {
            let value = storage
                .get_string(&storage_key(key))
                .or_else(|| storage.get_string(&storage_key(legacy_key)));
            if let Some(value) = value {
                properties.set(key, value);
            }
        }

        SessionInfo {
            properties: Mutex::new(properties),
            storage,
        }
    }

    fn properties_mut(&self) -> MutexGuard<'_, PropertyBag> {
        self.properties.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the session id. Not persisted.
    pub fn set_session_id(&self, session_id: &str) -> &Self {
        self.properties_mut().set(keys::SESSION_ID, session_id);
        self
    }

    /// Set the randomized device token (formerly "device fingerprint id") and persist it.
    pub fn set_device_token(&self, token: &str) -> &Self {
        self.set_persisted(keys::RANDOMIZED_DEVICE_TOKEN, token);
        self
    }

    /// Set the randomized bundle token (formerly "identity id") and persist it.
    pub fn set_bundle_token(&self, token: &str) -> &Self {
        self.set_persisted(keys::RANDOMIZED_BUNDLE_TOKEN, token);
        self
    }

    /// Current session id, if a session is open.
    pub fn session_id(&self) -> Option<String> {
        self.get(keys::SESSION_ID)
    }

    /// `true` while a session is open.
    pub fn has_session_id(&self) -> bool {
        self.properties_mut().has(keys::SESSION_ID)
    }

    /// Randomized device token, if known.
    pub fn device_token(&self) -> Option<String> {
        self.get(keys::RANDOMIZED_DEVICE_TOKEN)
    }

    /// Randomized bundle token, if known.
    pub fn bundle_token(&self) -> Option<String> {
        self.get(keys::RANDOMIZED_BUNDLE_TOKEN)
    }

    /// Forget the session id and both tokens, in memory and in storage.
    pub fn clear_identity(&self) {
        self.clear_identity_with(|| ());
    }

    /// Run `under_lock` and forget the session while holding the lock that guards session writes,
    /// so no [`SessionInfo::store_session`] can interleave between the two.
    pub(crate) fn clear_identity_with(&self, under_lock: impl FnOnce()) {
        let mut properties = self.properties_mut();
        under_lock();
        properties.remove(keys::SESSION_ID);
        for key in [
            keys::RANDOMIZED_DEVICE_TOKEN,
            keys::DEVICE_FINGERPRINT_ID,
            keys::RANDOMIZED_BUNDLE_TOKEN,
            keys::IDENTITY_ID,
        ] {
            properties.remove(key);
            if let Err(err) = self.storage.remove(&storage_key(key)) {
                log::warn!(target: "branch", key; "failed to remove session value from storage: {err}");
            }
        }
    }

    /// Store a session returned by the server, unless `blocked` returns `true`.
    ///
    /// `blocked` is evaluated under the lock that guards the writes. A `device_token` of `None`
    /// keeps the current device token. Returns whether the session was stored.
    pub(crate) fn store_session(
        &self,
        session_id: &str,
        bundle_token: &str,
        device_token: Option<&str>,
        blocked: impl FnOnce() -> bool,
    ) -> bool {
        let mut properties = self.properties_mut();
        if blocked() {
            return false;
        }
        properties.set(keys::SESSION_ID, session_id);
        self.persist(&mut properties, keys::RANDOMIZED_BUNDLE_TOKEN, bundle_token);
        if let Some(device_token) = device_token {
            self.persist(&mut properties, keys::RANDOMIZED_DEVICE_TOKEN, device_token);
        }
        true
    }

    /// Snapshot of the session properties as sent to the server.
    pub fn properties(&self) -> PropertyBag {
        self.properties_mut().clone()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.properties_mut().get_str(key).map(str::to_owned)
    }

    fn set_persisted(&self, key: &str, value: &str) {
        let mut properties = self.properties_mut();
        self.persist(&mut properties, key, value);
    }

    /// Storage is written under the same lock as the in-memory value.
    fn persist(&self, properties: &mut PropertyBag, key: &str, value: &str) {
        properties.set(key, value);
        let result = if value.is_empty() {
            self.storage.remove(&storage_key(key)).map(|_| ())
        } else {
            self.storage.set_string(&storage_key(key), value)
        };
        if let Err(err) = result {
            log::warn!(target: "branch", key; "failed to persist session value: {err}");
        }
    }
}

fn storage_key(key: &str) -> String {
    format!("{STORAGE_SECTION}.{key}")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{SessionInfo, STORED_KEYS};
    use crate::storage::{MemoryStorage, Storage};

    fn storage() -> Storage {
        Storage::new(Arc::new(MemoryStorage::new())).with_prefix("key_test")
    }

    #[test]
    fn tokens_are_persisted_immediately() {
        let storage = storage();
        let session = SessionInfo::new(storage.clone());
        session.set_device_token("device").set_bundle_token("bundle");

        assert_eq!(
            storage.get_string("session.randomized_device_token").as_deref(),
            Some("device")
        );

        let reloaded = SessionInfo::new(storage);
        assert_eq!(reloaded.device_token().as_deref(), Some("device"));
        assert_eq!(reloaded.bundle_token().as_deref(), Some("bundle"));
    }

    #[test]
    fn session_id_is_not_persisted() {
        let storage = storage();
        let session = SessionInfo::new(storage.clone());
        session.set_session_id("abc123");
        assert!(session.has_session_id());

        assert!(!SessionInfo::new(storage).has_session_id());
    }

    #[test]
    fn legacy_keys_are_a_fallback() {
        let storage = storage();
        storage
            .set_string("session.device_fingerprint_id", "old-device")
            .unwrap();
        storage.set_string("session.identity_id", "old-bundle").unwrap();
        storage
            .set_string("session.randomized_bundle_token", "new-bundle")
            .unwrap();

        let session = SessionInfo::new(storage);
        assert_eq!(session.device_token().as_deref(), Some("old-device"));
        assert_eq!(session.bundle_token().as_deref(), Some("new-bundle"));
    }

    #[test]
    fn clear_identity_removes_everything() {
        let storage = storage();
        let session = SessionInfo::new(storage.clone());
        session
            .set_session_id("abc")
            .set_device_token("device")
            .set_bundle_token("bundle");

        session.clear_identity();

        assert!(session.properties().is_empty());
        for key in STORED_KEYS {
            assert!(!storage.has(key), "{key}");
        }
    }

    #[test]
    fn blocked_session_is_not_stored() {
        let storage = storage();
        let session = SessionInfo::new(storage.clone());

        assert!(!session.store_session("abc", "bundle", Some("device"), || true));
        assert!(session.properties().is_empty());
        for key in STORED_KEYS {
            assert!(!storage.has(key), "{key}");
        }

        assert!(session.store_session("abc", "bundle", None, || false));
        assert_eq!(session.session_id().as_deref(), Some("abc"));
        assert_eq!(session.bundle_token().as_deref(), Some("bundle"));
        assert_eq!(session.device_token(), None);
    }
}
