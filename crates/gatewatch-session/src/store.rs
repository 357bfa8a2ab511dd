//! Durable persistence for tokens and the cached user snapshot.
//!
//! The store writes through two redundant media: a key-value backend (the
//! fast synchronous read path) and a cookie sink (so server-rendered pages
//! can read the short-lived access-token backup). Both sit behind traits;
//! a surface without either capability gets a [`SecureTokenStore::disabled`]
//! store whose operations are all no-ops.
//!
//! Storage failures never propagate: a session must not hard-fail because
//! of a storage-layer quirk, so errors are logged and swallowed here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use gatewatch_api::types::{AuthTokens, User};
use thiserror::Error;
use tracing::warn;

const KEY_ACCESS_TOKEN: &str = "gw.access_token";
const KEY_REFRESH_TOKEN: &str = "gw.refresh_token";
const KEY_EXPIRES_AT: &str = "gw.expires_at";
const KEY_USER: &str = "gw.user";

/// Short-lived cookie carrying the access token for server-side reads.
pub const ACCESS_COOKIE_NAME: &str = "gw_access_token_backup";
/// Longer-lived cookie carrying the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "gw_refresh_token";

const ACCESS_COOKIE_MAX_AGE: Duration = Duration::from_secs(30 * 60);
const REFRESH_COOKIE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, Error)]
#[error("storage_backend_failed:{message}")]
pub struct StorageError {
    pub message: String,
}

impl StorageError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Synchronous key-value storage, shared across all surfaces of the origin.
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// A cookie write as the store issues it; always `SameSite=strict`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub max_age: Duration,
    pub secure: bool,
}

/// Destination for the backup cookies. A browser surface bridges this to
/// document cookies; tests use [`MemoryCookieSink`].
pub trait CookieSink: Send + Sync {
    fn set_cookie(&self, cookie: CookieRecord) -> Result<(), StorageError>;
    fn clear_cookie(&self, name: &str) -> Result<(), StorageError>;
}

/// In-memory backend used in tests and short-lived embedded surfaces.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock().remove(key);
        Ok(())
    }
}

/// JSON-file backend for desktop surfaces; the whole map is rewritten on
/// every set, reads load the file fresh so sibling processes stay visible.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> HashMap<String, String> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|error| StorageError::new(error.to_string()))?;
        std::fs::write(&self.path, bytes).map_err(|error| StorageError::new(error.to_string()))
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.load().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.load();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.load();
        entries.remove(key);
        self.persist(&entries)
    }
}

/// Cookie sink that records writes so tests can assert on attributes.
#[derive(Debug, Default)]
pub struct MemoryCookieSink {
    cookies: Mutex<HashMap<String, CookieRecord>>,
}

impl MemoryCookieSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<CookieRecord> {
        self.cookies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }
}

impl CookieSink for MemoryCookieSink {
    fn set_cookie(&self, cookie: CookieRecord) -> Result<(), StorageError> {
        self.cookies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(cookie.name.clone(), cookie);
        Ok(())
    }

    fn clear_cookie(&self, name: &str) -> Result<(), StorageError> {
        self.cookies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(name);
        Ok(())
    }
}

/// The single write path for session credentials.
///
/// All reads are synchronous and side-effect free; all writes go through
/// both media. Cheap to clone; clones share the same backends.
#[derive(Clone)]
pub struct SecureTokenStore {
    backend: Option<Arc<dyn StorageBackend>>,
    cookies: Option<Arc<dyn CookieSink>>,
    /// Mark cookies `Secure`; false only on unencrypted local dev origins.
    secure_cookies: bool,
}

impl SecureTokenStore {
    #[must_use]
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        cookies: Option<Arc<dyn CookieSink>>,
        secure_cookies: bool,
    ) -> Self {
        Self {
            backend: Some(backend),
            cookies,
            secure_cookies,
        }
    }

    /// Store for surfaces without any storage capability (server-side
    /// rendering): every operation is a no-op rather than an error.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            backend: None,
            cookies: None,
            secure_cookies: true,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Persist the token triple across both media.
    pub fn set_tokens(&self, tokens: &AuthTokens) {
        self.backend_set(KEY_ACCESS_TOKEN, &tokens.access_token);
        self.backend_set(KEY_REFRESH_TOKEN, &tokens.refresh_token);
        self.backend_set(KEY_EXPIRES_AT, &tokens.expires_at.timestamp_millis().to_string());

        self.cookie_set(CookieRecord {
            name: ACCESS_COOKIE_NAME.to_string(),
            value: tokens.access_token.clone(),
            max_age: ACCESS_COOKIE_MAX_AGE,
            secure: self.secure_cookies,
        });
        self.cookie_set(CookieRecord {
            name: REFRESH_COOKIE_NAME.to_string(),
            value: tokens.refresh_token.clone(),
            max_age: REFRESH_COOKIE_MAX_AGE,
            secure: self.secure_cookies,
        });
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.backend.as_ref()?.get(KEY_ACCESS_TOKEN)
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.backend.as_ref()?.get(KEY_REFRESH_TOKEN)
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.backend.as_ref()?.get(KEY_EXPIRES_AT)?;
        let millis = raw.trim().parse::<i64>().ok()?;
        DateTime::<Utc>::from_timestamp_millis(millis)
    }

    /// The full persisted triple, when every part is present.
    #[must_use]
    pub fn tokens(&self) -> Option<AuthTokens> {
        Some(AuthTokens {
            access_token: self.access_token()?,
            refresh_token: self.refresh_token()?,
            expires_at: self.expires_at()?,
        })
    }

    pub fn clear_tokens(&self) {
        self.backend_remove(KEY_ACCESS_TOKEN);
        self.backend_remove(KEY_REFRESH_TOKEN);
        self.backend_remove(KEY_EXPIRES_AT);
        self.cookie_clear(ACCESS_COOKIE_NAME);
        self.cookie_clear(REFRESH_COOKIE_NAME);
    }

    pub fn set_user(&self, user: &User) {
        match serde_json::to_string(user) {
            Ok(json) => self.backend_set(KEY_USER, &json),
            Err(error) => warn!(error = %error, "failed to serialize cached user"),
        }
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        let raw = self.backend.as_ref()?.get(KEY_USER)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(error) => {
                warn!(error = %error, "cached user record is corrupt; ignoring");
                None
            }
        }
    }

    pub fn clear_user(&self) {
        self.backend_remove(KEY_USER);
    }

    pub fn clear_all(&self) {
        self.clear_tokens();
        self.clear_user();
    }

    fn backend_set(&self, key: &str, value: &str) {
        if let Some(backend) = self.backend.as_ref() {
            if let Err(error) = backend.set(key, value) {
                warn!(key, error = %error, "storage write failed");
            }
        }
    }

    fn backend_remove(&self, key: &str) {
        if let Some(backend) = self.backend.as_ref() {
            if let Err(error) = backend.remove(key) {
                warn!(key, error = %error, "storage remove failed");
            }
        }
    }

    fn cookie_set(&self, cookie: CookieRecord) {
        if let Some(sink) = self.cookies.as_ref() {
            let name = cookie.name.clone();
            if let Err(error) = sink.set_cookie(cookie) {
                warn!(cookie = %name, error = %error, "cookie write failed");
            }
        }
    }

    fn cookie_clear(&self, name: &str) {
        if let Some(sink) = self.cookies.as_ref() {
            if let Err(error) = sink.clear_cookie(name) {
                warn!(cookie = %name, error = %error, "cookie clear failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tokens() -> AuthTokens {
        AuthTokens::expires_in_secs("access-1", "refresh-1", 900)
    }

    fn sample_user() -> User {
        User {
            id: "u1".to_string(),
            email: "dev@example.com".to_string(),
            name: "Dev".to_string(),
            email_verified: true,
            default_organization_id: None,
            organizations: Vec::new(),
        }
    }

    #[test]
    fn tokens_round_trip_through_backend() {
        let sink = Arc::new(MemoryCookieSink::new());
        let store = SecureTokenStore::new(Arc::new(MemoryStorage::new()), Some(sink), true);
        let tokens = sample_tokens();

        store.set_tokens(&tokens);
        assert_eq!(store.access_token().as_deref(), Some("access-1"));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh-1"));
        let restored = store.tokens().expect("full triple should be present");
        // Millisecond persistence drops sub-millisecond precision.
        assert_eq!(
            restored.expires_at.timestamp_millis(),
            tokens.expires_at.timestamp_millis()
        );
    }

    #[test]
    fn cookies_carry_expected_lifetimes_and_flags() {
        let sink = Arc::new(MemoryCookieSink::new());
        let store =
            SecureTokenStore::new(Arc::new(MemoryStorage::new()), Some(sink.clone()), true);
        store.set_tokens(&sample_tokens());

        let access = sink.cookie(ACCESS_COOKIE_NAME).expect("access cookie");
        assert_eq!(access.max_age, Duration::from_secs(30 * 60));
        assert!(access.secure);

        let refresh = sink.cookie(REFRESH_COOKIE_NAME).expect("refresh cookie");
        assert_eq!(refresh.max_age, Duration::from_secs(7 * 24 * 60 * 60));

        store.clear_tokens();
        assert!(sink.cookie(ACCESS_COOKIE_NAME).is_none());
        assert!(sink.cookie(REFRESH_COOKIE_NAME).is_none());
    }

    #[test]
    fn user_round_trips_and_clears() {
        let store = SecureTokenStore::new(Arc::new(MemoryStorage::new()), None, true);
        store.set_user(&sample_user());
        assert_eq!(store.user().map(|user| user.id), Some("u1".to_string()));
        store.clear_user();
        assert!(store.user().is_none());
    }

    #[test]
    fn disabled_store_is_a_total_no_op() {
        let store = SecureTokenStore::disabled();
        assert!(!store.is_enabled());
        store.set_tokens(&sample_tokens());
        store.set_user(&sample_user());
        assert!(store.access_token().is_none());
        assert!(store.refresh_token().is_none());
        assert!(store.expires_at().is_none());
        assert!(store.user().is_none());
        store.clear_all();
    }

    #[test]
    fn corrupt_cached_user_reads_as_absent() {
        let backend = Arc::new(MemoryStorage::new());
        backend
            .set(KEY_USER, "{not json")
            .expect("memory set cannot fail");
        let store = SecureTokenStore::new(backend, None, true);
        assert!(store.user().is_none());
    }

    #[test]
    fn file_backend_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");

        let store = SecureTokenStore::new(Arc::new(FileStorage::new(&path)), None, true);
        store.set_tokens(&sample_tokens());
        drop(store);

        let reopened = SecureTokenStore::new(Arc::new(FileStorage::new(&path)), None, true);
        assert_eq!(reopened.access_token().as_deref(), Some("access-1"));
    }
}
