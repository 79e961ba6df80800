use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use super::storage::{MemoryBackend, TokenBackend};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// Holder for the current token pair.
///
/// Reads come from an in-memory copy loaded once at construction; every write
/// goes through to the backend immediately. Backend failures are logged and
/// never returned, so the in-memory copy stays authoritative for the process.
pub struct CredentialStore {
    backend: Box<dyn TokenBackend>,
    current: RwLock<Credentials>,
}

impl CredentialStore {
    pub fn open(backend: impl TokenBackend + 'static) -> Self {
        let current = Credentials {
            access_token: load_key(&backend, ACCESS_TOKEN_KEY),
            refresh_token: load_key(&backend, REFRESH_TOKEN_KEY),
        };
        debug!(
            has_access = current.access_token.is_some(),
            has_refresh = current.refresh_token.is_some(),
            "Credential store opened"
        );
        Self {
            backend: Box::new(backend),
            current: RwLock::new(current),
        }
    }

    pub fn in_memory() -> Self {
        Self::open(MemoryBackend::new())
    }

    pub fn get(&self) -> Credentials {
        self.read().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token.clone()
    }

    /// Store a freshly issued token pair.
    pub fn set(&self, access: &str, refresh: &str) {
        let mut current = self.write();
        current.access_token = Some(access.to_string());
        current.refresh_token = Some(refresh.to_string());
        self.persist(ACCESS_TOKEN_KEY, access);
        self.persist(REFRESH_TOKEN_KEY, refresh);
    }

    /// Replace only the access token after a renewal.
    pub fn set_access(&self, access: &str) {
        let mut current = self.write();
        current.access_token = Some(access.to_string());
        self.persist(ACCESS_TOKEN_KEY, access);
    }

    /// Replace the access token only while `refresh` is still the stored
    /// refresh token. Returns `false`, writing nothing, once the pair was
    /// cleared or replaced by another login.
    pub fn set_access_if(&self, refresh: &str, access: &str) -> bool {
        let mut current = self.write();
        if current.refresh_token.as_deref() != Some(refresh) {
            return false;
        }
        current.access_token = Some(access.to_string());
        self.persist(ACCESS_TOKEN_KEY, access);
        true
    }

    pub fn clear(&self) {
        let mut current = self.write();
        self.wipe(&mut current);
    }

    /// Clear only while `refresh` is still the stored refresh token.
    pub fn clear_if(&self, refresh: &str) -> bool {
        let mut current = self.write();
        if current.refresh_token.as_deref() != Some(refresh) {
            return false;
        }
        self.wipe(&mut current);
        true
    }

    fn wipe(&self, current: &mut Credentials) {
        *current = Credentials::default();
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.backend.remove(key) {
                warn!(key, error = %e, "Failed to remove stored token");
            }
        }
    }

    fn persist(&self, key: &str, value: &str) {
        if let Err(e) = self.backend.save(key, value) {
            warn!(key, error = %e, "Failed to persist token");
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Credentials> {
        self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Credentials> {
        self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn load_key(backend: &dyn TokenBackend, key: &str) -> Option<String> {
    match backend.load(key) {
        Ok(value) => value.filter(|v| !v.is_empty()),
        Err(e) => {
            warn!(key, error = %e, "Failed to load stored token");
            None
        }
    }
}
