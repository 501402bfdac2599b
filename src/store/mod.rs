//! Credential persistence.
//!
//! The pipeline only needs `get`/`set`/`remove` on string keys. The
//! [`CredentialVault`] maps one access/refresh pair onto two such keys so the
//! backing store stays agnostic of what it holds.

mod file;
mod keychain;
mod memory;

pub use file::FileStore;
pub use keychain::{KeyringStore, DEFAULT_KEYRING_SERVICE};
pub use memory::MemoryStore;

use crate::types::Credential;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("OS keychain/secret service is unavailable: {0}")]
    Unavailable(String),
    #[error("credential file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

#[derive(Clone)]
pub struct CredentialVault {
    store: Arc<dyn CredentialStore>,
    access_key: String,
    refresh_key: String,
}

impl CredentialVault {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        access_key: impl Into<String>,
        refresh_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            access_key: access_key.into(),
            refresh_key: refresh_key.into(),
        }
    }

    /// Current pair, or `None` when no access token is stored.
    pub fn load(&self) -> Result<Option<Credential>, StoreError> {
        let Some(access_token) = non_empty(self.store.get(&self.access_key)?) else {
            return Ok(None);
        };
        let refresh_token = non_empty(self.store.get(&self.refresh_key)?);
        Ok(Some(Credential {
            access_token,
            refresh_token,
        }))
    }

    pub fn refresh_token(&self) -> Result<Option<String>, StoreError> {
        Ok(non_empty(self.store.get(&self.refresh_key)?))
    }

    /// Replaces both keys; a missing refresh token removes the stored one.
    pub fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        self.store.set(&self.access_key, &credential.access_token)?;
        match credential.refresh_token.as_deref() {
            Some(refresh) => self.store.set(&self.refresh_key, refresh),
            None => self.store.remove(&self.refresh_key),
        }
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        let access = self.store.remove(&self.access_key);
        let refresh = self.store.remove(&self.refresh_key);
        access.and(refresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> (Arc<MemoryStore>, CredentialVault) {
        let store = Arc::new(MemoryStore::new());
        let vault = CredentialVault::new(store.clone(), "token", "refreshToken");
        (store, vault)
    }

    #[test]
    fn load_returns_none_without_access_token() {
        let (store, vault) = vault();
        store.set("refreshToken", "r1").unwrap();
        assert_eq!(vault.load().unwrap(), None);
        assert_eq!(vault.refresh_token().unwrap().as_deref(), Some("r1"));
    }

    #[test]
    fn save_replaces_pair_wholesale() {
        let (store, vault) = vault();
        vault
            .save(&Credential::new("a1", Some("r1".to_string())))
            .unwrap();
        vault.save(&Credential::new("a2", None)).unwrap();

        assert_eq!(store.get("token").unwrap().as_deref(), Some("a2"));
        assert_eq!(store.get("refreshToken").unwrap(), None);
    }

    #[test]
    fn load_trims_and_ignores_blank_values() {
        let (store, vault) = vault();
        store.set("token", "  a1 ").unwrap();
        store.set("refreshToken", "   ").unwrap();
        assert_eq!(vault.load().unwrap(), Some(Credential::new("a1", None)));
    }

    #[test]
    fn clear_removes_both_keys() {
        let (store, vault) = vault();
        vault
            .save(&Credential::new("a1", Some("r1".to_string())))
            .unwrap();
        vault.clear().unwrap();
        assert_eq!(store.get("token").unwrap(), None);
        assert_eq!(store.get("refreshToken").unwrap(), None);
    }
}
