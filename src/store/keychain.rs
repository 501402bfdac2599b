use super::{CredentialStore, StoreError};

pub const DEFAULT_KEYRING_SERVICE: &str = "com.softaworks.restguard";

/// OS keychain / secret service, one entry per key.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new(DEFAULT_KEYRING_SERVICE)
    }
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, keyring::Error> {
        keyring::Entry::new(&self.service, key)
    }

    pub fn is_available(&self) -> bool {
        let Ok(entry) = self.entry("probe") else {
            return false;
        };

        match entry.get_password() {
            Ok(_) => true,
            Err(keyring::Error::NoEntry) => true,
            Err(keyring::Error::BadEncoding(_)) => true,
            Err(keyring::Error::Ambiguous(_)) => true,
            Err(keyring::Error::NoStorageAccess(_)) => false,
            Err(keyring::Error::PlatformFailure(_)) => false,
            Err(_) => false,
        }
    }
}

fn unavailable(err: keyring::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

/// Only a missing entry means "nothing stored"; an unreadable one is an error
/// so the caller is not silently signed out.
fn stored_value(result: Result<String, keyring::Error>) -> Result<Option<String>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(unavailable(err)),
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entry = self.entry(key).map_err(unavailable)?;
        stored_value(entry.get_password())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let entry = self.entry(key).map_err(unavailable)?;
        entry.set_password(value).map_err(unavailable)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let entry = self.entry(key).map_err(unavailable)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(unavailable(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_value_treats_only_missing_entry_as_empty() {
        assert_eq!(
            stored_value(Ok("a1".to_string())).unwrap().as_deref(),
            Some("a1")
        );
        assert_eq!(stored_value(Err(keyring::Error::NoEntry)).unwrap(), None);
    }

    #[test]
    fn stored_value_surfaces_unreadable_entries() {
        assert!(matches!(
            stored_value(Err(keyring::Error::BadEncoding(vec![0xff]))),
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            stored_value(Err(keyring::Error::Ambiguous(Vec::new()))),
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            stored_value(Err(keyring::Error::NoStorageAccess("locked".into()))),
            Err(StoreError::Unavailable(_))
        ));
    }
}
