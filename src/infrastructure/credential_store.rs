use crate::domain::models::OAuthToken;
use crate::infrastructure::error::InfraError;
use std::collections::HashMap;
use std::sync::Mutex;

const KEYRING_SERVICE: &str = "lifesync.calendar.google";

/// Calendar OAuth tokens, one slot per signed-in user.
pub trait CredentialStore: Send + Sync {
    fn save_token(&self, user_id: &str, token: &OAuthToken) -> Result<(), InfraError>;
    fn load_token(&self, user_id: &str) -> Result<Option<OAuthToken>, InfraError>;
    fn delete_token(&self, user_id: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service_name: String,
}

impl KeyringCredentialStore {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn entry(&self, user_id: &str) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, user_id)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE)
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn save_token(&self, user_id: &str, token: &OAuthToken) -> Result<(), InfraError> {
        let payload =
            serde_json::to_string(token).map_err(|error| InfraError::Credential(error.to_string()))?;
        self.entry(user_id)?
            .set_password(&payload)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }

    fn load_token(&self, user_id: &str) -> Result<Option<OAuthToken>, InfraError> {
        let payload = match self.entry(user_id)?.get_password() {
            Ok(value) => value,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(error) => return Err(InfraError::Credential(error.to_string())),
        };

        serde_json::from_str::<OAuthToken>(&payload)
            .map(Some)
            .map_err(|error| InfraError::Credential(format!("stored token is unreadable: {error}")))
    }

    fn delete_token(&self, user_id: &str) -> Result<(), InfraError> {
        match self.entry(user_id)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    tokens: Mutex<HashMap<String, OAuthToken>>,
}

impl InMemoryCredentialStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, OAuthToken>>, InfraError> {
        self.tokens
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("in-memory credentials: {error}")))
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn save_token(&self, user_id: &str, token: &OAuthToken) -> Result<(), InfraError> {
        self.lock()?.insert(user_id.to_string(), token.clone());
        Ok(())
    }

    fn load_token(&self, user_id: &str) -> Result<Option<OAuthToken>, InfraError> {
        Ok(self.lock()?.get(user_id).cloned())
    }

    fn delete_token(&self, user_id: &str) -> Result<(), InfraError> {
        self.lock()?.remove(user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn in_memory_store_keeps_tokens_per_user() {
        let store = InMemoryCredentialStore::default();
        let token = OAuthToken {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid"),
            token_type: "Bearer".to_string(),
            scope: None,
        };

        store.save_token("alice", &token).expect("save");
        assert_eq!(store.load_token("alice").expect("load"), Some(token));
        assert_eq!(store.load_token("bob").expect("load"), None);

        store.delete_token("alice").expect("delete");
        store.delete_token("alice").expect("delete twice");
        assert_eq!(store.load_token("alice").expect("load"), None);
    }
}
