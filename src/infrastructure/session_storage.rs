use crate::infrastructure::error::InfraError;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Key/value storage the session provider persists its tokens in.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError>;
    fn set(&self, key: &str, value: &str) -> Result<(), InfraError>;
    fn remove(&self, key: &str) -> Result<(), InfraError>;
    fn keys(&self) -> Result<Vec<String>, InfraError>;
}

/// Whole map is rewritten on every change; a missing file reads as empty.
#[derive(Debug)]
pub struct JsonFileSessionStorage {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl JsonFileSessionStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_guard: Mutex::new(()),
        }
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, InfraError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn update<F>(&self, change: F) -> Result<(), InfraError>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let _guard = self
            .write_guard
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("session storage: {error}")))?;
        let mut map = self.read_map()?;
        change(&mut map);
        let formatted = serde_json::to_string_pretty(&map)?;
        fs::write(&self.path, format!("{formatted}\n"))?;
        Ok(())
    }
}

impl SessionStorage for JsonFileSessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        self.update(|map| {
            map.remove(key);
        })
    }

    fn keys(&self) -> Result<Vec<String>, InfraError> {
        Ok(self.read_map()?.into_keys().collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySessionStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl InMemorySessionStorage {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, InfraError> {
        self.entries
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("in-memory session: {error}")))
    }
}

impl SessionStorage for InMemorySessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, InfraError> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_storage_persists_across_instances() {
        let path = std::env::temp_dir().join(format!(
            "lifesync-session-tests-{}.json",
            std::process::id()
        ));
        let _ = fs::remove_file(&path);

        let storage = JsonFileSessionStorage::new(&path);
        assert_eq!(storage.get("sb-auth-token").expect("get"), None);
        storage.set("sb-auth-token", "{\"a\":1}").expect("set");
        storage.set("theme", "dark").expect("set");

        let reopened = JsonFileSessionStorage::new(&path);
        assert_eq!(
            reopened.get("sb-auth-token").expect("get").as_deref(),
            Some("{\"a\":1}")
        );
        assert_eq!(reopened.keys().expect("keys"), vec!["sb-auth-token", "theme"]);

        reopened.remove("sb-auth-token").expect("remove");
        assert_eq!(storage.keys().expect("keys"), vec!["theme"]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn in_memory_storage_roundtrip() {
        let storage = InMemorySessionStorage::default();
        storage.set("k", "v").expect("set");
        assert_eq!(storage.get("k").expect("get").as_deref(), Some("v"));
        storage.remove("k").expect("remove");
        assert!(storage.keys().expect("keys").is_empty());
    }
}
