//! Process-local storage. Clones share the same entries.

use std::sync::{Arc, Mutex, MutexGuard};

use hashbrown::HashMap;

use super::{KvStorage, PersistError, PersistResult};

/// [`KvStorage`] backed by a shared map.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKvStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with `entries`.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: Arc::new(Mutex::new(map)),
        }
    }

    fn lock(&self) -> PersistResult<MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| PersistError::Message("memory storage lock poisoned".to_string()))
    }
}

impl KvStorage for MemoryKvStorage {
    fn get(&self, key: &str) -> PersistResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> PersistResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> PersistResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}
