use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::Backend;

/// An in-memory backend.
///
/// Data is not persisted between runs; this is mainly for tests and local
/// experimentation, so it shares a single lock for all operations.
pub struct MemoryBackend {
    state: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend {
            state: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let state = self.state.read().expect("state lock poisoned");
        Ok(state.get(key).cloned())
    }

    fn batch_get(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let state = self.state.read().expect("state lock poisoned");
        Ok(keys.iter().map(|key| state.get(key).cloned()).collect())
    }

    fn batch_put(&self, entries: &[(String, Option<Vec<u8>>)]) -> Result<()> {
        let mut state = self.state.write().expect("state lock poisoned");
        for (key, value) in entries {
            match value {
                Some(value) => {
                    state.insert(key.clone(), value.clone());
                }
                None => {
                    state.remove(key);
                }
            }
        }
        Ok(())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut state = self.state.write().expect("state lock poisoned");
        state.insert(key.to_owned(), value.to_vec());
        Ok(())
    }
}
