use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{StoredRecord, ValueStore};
use crate::error::FlagsyncResult;

type Key = (String, String);

/// In-memory value storage backed by a `RwLock<BTreeMap>`.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<Key, StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str, scope: &str) -> Key {
        (name.to_string(), scope.to_string())
    }
}

impl ValueStore for MemoryStore {
    fn retrieve(&self, name: &str, scope: &str) -> FlagsyncResult<Option<StoredRecord>> {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        Ok(data.get(&Self::key(name, scope)).cloned())
    }

    fn insert(&self, name: &str, scope: &str, value: &str) -> FlagsyncResult<bool> {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        let key = Self::key(name, scope);
        if data.contains_key(&key) {
            return Ok(false);
        }
        data.insert(key, StoredRecord::new(name, scope, value));
        Ok(true)
    }

    fn set(&self, name: &str, scope: &str, value: &str) -> FlagsyncResult<()> {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        let key = Self::key(name, scope);
        let record = match data.remove(&key) {
            Some(existing) => existing.updated(value),
            None => StoredRecord::new(name, scope, value),
        };
        data.insert(key, record);
        Ok(())
    }

    fn set_for_all_scopes(&self, name: &str, value: &str) -> FlagsyncResult<()> {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        for record in data.values_mut().filter(|r| r.name == name) {
            *record = record.clone().updated(value);
        }
        Ok(())
    }

    fn delete(&self, name: &str, scope: &str) -> FlagsyncResult<()> {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        data.remove(&Self::key(name, scope));
        Ok(())
    }

    fn purge(&self, names: Option<&[String]>) -> FlagsyncResult<()> {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        match names {
            None => data.clear(),
            Some(names) => data.retain(|(name, _), _| !names.contains(name)),
        }
        Ok(())
    }

    fn records(&self) -> FlagsyncResult<Vec<StoredRecord>> {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        Ok(data.values().cloned().collect())
    }

    fn count(&self) -> FlagsyncResult<usize> {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        Ok(data.len())
    }
}
