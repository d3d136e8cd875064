use tracing::debug;

use super::{StoredRecord, ValueStore};
use crate::error::{FlagsyncError, FlagsyncResult};

/// Persistent value storage backed by sled. Each configured table is a
/// separate sled tree.
pub struct SledStore {
    tree: sled::Tree,
    table: String,
}

impl SledStore {
    pub fn new(db: &sled::Db, table: &str) -> FlagsyncResult<Self> {
        let tree = db.open_tree(table)?;
        Ok(Self {
            tree,
            table: table.to_string(),
        })
    }

    /// Open a sled database at the given directory path.
    pub fn open(data_dir: &str, table: &str) -> FlagsyncResult<Self> {
        let db = sled::open(data_dir).map_err(|e| {
            FlagsyncError::Store(format!("failed to open sled db at {}: {}", data_dir, e))
        })?;
        debug!(data_dir, table, "opened sled value store");
        Self::new(&db, table)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    // Keys are the JSON array `[name, scope]`, so every key of one feature
    // shares the prefix `["name",`.
    fn record_key(name: &str, scope: &str) -> FlagsyncResult<Vec<u8>> {
        Ok(serde_json::to_vec(&(name, scope))?)
    }

    fn name_prefix(name: &str) -> FlagsyncResult<Vec<u8>> {
        Ok(format!("[{},", serde_json::to_string(name)?).into_bytes())
    }

    fn decode(bytes: &[u8]) -> FlagsyncResult<StoredRecord> {
        serde_json::from_slice(bytes)
            .map_err(|e| FlagsyncError::Store(format!("corrupt record: {}", e)))
    }

    /// Atomically replace the record under `key` with `f(current)`.
    /// Returning `None` from `f` leaves a missing key missing.
    fn update_record<F>(&self, key: &[u8], f: F) -> FlagsyncResult<()>
    where
        F: Fn(Option<StoredRecord>) -> Option<StoredRecord>,
    {
        let mut failure = None;
        self.tree.update_and_fetch(key, |current| {
            failure = None;
            let record = match current.map(Self::decode).transpose() {
                Ok(record) => record,
                Err(e) => {
                    failure = Some(e);
                    return current.map(|bytes| bytes.to_vec());
                }
            };
            match f(record).map(|r| serde_json::to_vec(&r)) {
                Some(Ok(bytes)) => Some(bytes),
                Some(Err(e)) => {
                    failure = Some(e.into());
                    current.map(|bytes| bytes.to_vec())
                }
                None => current.map(|bytes| bytes.to_vec()),
            }
        })?;
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn keys_of(&self, name: &str) -> FlagsyncResult<Vec<sled::IVec>> {
        self.tree
            .scan_prefix(Self::name_prefix(name)?)
            .keys()
            .map(|key| key.map_err(FlagsyncError::from))
            .collect()
    }

    fn flush(&self) -> FlagsyncResult<()> {
        self.tree
            .flush()
            .map_err(|e| FlagsyncError::Store(format!("failed to flush: {}", e)))?;
        Ok(())
    }
}

impl ValueStore for SledStore {
    fn retrieve(&self, name: &str, scope: &str) -> FlagsyncResult<Option<StoredRecord>> {
        match self.tree.get(Self::record_key(name, scope)?)? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn insert(&self, name: &str, scope: &str, value: &str) -> FlagsyncResult<bool> {
        let record = serde_json::to_vec(&StoredRecord::new(name, scope, value))?;
        let swapped = self.tree.compare_and_swap(
            Self::record_key(name, scope)?,
            None as Option<&[u8]>,
            Some(record),
        )?;
        if swapped.is_err() {
            return Ok(false);
        }
        self.flush()?;
        Ok(true)
    }

    fn set(&self, name: &str, scope: &str, value: &str) -> FlagsyncResult<()> {
        self.update_record(&Self::record_key(name, scope)?, |current| {
            Some(match current {
                Some(existing) => existing.updated(value),
                None => StoredRecord::new(name, scope, value),
            })
        })?;
        self.flush()
    }

    fn set_for_all_scopes(&self, name: &str, value: &str) -> FlagsyncResult<()> {
        for key in self.keys_of(name)? {
            self.update_record(&key, |current| current.map(|r| r.updated(value)))?;
        }
        self.flush()
    }

    fn delete(&self, name: &str, scope: &str) -> FlagsyncResult<()> {
        self.tree.remove(Self::record_key(name, scope)?)?;
        self.flush()
    }

    fn purge(&self, names: Option<&[String]>) -> FlagsyncResult<()> {
        match names {
            None => self.tree.clear()?,
            Some(names) => {
                for name in names {
                    for key in self.keys_of(name)? {
                        self.tree.remove(key)?;
                    }
                }
            }
        }
        self.flush()
    }

    fn records(&self) -> FlagsyncResult<Vec<StoredRecord>> {
        let mut records = self
            .tree
            .iter()
            .values()
            .map(|bytes| Self::decode(&bytes?))
            .collect::<FlagsyncResult<Vec<_>>>()?;
        records.sort_by(|a, b| (&a.name, &a.scope).cmp(&(&b.name, &b.scope)));
        Ok(records)
    }

    fn count(&self) -> FlagsyncResult<usize> {
        Ok(self.tree.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store(dir: &tempfile::TempDir, table: &str) -> SledStore {
        SledStore::open(dir.path().to_str().unwrap(), table).unwrap()
    }

    #[test]
    fn test_insert_and_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, "features");

        assert!(store.insert("foo", "User|1", "true").unwrap());
        assert!(!store.insert("foo", "User|1", "false").unwrap());

        let record = store.retrieve("foo", "User|1").unwrap().unwrap();
        assert_eq!(record.name, "foo");
        assert_eq!(record.scope, "User|1");
        assert_eq!(record.value, "true");
        assert!(store.retrieve("foo", "User|2").unwrap().is_none());
    }

    #[test]
    fn test_set_upserts() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, "features");

        store.set("foo", "tim", "99").unwrap();
        let first = store.retrieve("foo", "tim").unwrap().unwrap();
        store.set("foo", "tim", "100").unwrap();
        let second = store.retrieve("foo", "tim").unwrap().unwrap();

        assert_eq!(second.value, "100");
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_prefix_does_not_match_longer_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, "features");
        store.set("foo", "tim", "true").unwrap();
        store.set("foobar", "tim", "true").unwrap();

        store.purge(Some(&["foo".to_string()])).unwrap();

        assert!(store.retrieve("foo", "tim").unwrap().is_none());
        assert!(store.retrieve("foobar", "tim").unwrap().is_some());
    }

    #[test]
    fn test_set_for_all_scopes_and_purge_all() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, "features");
        store.set("foo", "tim", "false").unwrap();
        store.set("foo", "taylor", "false").unwrap();

        store.set_for_all_scopes("foo", "true").unwrap();
        let values: Vec<_> = store.records().unwrap().into_iter().map(|r| r.value).collect();
        assert_eq!(values, vec!["true", "true"]);

        store.purge(None).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_writes_over_corrupt_records_fail() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, "features");
        let key = SledStore::record_key("foo", "tim").unwrap();
        store.tree.insert(key.as_slice(), b"{not a record".to_vec()).unwrap();

        assert!(matches!(
            store.set("foo", "tim", "true"),
            Err(FlagsyncError::Store(_))
        ));
        assert!(matches!(
            store.set_for_all_scopes("foo", "true"),
            Err(FlagsyncError::Store(_))
        ));
        let raw = store.tree.get(key.as_slice()).unwrap().unwrap();
        assert_eq!(raw.as_ref(), b"{not a record");
    }

    #[test]
    fn test_tables_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let foo = SledStore::new(&db, "foo_features").unwrap();
        let bar = SledStore::new(&db, "bar_features").unwrap();

        foo.set("flag", "tim", "true").unwrap();

        assert_eq!(foo.table(), "foo_features");
        assert_eq!(bar.table(), "bar_features");
        assert_eq!(foo.count().unwrap(), 1);
        assert_eq!(bar.count().unwrap(), 0);
    }
}
