pub mod memory;
#[cfg(feature = "sled")]
pub mod sled_store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FlagsyncResult;

/// A persisted feature value for one (feature, scope) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub name: String,
    /// Serialized scope key.
    pub scope: String,
    /// JSON text of the value.
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn new(name: &str, scope: &str, value: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            scope: scope.to_string(),
            value: value.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the value, keeping `created_at`.
    pub fn updated(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self.updated_at = Utc::now();
        self
    }
}

/// Durable storage of feature values keyed by (feature name, scope key).
/// Implementations must be thread-safe and make `insert` and `set` atomic
/// per key.
pub trait ValueStore: Send + Sync {
    fn retrieve(&self, name: &str, scope: &str) -> FlagsyncResult<Option<StoredRecord>>;

    /// Insert a new record. Returns `false` without writing when a record for
    /// the pair already exists.
    fn insert(&self, name: &str, scope: &str, value: &str) -> FlagsyncResult<bool>;

    /// Insert or update the record for the pair.
    fn set(&self, name: &str, scope: &str, value: &str) -> FlagsyncResult<()>;

    /// Update every existing record of `name`.
    fn set_for_all_scopes(&self, name: &str, value: &str) -> FlagsyncResult<()>;

    fn delete(&self, name: &str, scope: &str) -> FlagsyncResult<()>;

    /// Delete the records of the given features, or every record when `None`.
    fn purge(&self, names: Option<&[String]>) -> FlagsyncResult<()>;

    /// Every stored record, ordered by (name, scope).
    fn records(&self) -> FlagsyncResult<Vec<StoredRecord>>;

    fn count(&self) -> FlagsyncResult<usize> {
        Ok(self.records()?.len())
    }
}
