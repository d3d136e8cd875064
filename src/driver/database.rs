use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::Driver;
use crate::error::{FlagsyncError, FlagsyncResult};
use crate::resolver::Resolver;
use crate::scope::{Scope, ScopeSerializer};
use crate::store::ValueStore;

/// How many times `get` re-reads after losing an insert race.
const MAX_INSERT_RETRIES: u32 = 2;

/// Driver that keeps every value in a [`ValueStore`].
///
/// Without a request context [`Scope::CurrentActor`] cannot be resolved and
/// is stored like the null scope.
pub struct DatabaseDriver {
    store: Arc<dyn ValueStore>,
    resolver: Arc<dyn Resolver>,
    serializer: ScopeSerializer,
}

impl DatabaseDriver {
    pub fn new(store: Arc<dyn ValueStore>, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            store,
            resolver,
            serializer: ScopeSerializer::default(),
        }
    }

    pub fn with_serializer(mut self, serializer: ScopeSerializer) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn store(&self) -> &Arc<dyn ValueStore> {
        &self.store
    }

    /// Stored value of `feature` for `scope`, decoded.
    pub(crate) fn retrieve(&self, feature: &str, scope: &Scope) -> FlagsyncResult<Option<Value>> {
        let key = self.serializer.serialize(scope);
        match self.store.retrieve(feature, &key)? {
            Some(record) => Ok(Some(serde_json::from_str(&record.value)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn resolve(&self, feature: &str, scope: &Scope) -> Option<Value> {
        let value = self.resolver.resolve(feature, scope);
        match value {
            Some(_) => debug!(feature, scope = %scope, "resolved feature value"),
            None => debug!(feature, scope = %scope, "unknown feature"),
        }
        value
    }

    /// Store a freshly resolved value. Returns `false` when another writer
    /// stored a value for the pair first.
    pub(crate) fn insert(&self, feature: &str, scope: &Scope, value: &Value) -> FlagsyncResult<bool> {
        let key = self.serializer.serialize(scope);
        let inserted = self
            .store
            .insert(feature, &key, &serde_json::to_string(value)?)?;
        if !inserted {
            warn!(feature, scope = %key, "feature value was inserted concurrently");
        }
        Ok(inserted)
    }
}

impl Driver for DatabaseDriver {
    fn get(&self, feature: &str, scope: &Scope) -> FlagsyncResult<Value> {
        for _ in 0..=MAX_INSERT_RETRIES {
            if let Some(value) = self.retrieve(feature, scope)? {
                return Ok(value);
            }
            let Some(value) = self.resolve(feature, scope) else {
                return Ok(Value::Bool(false));
            };
            if self.insert(feature, scope, &value)? {
                return Ok(value);
            }
        }
        Err(FlagsyncError::Store(format!(
            "unable to insert feature value for [{}] and scope [{}]",
            feature, scope
        )))
    }

    fn set(&self, feature: &str, scope: &Scope, value: Value) -> FlagsyncResult<()> {
        let key = self.serializer.serialize(scope);
        debug!(feature, scope = %key, "setting feature value");
        self.store.set(feature, &key, &serde_json::to_string(&value)?)
    }

    fn set_for_all_scopes(&self, feature: &str, value: Value) -> FlagsyncResult<()> {
        debug!(feature, "setting feature value for all scopes");
        self.store
            .set_for_all_scopes(feature, &serde_json::to_string(&value)?)
    }

    fn delete(&self, feature: &str, scope: &Scope) -> FlagsyncResult<()> {
        let key = self.serializer.serialize(scope);
        debug!(feature, scope = %key, "deleting feature value");
        self.store.delete(feature, &key)
    }

    fn purge(&self, features: Option<&[String]>) -> FlagsyncResult<()> {
        debug!(?features, "purging features");
        self.store.purge(features)
    }

    fn defined(&self) -> Vec<String> {
        self.resolver.defined()
    }

    fn serialize_scope(&self, scope: &Scope) -> String {
        self.serializer.serialize(scope)
    }
}
