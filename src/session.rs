use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::{Map, Value};

/// Session key holding the feature name → value mapping.
pub const SESSION_KEY: &str = "features";

/// Per-session key/value storage. One instance belongs to one session.
pub trait SessionCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn put(&self, key: &str, value: Value);

    fn forget(&self, key: &str);
}

/// Session storage kept in process memory.
#[derive(Default)]
pub struct MemorySession {
    data: RwLock<HashMap<String, Value>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionCache for MemorySession {
    fn get(&self, key: &str) -> Option<Value> {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        data.get(key).cloned()
    }

    fn put(&self, key: &str, value: Value) {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        data.insert(key.to_string(), value);
    }

    fn forget(&self, key: &str) {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        data.remove(key);
    }
}

/// Feature values of the current actor, kept under [`SESSION_KEY`].
pub(crate) struct SessionFeatures<'a> {
    session: &'a dyn SessionCache,
}

impl<'a> SessionFeatures<'a> {
    pub(crate) fn new(session: &'a dyn SessionCache) -> Self {
        Self { session }
    }

    /// Anything other than an object under the key counts as empty.
    fn all(&self) -> Map<String, Value> {
        match self.session.get(SESSION_KEY) {
            Some(Value::Object(features)) => features,
            _ => Map::new(),
        }
    }

    pub(crate) fn get(&self, feature: &str) -> Option<Value> {
        self.all().remove(feature)
    }

    pub(crate) fn put(&self, feature: &str, value: Value) {
        let mut features = self.all();
        features.insert(feature.to_string(), value);
        self.session.put(SESSION_KEY, Value::Object(features));
    }

    pub(crate) fn remove(&self, feature: &str) {
        let mut features = self.all();
        features.remove(feature);
        self.session.put(SESSION_KEY, Value::Object(features));
    }

    pub(crate) fn clear(&self) {
        self.session.forget(SESSION_KEY);
    }
}
