//! Feature drivers decide where the value of a feature for a scope lives.
//!
//! [`DatabaseDriver`] keeps every value in a [`ValueStore`](crate::store::ValueStore).
//! [`SessionAndDatabaseDriver`] layers the current session on top of it: the
//! null scope lives in the session only, and values of the authenticated actor
//! are mirrored into the session as they are read and written.

pub mod builder;
pub mod database;
pub mod session_and_database;

use std::collections::HashMap;

use serde_json::Value;

use crate::error::FlagsyncResult;
use crate::scope::Scope;

pub use builder::{DriverBuilder, DriverKind};
pub use database::DatabaseDriver;
pub use session_and_database::SessionAndDatabaseDriver;

/// Values keyed by feature name, then by serialized scope.
pub type FeatureValues = HashMap<String, HashMap<String, Value>>;

pub trait Driver: Send + Sync {
    /// Value of `feature` for `scope`, resolving and storing it on a miss.
    /// Unknown features read as `false` and are never stored.
    fn get(&self, feature: &str, scope: &Scope) -> FlagsyncResult<Value>;

    fn set(&self, feature: &str, scope: &Scope, value: Value) -> FlagsyncResult<()>;

    fn set_for_all_scopes(&self, feature: &str, value: Value) -> FlagsyncResult<()>;

    fn delete(&self, feature: &str, scope: &Scope) -> FlagsyncResult<()>;

    /// Remove the given features, or every feature when `None`.
    fn purge(&self, features: Option<&[String]>) -> FlagsyncResult<()>;

    /// Names of every defined feature.
    fn defined(&self) -> Vec<String>;

    /// The key `scope` is stored under.
    fn serialize_scope(&self, scope: &Scope) -> String;

    /// Resolve many (feature, scope) pairs at once.
    fn get_all(&self, features: &HashMap<String, Vec<Scope>>) -> FlagsyncResult<FeatureValues> {
        let mut results = FeatureValues::new();
        for (feature, scopes) in features {
            for scope in scopes {
                let value = self.get(feature, scope)?;
                results
                    .entry(feature.clone())
                    .or_default()
                    .insert(self.serialize_scope(scope), value);
            }
        }
        Ok(results)
    }
}
