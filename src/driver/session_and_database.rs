use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::{DatabaseDriver, Driver};
use crate::context::{resolve_scope, RequestContext};
use crate::error::FlagsyncResult;
use crate::scope::{Identity, Scope};
use crate::session::{SessionCache, SessionFeatures};

/// Where a scope's value lives for the duration of one call.
enum Target {
    /// The null scope: session only.
    Session,
    /// The authenticated actor of an interactive request: store first,
    /// mirrored into the session.
    Actor(Scope),
    /// Any other scope: store only.
    Stored(Scope),
}

/// Driver that syncs the current actor's feature values into the session.
///
/// The null scope is never stored; its values live in the session. Values of
/// the actor authenticated for an interactive request are kept in the store
/// and copied into the session whenever they are resolved or written, so a
/// visitor who logs in keeps the values they saw anonymously.
pub struct SessionAndDatabaseDriver {
    database: DatabaseDriver,
    session: Arc<dyn SessionCache>,
    context: Arc<dyn RequestContext>,
}

impl SessionAndDatabaseDriver {
    pub fn new(
        database: DatabaseDriver,
        session: Arc<dyn SessionCache>,
        context: Arc<dyn RequestContext>,
    ) -> Self {
        Self {
            database,
            session,
            context,
        }
    }

    pub fn database(&self) -> &DatabaseDriver {
        &self.database
    }

    fn features(&self) -> SessionFeatures<'_> {
        SessionFeatures::new(self.session.as_ref())
    }

    fn is_current_actor(&self, identity: &Identity) -> bool {
        self.context.is_interactive() && self.context.current_actor().as_ref() == Some(identity)
    }

    fn target(&self, scope: &Scope) -> Target {
        match resolve_scope(scope, self.context.as_ref()) {
            Scope::Null => Target::Session,
            Scope::Identity(identity) if self.is_current_actor(&identity) => {
                Target::Actor(Scope::Identity(identity))
            }
            other => Target::Stored(other),
        }
    }

    /// A stored `null` counts as a miss, like an absent key.
    fn session_value(&self, feature: &str) -> Option<Value> {
        self.features().get(feature).filter(|value| !value.is_null())
    }

    fn get_for_session(&self, feature: &str) -> FlagsyncResult<Value> {
        if let Some(value) = self.session_value(feature) {
            return Ok(value);
        }
        let Some(value) = self.database.resolve(feature, &Scope::Null) else {
            return Ok(Value::Bool(false));
        };
        self.features().put(feature, value.clone());
        Ok(value)
    }

    fn get_for_actor(&self, feature: &str, scope: &Scope) -> FlagsyncResult<Value> {
        if let Some(value) = self.database.retrieve(feature, scope)? {
            return Ok(value);
        }

        let value = match self.session_value(feature) {
            Some(value) => {
                debug!(feature, scope = %scope, "carrying session value over to the store");
                value
            }
            None => match self.database.resolve(feature, scope) {
                Some(value) => value,
                None => return Ok(Value::Bool(false)),
            },
        };

        let value = if self.database.insert(feature, scope, &value)? {
            value
        } else {
            self.database.retrieve(feature, scope)?.unwrap_or(value)
        };

        self.features().put(feature, value.clone());
        Ok(value)
    }
}

impl Driver for SessionAndDatabaseDriver {
    fn get(&self, feature: &str, scope: &Scope) -> FlagsyncResult<Value> {
        match self.target(scope) {
            Target::Session => self.get_for_session(feature),
            Target::Actor(scope) => self.get_for_actor(feature, &scope),
            Target::Stored(scope) => self.database.get(feature, &scope),
        }
    }

    fn set(&self, feature: &str, scope: &Scope, value: Value) -> FlagsyncResult<()> {
        match self.target(scope) {
            Target::Session => {
                self.features().put(feature, value);
                Ok(())
            }
            Target::Actor(scope) => {
                self.database.set(feature, &scope, value.clone())?;
                self.features().put(feature, value);
                Ok(())
            }
            Target::Stored(scope) => self.database.set(feature, &scope, value),
        }
    }

    fn set_for_all_scopes(&self, feature: &str, value: Value) -> FlagsyncResult<()> {
        // The session belongs to the current actor, who is part of "all scopes".
        self.features().put(feature, value.clone());
        self.database.set_for_all_scopes(feature, value)
    }

    fn delete(&self, feature: &str, scope: &Scope) -> FlagsyncResult<()> {
        let scope = match self.target(scope) {
            Target::Session => {
                self.features().remove(feature);
                Scope::Null
            }
            Target::Actor(scope) => {
                self.features().remove(feature);
                scope
            }
            Target::Stored(scope) => scope,
        };
        self.database.delete(feature, &scope)
    }

    fn purge(&self, features: Option<&[String]>) -> FlagsyncResult<()> {
        match features {
            None => self.features().clear(),
            Some(names) => {
                for name in names {
                    self.features().remove(name);
                }
            }
        }
        self.database.purge(features)
    }

    fn defined(&self) -> Vec<String> {
        self.database.defined()
    }

    fn serialize_scope(&self, scope: &Scope) -> String {
        self.database
            .serialize_scope(&resolve_scope(scope, self.context.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticContext;
    use crate::resolver::FeatureRegistry;
    use crate::session::{MemorySession, SESSION_KEY};
    use crate::store::memory::MemoryStore;
    use crate::store::ValueStore;
    use serde_json::json;

    struct Fixture {
        driver: SessionAndDatabaseDriver,
        store: Arc<MemoryStore>,
        session: Arc<MemorySession>,
        registry: Arc<FeatureRegistry>,
    }

    fn fixture(context: StaticContext) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let session = Arc::new(MemorySession::new());
        let registry = Arc::new(FeatureRegistry::new());
        let database = DatabaseDriver::new(store.clone(), registry.clone());
        let driver = SessionAndDatabaseDriver::new(database, session.clone(), Arc::new(context));
        Fixture {
            driver,
            store,
            session,
            registry,
        }
    }

    fn user(id: i64) -> Identity {
        Identity::model("User", id)
    }

    #[test]
    fn test_current_actor_scope_follows_authentication() {
        let anonymous = fixture(StaticContext::interactive());
        anonymous
            .driver
            .set("foo", &Scope::CurrentActor, json!(true))
            .unwrap();
        assert_eq!(anonymous.store.count().unwrap(), 0);
        assert_eq!(anonymous.session.get(SESSION_KEY), Some(json!({"foo": true})));

        let logged_in = fixture(StaticContext::interactive().acting_as(user(1)));
        logged_in
            .driver
            .set("foo", &Scope::CurrentActor, json!(true))
            .unwrap();
        assert!(logged_in.store.retrieve("foo", "User|1").unwrap().is_some());
        assert_eq!(logged_in.session.get(SESSION_KEY), Some(json!({"foo": true})));
    }

    #[test]
    fn test_batch_context_never_touches_the_session_for_actors() {
        let f = fixture(StaticContext::batch().acting_as(user(1)));
        f.registry.define("foo", true);

        f.driver.set("bar", &Scope::from(user(1)), json!(true)).unwrap();
        assert_eq!(f.driver.get("foo", &Scope::from(user(1))).unwrap(), json!(true));

        assert!(f.session.get(SESSION_KEY).is_none());
        assert_eq!(f.store.count().unwrap(), 2);
    }

    #[test]
    fn test_batch_context_keeps_session_entries_on_actor_delete() {
        let f = fixture(StaticContext::batch().acting_as(user(1)));
        f.session.put(SESSION_KEY, json!({"foo": true}));
        f.store.set("foo", "User|1", "true").unwrap();

        f.driver.delete("foo", &Scope::from(user(1))).unwrap();

        assert_eq!(f.session.get(SESSION_KEY), Some(json!({"foo": true})));
        assert!(f.store.retrieve("foo", "User|1").unwrap().is_none());
    }

    #[test]
    fn test_session_null_counts_as_missing() {
        let f = fixture(StaticContext::interactive());
        f.registry.define("foo", "resolved");
        f.session.put(SESSION_KEY, json!({"foo": null}));

        assert_eq!(f.driver.get("foo", &Scope::Null).unwrap(), json!("resolved"));
        assert_eq!(f.session.get(SESSION_KEY), Some(json!({"foo": "resolved"})));
    }

    #[test]
    fn test_serialize_scope_resolves_current_actor() {
        let f = fixture(StaticContext::interactive().acting_as(user(3)));
        assert_eq!(f.driver.serialize_scope(&Scope::CurrentActor), "User|3");
        assert_eq!(f.driver.serialize_scope(&Scope::Null), "__null__");
    }
}
