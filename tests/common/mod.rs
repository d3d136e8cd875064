//! Shared fixtures for driver tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use flagsync_lib::session::SESSION_KEY;
use flagsync_lib::{
    Definition, DriverBuilder, FeatureManager, FeatureRegistry, Identity, MemorySession,
    MemoryStore, SessionAndDatabaseDriver, SessionCache, StaticContext, StoredRecord, ValueStore,
};
use serde_json::Value;

/// One session and one store, shared by every request made through it.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub session: Arc<MemorySession>,
    pub registry: Arc<FeatureRegistry>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            session: Arc::new(MemorySession::new()),
            registry: Arc::new(FeatureRegistry::new()),
        }
    }

    pub fn driver(&self, context: StaticContext) -> SessionAndDatabaseDriver {
        DriverBuilder::new()
            .store(self.store.clone())
            .resolver(self.registry.clone())
            .session(self.session.clone())
            .context(Arc::new(context))
            .build_session_and_database()
            .unwrap()
    }

    /// Features as seen by an anonymous visitor.
    pub fn guest(&self) -> FeatureManager {
        self.features(StaticContext::interactive())
    }

    /// Features as seen by `actor` after logging in.
    pub fn login(&self, actor: &Identity) -> FeatureManager {
        self.features(StaticContext::interactive().acting_as(actor.clone()))
    }

    pub fn features(&self, context: StaticContext) -> FeatureManager {
        let context = Arc::new(context);
        let driver = DriverBuilder::new()
            .store(self.store.clone())
            .resolver(self.registry.clone())
            .session(self.session.clone())
            .context(context.clone())
            .build_session_and_database()
            .unwrap();
        FeatureManager::new(Arc::new(driver), context)
    }

    /// The feature mapping kept in the session, if any.
    pub fn session_features(&self) -> Option<Value> {
        self.session.get(SESSION_KEY)
    }

    pub fn rows(&self) -> usize {
        self.store.count().unwrap()
    }

    pub fn first_row(&self) -> StoredRecord {
        self.store.records().unwrap().into_iter().next().unwrap()
    }

    /// Define `feature` with a resolver that counts its invocations.
    pub fn define_counted(&self, feature: &str, value: Value) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        self.registry.define(
            feature,
            Definition::dynamic(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                value.clone()
            }),
        );
        calls
    }
}

pub fn user(id: i64) -> Identity {
    Identity::model("User", id)
}

pub fn calls(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}
