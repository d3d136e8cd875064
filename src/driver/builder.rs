use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use super::{DatabaseDriver, Driver, SessionAndDatabaseDriver};
use crate::context::RequestContext;
use crate::error::{FlagsyncError, FlagsyncResult};
use crate::resolver::Resolver;
use crate::scope::ScopeSerializer;
use crate::session::SessionCache;
use crate::store::ValueStore;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// Every value in the store.
    Database,
    /// Null-scope values in the session, the current actor's values mirrored into it.
    SessionAndDatabase,
}

/// Collects a driver's collaborators and checks that nothing is missing.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use flagsync_lib::context::StaticContext;
/// use flagsync_lib::driver::DriverBuilder;
/// use flagsync_lib::resolver::FeatureRegistry;
/// use flagsync_lib::session::MemorySession;
/// use flagsync_lib::store::memory::MemoryStore;
///
/// let driver = DriverBuilder::new()
///     .store(Arc::new(MemoryStore::new()))
///     .resolver(Arc::new(FeatureRegistry::new()))
///     .session(Arc::new(MemorySession::new()))
///     .context(Arc::new(StaticContext::interactive()))
///     .build_session_and_database()
///     .unwrap();
/// # let _ = driver;
/// ```
#[derive(Default)]
pub struct DriverBuilder {
    store: Option<Arc<dyn ValueStore>>,
    resolver: Option<Arc<dyn Resolver>>,
    session: Option<Arc<dyn SessionCache>>,
    context: Option<Arc<dyn RequestContext>>,
    morph_map: HashMap<String, String>,
}

impl DriverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(mut self, store: Arc<dyn ValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn session(mut self, session: Arc<dyn SessionCache>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn context(mut self, context: Arc<dyn RequestContext>) -> Self {
        self.context = Some(context);
        self
    }

    /// Store model scopes of `kind` under `alias`.
    pub fn morph(mut self, kind: &str, alias: &str) -> Self {
        self.morph_map.insert(kind.to_string(), alias.to_string());
        self
    }

    pub fn build_database(self) -> FlagsyncResult<DatabaseDriver> {
        let store = self
            .store
            .ok_or_else(|| missing("a value store"))?;
        let resolver = self
            .resolver
            .ok_or_else(|| missing("a resolver"))?;
        Ok(DatabaseDriver::new(store, resolver)
            .with_serializer(ScopeSerializer::with_morph_map(self.morph_map)))
    }

    pub fn build_session_and_database(mut self) -> FlagsyncResult<SessionAndDatabaseDriver> {
        let session = self
            .session
            .take()
            .ok_or_else(|| missing("a session"))?;
        let context = self
            .context
            .take()
            .ok_or_else(|| missing("a request context"))?;
        let database = self.build_database()?;
        Ok(SessionAndDatabaseDriver::new(database, session, context))
    }

    pub fn build(self, kind: DriverKind) -> FlagsyncResult<Arc<dyn Driver>> {
        Ok(match kind {
            DriverKind::Database => Arc::new(self.build_database()?),
            DriverKind::SessionAndDatabase => Arc::new(self.build_session_and_database()?),
        })
    }
}

fn missing(what: &str) -> FlagsyncError {
    FlagsyncError::Configuration(format!("driver requires {}", what))
}
