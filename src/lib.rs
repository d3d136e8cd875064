//! Scope-keyed feature flags whose values follow the visitor through their
//! session.
//!
//! A feature's value for a scope is looked up in three tiers: the session of
//! the current actor, the persistent [`ValueStore`], and finally the
//! [`Resolver`] that knows the feature's definition. Resolved values are
//! written back to whichever tier owns the scope.
//!
//! # Examples
//! ```
//! use std::sync::Arc;
//! use flagsync_lib::{
//!     DriverBuilder, FeatureManager, FeatureRegistry, Identity, MemorySession, MemoryStore,
//!     StaticContext,
//! };
//!
//! let registry = Arc::new(FeatureRegistry::new());
//! registry.define("new-api", true);
//!
//! let context = Arc::new(StaticContext::interactive().acting_as(Identity::model("User", 1)));
//! let driver = DriverBuilder::new()
//!     .store(Arc::new(MemoryStore::new()))
//!     .resolver(registry)
//!     .session(Arc::new(MemorySession::new()))
//!     .context(context.clone())
//!     .build_session_and_database()
//!     .unwrap();
//!
//! let features = FeatureManager::new(Arc::new(driver), context);
//! assert!(features.active("new-api").unwrap());
//! assert!(!features.for_scope("tim@example.com").active("unknown").unwrap());
//! ```

pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod feature;
pub mod resolver;
pub mod scope;
pub mod session;
pub mod store;

pub use config::FlagsyncConfig;
pub use context::{ExecutionMode, RequestContext, StaticContext};
pub use driver::{DatabaseDriver, Driver, DriverBuilder, DriverKind, SessionAndDatabaseDriver};
pub use error::{FlagsyncError, FlagsyncResult};
pub use feature::{FeatureManager, Features, PendingInteraction};
pub use resolver::{Definition, FeatureRegistry, Resolver};
pub use scope::{FeatureScopeable, Identity, Scope, ScopeSerializer};
pub use session::{MemorySession, SessionCache};
pub use store::memory::MemoryStore;
#[cfg(feature = "sled")]
pub use store::sled_store::SledStore;
pub use store::{StoredRecord, ValueStore};
