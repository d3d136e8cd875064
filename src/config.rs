use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::driver::{Driver, DriverBuilder, DriverKind};
use crate::error::{FlagsyncError, FlagsyncResult};
use crate::resolver::FeatureRegistry;
use crate::session::SessionCache;
use crate::store::memory::MemoryStore;
use crate::store::ValueStore;

/// Top-level flagsync.toml configuration
#[derive(Debug, Deserialize)]
pub struct FlagsyncConfig {
    /// Store used when none is named.
    #[serde(default = "default_store_name")]
    pub default: String,
    #[serde(default = "default_stores")]
    pub stores: HashMap<String, StoreConfig>,
    /// Fixed feature definitions, name → value, in file order.
    #[serde(default)]
    pub features: toml::Table,
    /// Aliases for model kinds in stored scope keys.
    #[serde(default)]
    pub morph_map: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_driver")]
    pub driver: DriverKind,
    #[serde(default = "default_storage")]
    pub storage: StorageBackend,
    #[serde(default = "default_table")]
    pub table: String,
    /// Required for sled storage.
    pub data_dir: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sled,
    Memory,
}

// ── Default value functions ──────────────────────────

fn default_store_name() -> String {
    "main".to_string()
}

fn default_stores() -> HashMap<String, StoreConfig> {
    HashMap::from([(default_store_name(), StoreConfig::default())])
}

fn default_driver() -> DriverKind {
    DriverKind::SessionAndDatabase
}

fn default_storage() -> StorageBackend {
    StorageBackend::Sled
}

fn default_table() -> String {
    "features".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            storage: default_storage(),
            table: default_table(),
            data_dir: Some(default_data_dir()),
        }
    }
}

impl Default for FlagsyncConfig {
    fn default() -> Self {
        Self {
            default: default_store_name(),
            stores: default_stores(),
            features: toml::Table::new(),
            morph_map: HashMap::new(),
        }
    }
}

impl FlagsyncConfig {
    /// Load configuration from a TOML file, falling back to defaults if the
    /// file doesn't exist. A file that exists but does not parse is an error.
    pub fn load(path: &str) -> FlagsyncResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path, "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_toml(content: &str) -> FlagsyncResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        // FLAGSYNC_STORE
        if let Ok(val) = env::var("FLAGSYNC_STORE") {
            self.default = val;
        }

        let store = self.stores.entry(self.default.clone()).or_default();

        // FLAGSYNC_STORAGE
        if let Ok(val) = env::var("FLAGSYNC_STORAGE") {
            match val.to_lowercase().as_str() {
                "sled" => store.storage = StorageBackend::Sled,
                "memory" => store.storage = StorageBackend::Memory,
                other => warn!("unknown FLAGSYNC_STORAGE value: {}", other),
            }
        }

        // FLAGSYNC_DATA_DIR
        if let Ok(val) = env::var("FLAGSYNC_DATA_DIR") {
            store.data_dir = Some(val);
        }

        // FLAGSYNC_TABLE
        if let Ok(val) = env::var("FLAGSYNC_TABLE") {
            store.table = val;
        }
    }

    /// The named store, or the default store when `name` is `None`.
    pub fn store(&self, name: Option<&str>) -> FlagsyncResult<&StoreConfig> {
        let name = name.unwrap_or(&self.default);
        self.stores.get(name).ok_or_else(|| {
            FlagsyncError::Configuration(format!("store [{}] is not defined", name))
        })
    }

    /// A registry holding the `[features]` table.
    pub fn registry(&self) -> FlagsyncResult<FeatureRegistry> {
        let registry = FeatureRegistry::new();
        for (name, value) in &self.features {
            registry.define(name, serde_json::to_value(value)?);
        }
        Ok(registry)
    }

    /// Build the driver of the named store. Session drivers need `session`.
    pub fn build_driver(
        &self,
        name: Option<&str>,
        session: Option<Arc<dyn SessionCache>>,
        context: Arc<dyn RequestContext>,
    ) -> FlagsyncResult<Arc<dyn Driver>> {
        let store = self.store(name)?;
        self.build_driver_with_store(store.driver, store.open_store()?, session, context)
    }

    /// Build a driver of `kind` over an already opened store.
    pub fn build_driver_with_store(
        &self,
        kind: DriverKind,
        store: Arc<dyn ValueStore>,
        session: Option<Arc<dyn SessionCache>>,
        context: Arc<dyn RequestContext>,
    ) -> FlagsyncResult<Arc<dyn Driver>> {
        let mut builder = DriverBuilder::new()
            .store(store)
            .resolver(Arc::new(self.registry()?))
            .context(context);
        if let Some(session) = session {
            builder = builder.session(session);
        }
        for (model, alias) in &self.morph_map {
            builder = builder.morph(model, alias);
        }
        builder.build(kind)
    }
}

impl StoreConfig {
    pub fn open_store(&self) -> FlagsyncResult<Arc<dyn ValueStore>> {
        match self.storage {
            StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
            StorageBackend::Sled => self.open_sled(),
        }
    }

    #[cfg(feature = "sled")]
    fn open_sled(&self) -> FlagsyncResult<Arc<dyn ValueStore>> {
        let data_dir = self.data_dir.as_deref().ok_or_else(|| {
            FlagsyncError::Configuration("sled storage requires data_dir".to_string())
        })?;
        Ok(Arc::new(crate::store::sled_store::SledStore::open(
            data_dir,
            &self.table,
        )?))
    }

    #[cfg(not(feature = "sled"))]
    fn open_sled(&self) -> FlagsyncResult<Arc<dyn ValueStore>> {
        Err(FlagsyncError::Configuration(
            "sled storage requires the 'sled' feature".to_string(),
        ))
    }
}
