//! Named store registry
//!
//! One store instance per name: asking twice for `user_preferences` hands
//! out two handles to the same store, so both share one transaction lock and
//! one change feed.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::errors::StoreError;
use crate::storage::FileStorage;
use crate::store::{SettingsStore, StoreBuilder};

const STORE_DIR: &str = "datastore";
const FILE_SUFFIX: &str = ".preferences.json";

static GLOBAL: OnceCell<StoreRegistry> = OnceCell::new();

pub struct StoreRegistry {
    base_dir: PathBuf,
    stores: DashMap<String, SettingsStore>,
}

impl StoreRegistry {
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self { base_dir: base_dir.into(), stores: DashMap::new() }
    }

    /// File backing the store called `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.base_dir.join(STORE_DIR).join(format!("{name}{FILE_SUFFIX}"))
    }

    pub fn get_or_create(&self, name: &str) -> Result<SettingsStore, StoreError> {
        self.get_or_create_with(name, |builder| builder)
    }

    /// Like [`get_or_create`](Self::get_or_create); `configure` only runs when
    /// the store is constructed, so migrations and handlers attach once.
    pub fn get_or_create_with<F>(&self, name: &str, configure: F) -> Result<SettingsStore, StoreError>
    where
        F: FnOnce(StoreBuilder) -> StoreBuilder,
    {
        validate_name(name)?;
        let store = self
            .stores
            .entry(name.to_string())
            .or_insert_with(|| {
                let path = self.path_for(name);
                info!(store = name, path = %path.display(), "opening preferences store");
                let builder = SettingsStore::builder(name, Arc::new(FileStorage::new(path)));
                configure(builder).build()
            })
            .clone();
        Ok(store)
    }

    pub fn get(&self, name: &str) -> Option<SettingsStore> {
        self.stores.get(name).map(|entry| entry.clone())
    }

    /// Forget a store; existing handles keep working on their own.
    pub fn remove(&self, name: &str) -> Option<SettingsStore> {
        let removed = self.stores.remove(name).map(|(_, store)| store);
        if removed.is_some() {
            debug!(store = name, "store removed from registry");
        }
        removed
    }

    pub fn clear(&self) {
        self.stores.clear();
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let bad = name.trim().is_empty()
        || name == "."
        || name.contains("..")
        || name.chars().any(|c| c == '/' || c == '\\' || c.is_control());
    if bad {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Install the process-wide registry. The first call wins; later calls return
/// the already installed registry regardless of `base_dir`.
pub fn init_global<P: Into<PathBuf>>(base_dir: P) -> &'static StoreRegistry {
    GLOBAL.get_or_init(|| StoreRegistry::new(base_dir))
}

pub fn global() -> Option<&'static StoreRegistry> {
    GLOBAL.get()
}
