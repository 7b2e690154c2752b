//! Layout toggle of the layout sample app.

use futures_util::{Stream, StreamExt};
use models::PreferenceKey;

use crate::errors::StoreError;
use crate::registry::StoreRegistry;
use crate::store::SettingsStore;

pub const LAYOUT_PREFERENCES_NAME: &str = "layout_preferences";

pub const IS_LINEAR_LAYOUT_MANAGER: PreferenceKey<bool> = PreferenceKey::new("is_linear_layout_manager");

/// Linear (list) layout is the default until the user picks a grid.
pub const DEFAULT_IS_LINEAR_LAYOUT: bool = true;

#[derive(Clone, Debug)]
pub struct LayoutSettings {
    store: SettingsStore,
}

impl LayoutSettings {
    pub fn new(store: SettingsStore) -> Self {
        Self { store }
    }

    pub fn open(registry: &StoreRegistry) -> Result<Self, StoreError> {
        Ok(Self::new(registry.get_or_create(LAYOUT_PREFERENCES_NAME)?))
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    pub fn is_linear_layout_stream(&self) -> impl Stream<Item = Result<bool, StoreError>> + Send + 'static {
        self.store
            .observe()
            .map(|prefs| prefs.map(|p| p.get_or(&IS_LINEAR_LAYOUT_MANAGER, DEFAULT_IS_LINEAR_LAYOUT)))
    }

    pub async fn is_linear_layout(&self) -> Result<bool, StoreError> {
        self.store.read(&IS_LINEAR_LAYOUT_MANAGER, DEFAULT_IS_LINEAR_LAYOUT).await
    }

    pub async fn save_layout(&self, is_linear_layout: bool) -> Result<(), StoreError> {
        self.store.write(&IS_LINEAR_LAYOUT_MANAGER, is_linear_layout).await
    }

    /// Flip the layout in one transaction and return the new value.
    pub async fn toggle(&self) -> Result<bool, StoreError> {
        let committed = self
            .store
            .edit(|prefs| {
                let current = prefs.get(&IS_LINEAR_LAYOUT_MANAGER).unwrap_or(DEFAULT_IS_LINEAR_LAYOUT);
                prefs.set(&IS_LINEAR_LAYOUT_MANAGER, !current);
                Ok(())
            })
            .await?;
        Ok(committed.get_or(&IS_LINEAR_LAYOUT_MANAGER, DEFAULT_IS_LINEAR_LAYOUT))
    }
}
