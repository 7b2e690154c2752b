//! Sort and visibility preferences of the tasks sample app.

use std::path::Path;

use futures_util::{Stream, StreamExt};
use migration::SharedPreferencesMigration;
use models::{PreferenceKey, Preferences, SortOrder};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::StoreError;
use crate::registry::StoreRegistry;
use crate::store::SettingsStore;

pub const USER_PREFERENCES_NAME: &str = "user_preferences";

pub const SORT_ORDER: PreferenceKey<String> = PreferenceKey::new("sort_order");
pub const SHOW_COMPLETED: PreferenceKey<bool> = PreferenceKey::new("show_completed");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserPreferences {
    pub show_completed: bool,
    pub sort_order: SortOrder,
}

impl From<&Preferences> for UserPreferences {
    fn from(prefs: &Preferences) -> Self {
        Self {
            show_completed: prefs.get_or(&SHOW_COMPLETED, false),
            sort_order: sort_order_of(prefs.get(&SORT_ORDER)),
        }
    }
}

fn sort_order_of(stored: Option<String>) -> SortOrder {
    match stored {
        None => SortOrder::None,
        Some(name) => name.parse().unwrap_or_else(|e| {
            warn!(value = %name, error = %e, "unknown stored sort order; using NONE");
            SortOrder::None
        }),
    }
}

#[derive(Clone, Debug)]
pub struct UserPreferencesRepository {
    store: SettingsStore,
}

impl UserPreferencesRepository {
    pub fn new(store: SettingsStore) -> Self {
        Self { store }
    }

    /// Open the `user_preferences` store, importing `<legacy_dir>/user_preferences.xml` on first load.
    pub fn open(registry: &StoreRegistry, legacy_dir: &Path, delete_legacy: bool) -> Result<Self, StoreError> {
        let store = registry.get_or_create_with(USER_PREFERENCES_NAME, |builder| {
            let migration = SharedPreferencesMigration::for_store(legacy_dir, USER_PREFERENCES_NAME);
            let migration = if delete_legacy { migration } else { migration.keep_legacy_file() };
            builder.migration(migration)
        })?;
        Ok(Self::new(store))
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    pub fn user_preferences_stream(&self) -> impl Stream<Item = Result<UserPreferences, StoreError>> + Send + 'static {
        self.store.observe().map(|prefs| prefs.map(|p| UserPreferences::from(&p)))
    }

    pub async fn fetch_initial_preferences(&self) -> Result<UserPreferences, StoreError> {
        Ok(UserPreferences::from(&self.store.current().await?))
    }

    pub async fn update_show_completed(&self, show_completed: bool) -> Result<(), StoreError> {
        self.store.write(&SHOW_COMPLETED, show_completed).await
    }

    pub async fn enable_sort_by_deadline(&self, enable: bool) -> Result<SortOrder, StoreError> {
        self.update_sort_order(|current| current.with_deadline(enable)).await
    }

    pub async fn enable_sort_by_priority(&self, enable: bool) -> Result<SortOrder, StoreError> {
        self.update_sort_order(|current| current.with_priority(enable)).await
    }

    async fn update_sort_order<F>(&self, change: F) -> Result<SortOrder, StoreError>
    where
        F: FnOnce(SortOrder) -> SortOrder + Send,
    {
        let committed = self
            .store
            .edit(|prefs| {
                let next = change(sort_order_of(prefs.get(&SORT_ORDER)));
                prefs.set(&SORT_ORDER, next.as_str().to_string());
                Ok(())
            })
            .await?;
        Ok(UserPreferences::from(&committed).sort_order)
    }
}
