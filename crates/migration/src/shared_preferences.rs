use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use models::{PreferenceValue, Preferences};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::errors::MigrationError;
use crate::legacy_xml::{self, LegacyEntries};
use crate::DataMigration;

/// Prefix of the marker key recording that a legacy file was imported.
pub const MIGRATION_MARKER_PREFIX: &str = "__migrated__/shared_preferences/";

/// Imports a legacy `SharedPreferences` XML file into a store exactly once.
///
/// Entries already present in the store win over legacy entries. After the
/// import a marker key is written into the snapshot, so later opens skip the
/// migration even when the legacy file is kept around.
#[derive(Debug, Clone)]
pub struct SharedPreferencesMigration {
    legacy_path: PathBuf,
    keys_to_migrate: Option<BTreeSet<String>>,
    delete_legacy: bool,
    marker: String,
}

impl SharedPreferencesMigration {
    pub fn new(legacy_path: impl Into<PathBuf>) -> Self {
        let legacy_path = legacy_path.into();
        let stem = legacy_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            legacy_path,
            keys_to_migrate: None,
            delete_legacy: true,
            marker: format!("{MIGRATION_MARKER_PREFIX}{stem}"),
        }
    }

    /// Legacy file named after the store, i.e. `<legacy_dir>/<store_name>.xml`.
    pub fn for_store(legacy_dir: impl AsRef<Path>, store_name: &str) -> Self {
        Self::new(legacy_dir.as_ref().join(format!("{store_name}.xml")))
    }

    /// Only import the named keys; cleanup then removes just those keys.
    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys_to_migrate = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn keep_legacy_file(mut self) -> Self {
        self.delete_legacy = false;
        self
    }

    pub fn legacy_path(&self) -> &Path {
        &self.legacy_path
    }

    pub fn marker_key(&self) -> &str {
        &self.marker
    }

    fn wanted(&self, name: &str) -> bool {
        self.keys_to_migrate.as_ref().map_or(true, |keys| keys.contains(name))
    }

    async fn read_legacy(&self) -> Result<Option<LegacyEntries>, MigrationError> {
        match fs::read_to_string(&self.legacy_path).await {
            Ok(xml) => Ok(Some(legacy_xml::parse(&xml)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DataMigration for SharedPreferencesMigration {
    fn name(&self) -> &str {
        "shared_preferences"
    }

    async fn should_migrate(&self, current: &Preferences) -> Result<bool, MigrationError> {
        if current.contains_name(&self.marker) {
            return Ok(false);
        }
        Ok(fs::try_exists(&self.legacy_path).await?)
    }

    async fn migrate(&self, current: Preferences) -> Result<Preferences, MigrationError> {
        let legacy = self.read_legacy().await?.unwrap_or_default();
        let mut prefs = current.to_mutable();
        let mut imported = 0usize;
        for (name, value) in legacy {
            if !self.wanted(&name) || prefs.contains_name(&name) {
                continue;
            }
            if !value.is_finite() {
                warn!(legacy_path = %self.legacy_path.display(), key = %name, "skipping non-finite legacy float");
                continue;
            }
            prefs.insert_raw(name, value);
            imported += 1;
        }
        prefs.insert_raw(self.marker.clone(), PreferenceValue::Bool(true));
        info!(
            legacy_path = %self.legacy_path.display(),
            imported,
            "imported legacy preferences"
        );
        Ok(prefs.freeze())
    }

    async fn cleanup(&self) -> Result<(), MigrationError> {
        if !self.delete_legacy {
            return Ok(());
        }
        let remaining = match &self.keys_to_migrate {
            None => LegacyEntries::new(),
            Some(keys) => match self.read_legacy().await? {
                Some(mut entries) => {
                    entries.retain(|name, _| !keys.contains(name));
                    entries
                }
                None => return Ok(()),
            },
        };

        if remaining.is_empty() {
            match fs::remove_file(&self.legacy_path).await {
                Ok(()) => debug!(legacy_path = %self.legacy_path.display(), "removed legacy preferences file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        } else {
            fs::write(&self.legacy_path, legacy_xml::render(&remaining)).await?;
        }
        Ok(())
    }
}
