//! Storage abstractions for the preferences store
//!
//! A store only ever reads or replaces the whole encoded snapshot, so the
//! backend contract is two operations: read everything, atomically write
//! everything.

pub mod file_storage;
pub mod memory;

use async_trait::async_trait;
use models::{PreferenceValue, Preferences};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::StoreError;

pub use file_storage::FileStorage;
pub use memory::MemoryStorage;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

#[async_trait]
pub trait PreferencesStorage: Send + Sync {
    /// Read the encoded snapshot; `Ok(None)` when nothing was ever written.
    async fn read(&self) -> std::io::Result<Option<Vec<u8>>>;
    /// Replace the encoded snapshot. Must be all-or-nothing and durable on return.
    async fn write(&self, data: &[u8]) -> std::io::Result<()>;
    /// Human-readable location for logs.
    fn location(&self) -> String;
}

#[derive(Serialize)]
struct PreferencesFileRef<'a> {
    version: u32,
    entries: &'a Preferences,
}

#[derive(Deserialize)]
struct PreferencesFile {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, PreferenceValue>,
}

/// Encode a snapshot. NaN and infinite floats are rejected since JSON would
/// turn them into `null`, which no longer decodes.
pub fn encode(prefs: &Preferences) -> Result<Vec<u8>, StoreError> {
    if let Some(name) = prefs.first_non_finite() {
        return Err(StoreError::edit(format!("`{name}` holds a non-finite float")));
    }
    serde_json::to_vec_pretty(&PreferencesFileRef { version: FORMAT_VERSION, entries: prefs })
        .map_err(|e| StoreError::Corruption(format!("encode: {e}")))
}

/// Decode a stored snapshot. Empty input is an empty snapshot.
pub fn decode(bytes: &[u8]) -> Result<Preferences, StoreError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Preferences::empty());
    }
    let file: PreferencesFile =
        serde_json::from_slice(bytes).map_err(|e| StoreError::Corruption(e.to_string()))?;
    if file.version != FORMAT_VERSION {
        return Err(StoreError::Corruption(format!(
            "unsupported format version {} (expected {FORMAT_VERSION})",
            file.version
        )));
    }
    Ok(file.entries.into_iter().collect())
}
