//! Preferences store and the data layer of the two sample apps.
//! - `store`: observable, atomically committed key-value snapshots.
//! - `registry`: one store per name, process-wide.
//! - `layout` / `user_preferences` / `tasks`: what the sample apps build on top.

pub mod errors;
pub mod layout;
pub mod observability;
pub mod registry;
pub mod runtime;
pub mod storage;
pub mod store;
pub mod tasks;
pub mod user_preferences;

pub use errors::StoreError;
pub use registry::StoreRegistry;
pub use store::{SettingsStore, StoreBuilder};
