//! Data model shared by the preferences store and the sample apps.
//! - `preferences`: typed keys, values and immutable snapshots.
//! - `sort_order` / `task`: the task-list domain of the tasks app.

pub mod errors;
pub mod preferences;
pub mod sort_order;
pub mod task;

pub use preferences::{MutablePreferences, PreferenceKey, PreferenceType, PreferenceValue, Preferences};
pub use sort_order::SortOrder;
pub use task::{Task, TaskPriority};
