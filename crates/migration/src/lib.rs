//! One-time data migrations run by a preferences store before its first read.
//! A store runs every registered migration whose `should_migrate` is true, in
//! registration order, commits the result, then calls `cleanup` on each.
use async_trait::async_trait;
use models::Preferences;

pub mod errors;
pub mod legacy_xml;
pub mod shared_preferences;

pub use errors::MigrationError;
pub use shared_preferences::SharedPreferencesMigration;

#[async_trait]
pub trait DataMigration: Send + Sync {
    /// Stable name used in logs and metrics.
    fn name(&self) -> &str;

    /// Whether `migrate` has anything to do for the given snapshot.
    async fn should_migrate(&self, current: &Preferences) -> Result<bool, MigrationError>;

    /// Produce the migrated snapshot. Must be idempotent.
    async fn migrate(&self, current: Preferences) -> Result<Preferences, MigrationError>;

    /// Remove the old data source once the migrated snapshot is committed.
    async fn cleanup(&self) -> Result<(), MigrationError>;
}
