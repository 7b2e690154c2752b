//! Observable, file-backed preferences store.
//!
//! - One store owns one persisted snapshot; every mutation is a transaction
//!   that reads the latest committed snapshot, applies a delta and commits the
//!   whole snapshot atomically.
//! - Committed snapshots are broadcast over a `watch` channel. Subscribers see
//!   the latest snapshot (emissions are conflated), never a half-applied one.
//! - The first access loads the file and runs registered migrations under the
//!   transaction lock, so no write can interleave with a migration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, Stream};
use migration::DataMigration;
use models::{MutablePreferences, PreferenceKey, PreferenceType, Preferences};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::errors::StoreError;
use crate::observability;
use crate::storage::{self, PreferencesStorage};

/// Produces a replacement snapshot when the stored one cannot be decoded.
pub type CorruptionHandler = Arc<dyn Fn(&StoreError) -> Preferences + Send + Sync>;

struct StoreInner {
    name: String,
    storage: Arc<dyn PreferencesStorage>,
    migrations: Vec<Arc<dyn DataMigration>>,
    corruption_handler: Option<CorruptionHandler>,
    transaction: Mutex<()>,
    // None until the first successful load
    committed: watch::Sender<Option<Preferences>>,
}

/// Cheap-to-clone handle to a named preferences store.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<StoreInner>,
}

pub struct StoreBuilder {
    name: String,
    storage: Arc<dyn PreferencesStorage>,
    migrations: Vec<Arc<dyn DataMigration>>,
    corruption_handler: Option<CorruptionHandler>,
}

impl StoreBuilder {
    /// Register a migration; migrations run in registration order on first load.
    pub fn migration<M: DataMigration + 'static>(mut self, migration: M) -> Self {
        self.migrations.push(Arc::new(migration));
        self
    }

    pub fn corruption_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&StoreError) -> Preferences + Send + Sync + 'static,
    {
        self.corruption_handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> SettingsStore {
        let (committed, _) = watch::channel(None);
        SettingsStore {
            inner: Arc::new(StoreInner {
                name: self.name,
                storage: self.storage,
                migrations: self.migrations,
                corruption_handler: self.corruption_handler,
                transaction: Mutex::new(()),
                committed,
            }),
        }
    }
}

enum Observe {
    Start(SettingsStore),
    Watching(watch::Receiver<Option<Preferences>>),
    Done,
}

impl SettingsStore {
    pub fn builder(name: impl Into<String>, storage: Arc<dyn PreferencesStorage>) -> StoreBuilder {
        StoreBuilder {
            name: name.into(),
            storage,
            migrations: Vec::new(),
            corruption_handler: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn location(&self) -> String {
        self.inner.storage.location()
    }

    /// Stream of committed snapshots.
    ///
    /// The first item is the current snapshot; after that one item per commit.
    /// A recoverable read failure yields an empty snapshot and the stream keeps
    /// going. Any other failure is yielded once as `Err` and ends the stream.
    pub fn observe(&self) -> impl Stream<Item = Result<Preferences, StoreError>> + Send + 'static {
        stream::unfold(Observe::Start(self.clone()), |state| async move {
            match state {
                Observe::Start(store) => {
                    let mut rx = store.inner.committed.subscribe();
                    match store.load_or_recover().await {
                        Ok(loaded) => {
                            // a commit may have landed after the load; prefer the newest
                            let latest = rx.borrow_and_update().clone().unwrap_or(loaded);
                            Some((Ok(latest), Observe::Watching(rx)))
                        }
                        Err(e) => Some((Err(e), Observe::Done)),
                    }
                }
                Observe::Watching(mut rx) => loop {
                    if rx.changed().await.is_err() {
                        return None;
                    }
                    let next = rx.borrow_and_update().clone();
                    if let Some(prefs) = next {
                        return Some((Ok(prefs), Observe::Watching(rx)));
                    }
                },
                Observe::Done => None,
            }
        })
    }

    /// The snapshot a new subscriber would receive first.
    pub async fn current(&self) -> Result<Preferences, StoreError> {
        self.load_or_recover().await
    }

    /// Value of `key` in the current snapshot, or `default` when absent.
    pub async fn read<T: PreferenceType>(&self, key: &PreferenceKey<T>, default: T) -> Result<T, StoreError> {
        Ok(self.current().await?.get_or(key, default))
    }

    /// Like [`read`](Self::read) but reports a value stored with another type.
    pub async fn try_read<T: PreferenceType>(&self, key: &PreferenceKey<T>) -> Result<Option<T>, StoreError> {
        Ok(self.current().await?.try_get(key)?)
    }

    /// Set `key` to `value`; returns once the snapshot is durably committed.
    pub async fn write<T>(&self, key: &PreferenceKey<T>, value: T) -> Result<(), StoreError>
    where
        T: PreferenceType + Send,
    {
        self.edit(|prefs| {
            prefs.set(key, value);
            Ok(())
        })
        .await
        .map(|_| ())
    }

    pub async fn remove<T>(&self, key: &PreferenceKey<T>) -> Result<(), StoreError> {
        self.edit(|prefs| {
            prefs.remove(key);
            Ok(())
        })
        .await
        .map(|_| ())
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.edit(|prefs| {
            prefs.clear();
            Ok(())
        })
        .await
        .map(|_| ())
    }

    /// Run a read-modify-write transaction and return the committed snapshot.
    ///
    /// Transactions are serialized per store and always start from the latest
    /// committed snapshot. A transform that changes nothing commits nothing.
    /// On failure the committed snapshot is left untouched.
    pub async fn edit<F>(&self, transform: F) -> Result<Preferences, StoreError>
    where
        F: FnOnce(&mut MutablePreferences) -> Result<(), StoreError> + Send,
    {
        let inner = &self.inner;
        let _tx = inner.transaction.lock().await;
        let current = self.load_locked().await?;

        let mut working = current.to_mutable();
        transform(&mut working)?;
        let next = working.freeze();
        if let Some(name) = next.first_non_finite() {
            warn!(store = %inner.name, key = name, "edit rejected: non-finite float");
            return Err(StoreError::edit(format!("`{name}` holds a non-finite float")));
        }
        if next == current {
            debug!(store = %inner.name, "edit changed nothing; skipping commit");
            return Ok(current);
        }

        if let Err(e) = self.commit(&next).await {
            observability::WRITE_FAILURES_TOTAL.with_label_values(&[inner.name.as_str()]).inc();
            error!(store = %inner.name, location = %inner.storage.location(), error = %e, "committing preferences failed");
            return Err(e);
        }
        inner.committed.send_replace(Some(next.clone()));
        observability::WRITES_TOTAL.with_label_values(&[inner.name.as_str()]).inc();
        debug!(store = %inner.name, entries = next.len(), "preferences committed");
        Ok(next)
    }

    /// Re-read storage and publish the stored snapshot if it differs from the
    /// committed one. This is how commits made by another process reach
    /// subscribers. Returns whether anything was published.
    pub async fn refresh(&self) -> Result<bool, StoreError> {
        let inner = &self.inner;
        let _tx = inner.transaction.lock().await;
        let cached = inner.committed.borrow().clone();
        let Some(cached) = cached else {
            self.load_locked().await?;
            return Ok(true);
        };
        let stored = match inner.storage.read().await? {
            Some(bytes) => storage::decode(&bytes)?,
            None => Preferences::empty(),
        };
        if stored == cached {
            return Ok(false);
        }
        debug!(store = %inner.name, entries = stored.len(), "picked up external change");
        inner.committed.send_replace(Some(stored));
        Ok(true)
    }

    /// Call [`refresh`](Self::refresh) every `period` in a background task.
    /// The task stops when aborted or once every handle to the store is gone.
    pub fn spawn_refresh(&self, period: Duration) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else { break };
                let store = SettingsStore { inner };
                if let Err(e) = store.refresh().await {
                    warn!(store = %store.name(), error = %e, "refreshing preferences failed");
                }
            }
        })
    }

    async fn commit(&self, prefs: &Preferences) -> Result<(), StoreError> {
        let data = storage::encode(prefs)?;
        self.inner.storage.write(&data).await?;
        Ok(())
    }

    async fn load_or_recover(&self) -> Result<Preferences, StoreError> {
        match self.load().await {
            Ok(prefs) => Ok(prefs),
            Err(e) if e.is_recoverable_read() => {
                warn!(store = %self.inner.name, error = %e, "reading preferences failed; falling back to empty snapshot");
                observability::READ_FALLBACKS_TOTAL.with_label_values(&[self.inner.name.as_str()]).inc();
                Ok(Preferences::empty())
            }
            Err(e) => {
                error!(store = %self.inner.name, error = %e, "reading preferences failed");
                Err(e)
            }
        }
    }

    async fn load(&self) -> Result<Preferences, StoreError> {
        let cached = self.inner.committed.borrow().clone();
        if let Some(prefs) = cached {
            return Ok(prefs);
        }
        let _tx = self.inner.transaction.lock().await;
        self.load_locked().await
    }

    /// Caller must hold the transaction lock.
    async fn load_locked(&self) -> Result<Preferences, StoreError> {
        let cached = self.inner.committed.borrow().clone();
        if let Some(prefs) = cached {
            return Ok(prefs);
        }

        let inner = &self.inner;
        let stored = match inner.storage.read().await? {
            Some(bytes) => match storage::decode(&bytes) {
                Ok(prefs) => prefs,
                Err(e) => self.replace_corrupted(e).await?,
            },
            None => Preferences::empty(),
        };

        let mut prefs = stored.clone();
        let mut applied = Vec::new();
        for migration in &inner.migrations {
            let failed = |source| StoreError::Migration { name: migration.name().to_string(), source };
            if !migration.should_migrate(&prefs).await.map_err(failed)? {
                continue;
            }
            prefs = migration.migrate(prefs).await.map_err(failed)?;
            applied.push(Arc::clone(migration));
        }
        if prefs != stored {
            self.commit(&prefs).await?;
        }
        for migration in applied {
            observability::MIGRATIONS_TOTAL
                .with_label_values(&[inner.name.as_str(), migration.name()])
                .inc();
            info!(store = %inner.name, migration = migration.name(), "migration applied");
            if let Err(e) = migration.cleanup().await {
                warn!(store = %inner.name, migration = migration.name(), error = %e, "migration cleanup failed");
            }
        }

        inner.committed.send_replace(Some(prefs.clone()));
        debug!(store = %inner.name, location = %inner.storage.location(), entries = prefs.len(), "preferences loaded");
        Ok(prefs)
    }

    async fn replace_corrupted(&self, err: StoreError) -> Result<Preferences, StoreError> {
        let Some(handler) = self.inner.corruption_handler.as_ref() else {
            return Err(err);
        };
        let replacement = handler(&err);
        warn!(store = %self.inner.name, error = %err, "stored preferences corrupted; replacing");
        self.commit(&replacement).await?;
        Ok(replacement)
    }
}

impl fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsStore")
            .field("name", &self.inner.name)
            .field("location", &self.inner.storage.location())
            .field("migrations", &self.inner.migrations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use futures_util::StreamExt;
    use migration::MigrationError;
    use std::io::ErrorKind;

    const FLAG: PreferenceKey<bool> = PreferenceKey::new("flag");
    const COUNT: PreferenceKey<i32> = PreferenceKey::new("count");

    fn memory_store() -> (SettingsStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let store = SettingsStore::builder("test", storage.clone()).build();
        (store, storage)
    }

    #[tokio::test]
    async fn unchanged_edit_does_not_write() -> Result<(), anyhow::Error> {
        let (store, storage) = memory_store();
        store.write(&FLAG, true).await?;
        store.write(&FLAG, true).await?;
        assert_eq!(storage.write_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn failed_write_keeps_committed_snapshot() -> Result<(), anyhow::Error> {
        let (store, storage) = memory_store();
        store.write(&COUNT, 1).await?;

        storage.fail_next_write(ErrorKind::PermissionDenied);
        let err = store.write(&COUNT, 2).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(store.read(&COUNT, 0).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn rejected_edit_commits_nothing() -> Result<(), anyhow::Error> {
        let (store, storage) = memory_store();
        let res = store
            .edit(|prefs| {
                prefs.set(&FLAG, false);
                Err(StoreError::edit("nope"))
            })
            .await;
        assert!(matches!(res, Err(StoreError::Edit(_))));
        assert_eq!(storage.write_count(), 0);
        assert!(!store.current().await?.contains(&FLAG));
        Ok(())
    }

    #[tokio::test]
    async fn corruption_is_fatal_to_the_stream() {
        let storage = Arc::new(MemoryStorage::with_bytes("{broken"));
        let store = SettingsStore::builder("corrupt", storage).build();
        let mut stream = Box::pin(store.observe());
        assert!(matches!(stream.next().await, Some(Err(StoreError::Corruption(_)))));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn corruption_handler_replaces_snapshot() -> Result<(), anyhow::Error> {
        let storage = Arc::new(MemoryStorage::with_bytes("{broken"));
        let store = SettingsStore::builder("corrupt", storage.clone())
            .corruption_handler(|_| {
                let mut prefs = Preferences::empty().to_mutable();
                prefs.set(&COUNT, 42);
                prefs.freeze()
            })
            .build();
        assert_eq!(store.read(&COUNT, 0).await?, 42);
        // replacement was written back
        let bytes = storage.bytes().unwrap_or_default();
        assert_eq!(storage::decode(&bytes)?.get(&COUNT), Some(42));
        Ok(())
    }

    #[tokio::test]
    async fn try_read_reports_type_mismatch() -> Result<(), anyhow::Error> {
        let (store, _) = memory_store();
        store.write(&COUNT, 7).await?;
        const COUNT_AS_TEXT: PreferenceKey<String> = PreferenceKey::new("count");
        assert!(matches!(store.try_read(&COUNT_AS_TEXT).await, Err(StoreError::Model(_))));
        assert_eq!(store.try_read(&COUNT).await?, Some(7));
        Ok(())
    }

    #[tokio::test]
    async fn commits_are_counted_in_metrics() -> Result<(), anyhow::Error> {
        let storage = Arc::new(MemoryStorage::new());
        let store = SettingsStore::builder("metrics_sample", storage).build();
        store.write(&FLAG, true).await?;
        let text = observability::encode_metrics();
        assert!(text.contains("settings_store_writes_total"));
        assert!(text.contains("store=\"metrics_sample\""));
        Ok(())
    }

    #[tokio::test]
    async fn non_finite_float_is_rejected_and_store_still_reopens() -> Result<(), anyhow::Error> {
        const SCALE: PreferenceKey<f32> = PreferenceKey::new("scale");
        let (store, storage) = memory_store();
        store.write(&FLAG, false).await?;
        store.write(&SCALE, 0.75).await?;

        let err = store.write(&SCALE, f32::NAN).await.unwrap_err();
        assert!(matches!(err, StoreError::Edit(_)));
        assert_eq!(storage.write_count(), 2);

        let bytes = storage.bytes().unwrap_or_default();
        let reopened = SettingsStore::builder("test", Arc::new(MemoryStorage::with_bytes(bytes))).build();
        assert!(!reopened.read(&FLAG, true).await?);
        assert_eq!(reopened.read(&SCALE, 0.0).await?, 0.75);
        Ok(())
    }

    struct FailingMigration {
        error: fn() -> MigrationError,
        remaining_failures: std::sync::atomic::AtomicUsize,
    }

    impl FailingMigration {
        fn new(error: fn() -> MigrationError, failures: usize) -> Self {
            Self { error, remaining_failures: failures.into() }
        }
    }

    #[async_trait::async_trait]
    impl DataMigration for FailingMigration {
        fn name(&self) -> &str {
            "failing"
        }

        async fn should_migrate(&self, _current: &Preferences) -> Result<bool, MigrationError> {
            Ok(true)
        }

        async fn migrate(&self, current: Preferences) -> Result<Preferences, MigrationError> {
            use std::sync::atomic::Ordering;
            let left = self.remaining_failures.load(Ordering::SeqCst);
            if left > 0 {
                self.remaining_failures.store(left - 1, Ordering::SeqCst);
                return Err((self.error)());
            }
            Ok(current)
        }

        async fn cleanup(&self) -> Result<(), MigrationError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn migration_io_error_emits_empty_snapshot_and_keeps_streaming() -> Result<(), anyhow::Error> {
        let io_error = || MigrationError::Io(std::io::Error::new(ErrorKind::TimedOut, "legacy source busy"));
        let store = SettingsStore::builder("migrating", Arc::new(MemoryStorage::new()))
            .migration(FailingMigration::new(io_error, 1))
            .build();

        let mut stream = Box::pin(store.observe());
        let first = stream.next().await.expect("fallback emission")?;
        assert!(first.is_empty());

        // second attempt migrates fine and the write reaches the same stream
        store.write(&FLAG, true).await?;
        let next = stream.next().await.expect("emission after recovery")?;
        assert_eq!(next.get(&FLAG), Some(true));
        Ok(())
    }

    #[tokio::test]
    async fn migration_parse_error_ends_the_stream() {
        let parse_error = || MigrationError::Parse("unexpected element <list>".into());
        let store = SettingsStore::builder("migrating", Arc::new(MemoryStorage::new()))
            .migration(FailingMigration::new(parse_error, usize::MAX))
            .build();

        let mut stream = Box::pin(store.observe());
        match stream.next().await {
            Some(Err(StoreError::Migration { name, source })) => {
                assert_eq!(name, "failing");
                assert!(!source.is_io());
            }
            other => panic!("expected migration error, got {other:?}"),
        }
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn refresh_publishes_changes_committed_elsewhere() -> Result<(), anyhow::Error> {
        let storage = Arc::new(MemoryStorage::new());
        let watcher = SettingsStore::builder("shared", storage.clone()).build();
        let writer = SettingsStore::builder("shared", storage).build();

        let mut stream = Box::pin(watcher.observe());
        assert!(stream.next().await.expect("initial")?.is_empty());
        assert!(!watcher.refresh().await?);

        writer.write(&COUNT, 5).await?;
        assert!(watcher.refresh().await?);
        assert_eq!(stream.next().await.expect("external change")?.get(&COUNT), Some(5));
        assert_eq!(watcher.read(&COUNT, 0).await?, 5);
        Ok(())
    }

    #[tokio::test]
    async fn remove_and_clear() -> Result<(), anyhow::Error> {
        let (store, _) = memory_store();
        store.write(&FLAG, false).await?;
        store.write(&COUNT, 3).await?;
        store.remove(&FLAG).await?;
        assert!(store.read(&FLAG, true).await?);
        assert_eq!(store.read(&COUNT, 0).await?, 3);
        store.clear().await?;
        assert!(store.current().await?.is_empty());
        Ok(())
    }
}
