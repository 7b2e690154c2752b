use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use models::{PreferenceKey, SortOrder};
use service::layout::{LayoutSettings, IS_LINEAR_LAYOUT_MANAGER};
use service::storage::{FileStorage, MemoryStorage};
use service::user_preferences::{UserPreferencesRepository, SHOW_COMPLETED, SORT_ORDER};
use service::{SettingsStore, StoreError};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn memory_store(name: &str) -> (SettingsStore, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    (SettingsStore::builder(name, storage.clone()).build(), storage)
}

#[tokio::test]
async fn unwritten_keys_read_as_default() -> Result<(), anyhow::Error> {
    let (store, _) = memory_store("defaults");
    const NAME: PreferenceKey<String> = PreferenceKey::new("name");
    const RATIO: PreferenceKey<f64> = PreferenceKey::new("ratio");

    assert!(store.read(&IS_LINEAR_LAYOUT_MANAGER, true).await?);
    assert!(!store.read(&IS_LINEAR_LAYOUT_MANAGER, false).await?);
    assert_eq!(store.read(&NAME, "guest".to_string()).await?, "guest");
    assert_eq!(store.read(&RATIO, 0.5).await?, 0.5);
    Ok(())
}

#[tokio::test]
async fn layout_scenario_write_then_observe() -> Result<(), anyhow::Error> {
    let (store, _) = memory_store("layout_preferences");
    assert!(store.read(&IS_LINEAR_LAYOUT_MANAGER, true).await?);

    let mut updates = Box::pin(store.observe());
    let first = timeout(WAIT, updates.next()).await?.expect("first emission")?;
    assert!(first.is_empty());

    store.write(&IS_LINEAR_LAYOUT_MANAGER, false).await?;
    let next = timeout(WAIT, updates.next()).await?.expect("emission after write")?;
    assert_eq!(next.get(&IS_LINEAR_LAYOUT_MANAGER), Some(false));
    assert!(!store.read(&IS_LINEAR_LAYOUT_MANAGER, true).await?);
    Ok(())
}

#[tokio::test]
async fn layout_settings_stream_maps_default() -> Result<(), anyhow::Error> {
    let (store, _) = memory_store("layout_preferences");
    let layout = LayoutSettings::new(store);
    let mut values = Box::pin(layout.is_linear_layout_stream());

    assert!(timeout(WAIT, values.next()).await?.expect("initial value")?);
    layout.save_layout(false).await?;
    assert!(!timeout(WAIT, values.next()).await?.expect("updated value")?);
    Ok(())
}

#[tokio::test]
async fn changing_one_key_keeps_the_others() -> Result<(), anyhow::Error> {
    let (store, _) = memory_store("user_preferences");
    store.write(&SORT_ORDER, SortOrder::ByDeadline.to_string()).await?;
    store.write(&SHOW_COMPLETED, true).await?;

    let mut updates = Box::pin(store.observe());
    let before = timeout(WAIT, updates.next()).await?.expect("current snapshot")?;
    assert_eq!(before.get(&SORT_ORDER).as_deref(), Some("BY_DEADLINE"));

    store.write(&SORT_ORDER, SortOrder::ByPriority.to_string()).await?;
    let after = timeout(WAIT, updates.next()).await?.expect("snapshot after write")?;
    assert_eq!(after.get(&SORT_ORDER).as_deref(), Some("BY_PRIORITY"));
    assert_eq!(after.get(&SHOW_COMPLETED), Some(true));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_do_not_lose_updates() -> Result<(), anyhow::Error> {
    const KEYS: [PreferenceKey<i64>; 8] = [
        PreferenceKey::new("k0"),
        PreferenceKey::new("k1"),
        PreferenceKey::new("k2"),
        PreferenceKey::new("k3"),
        PreferenceKey::new("k4"),
        PreferenceKey::new("k5"),
        PreferenceKey::new("k6"),
        PreferenceKey::new("k7"),
    ];
    let (store, _) = memory_store("concurrent");

    let mut handles = Vec::new();
    for (i, key) in KEYS.iter().enumerate() {
        let store = store.clone();
        let key = *key;
        handles.push(tokio::spawn(async move { store.write(&key, i as i64).await }));
    }
    for handle in handles {
        handle.await??;
    }

    let snapshot = store.current().await?;
    for (i, key) in KEYS.iter().enumerate() {
        assert_eq!(snapshot.get(key), Some(i as i64), "{key:?} lost");
    }
    Ok(())
}

#[tokio::test]
async fn concurrent_read_modify_write_is_serialized() -> Result<(), anyhow::Error> {
    const COUNTER: PreferenceKey<i32> = PreferenceKey::new("counter");
    let (store, _) = memory_store("counter");

    let bump = |store: SettingsStore| async move {
        store
            .edit(|prefs| {
                let n = prefs.get(&COUNTER).unwrap_or(0);
                prefs.set(&COUNTER, n + 1);
                Ok(())
            })
            .await
    };
    let (a, b, c) = tokio::join!(bump(store.clone()), bump(store.clone()), bump(store.clone()));
    a?;
    b?;
    c?;
    assert_eq!(store.read(&COUNTER, 0).await?, 3);
    Ok(())
}

#[tokio::test]
async fn recoverable_read_failure_emits_empty_snapshot_and_keeps_streaming() -> Result<(), anyhow::Error> {
    let (store, storage) = memory_store("flaky");
    storage.fail_next_read(ErrorKind::Interrupted);

    let mut updates = Box::pin(store.observe());
    let first = timeout(WAIT, updates.next()).await?.expect("fallback emission")?;
    assert!(first.is_empty());

    // stream is still alive: the next commit reaches it
    store.write(&SHOW_COMPLETED, true).await?;
    let next = timeout(WAIT, updates.next()).await?.expect("emission after recovery")?;
    assert_eq!(next.get(&SHOW_COMPLETED), Some(true));
    Ok(())
}

#[tokio::test]
async fn read_failure_falls_back_for_read_but_fails_write() -> Result<(), anyhow::Error> {
    let (store, storage) = memory_store("flaky");
    storage.fail_next_read(ErrorKind::TimedOut);
    assert!(store.read(&IS_LINEAR_LAYOUT_MANAGER, true).await?);

    storage.fail_next_read(ErrorKind::TimedOut);
    let err = store.write(&IS_LINEAR_LAYOUT_MANAGER, false).await.unwrap_err();
    assert!(matches!(err, StoreError::Io(_)));
    Ok(())
}

#[tokio::test]
async fn dropping_one_subscriber_leaves_others_running() -> Result<(), anyhow::Error> {
    let (store, _) = memory_store("subscribers");
    let mut kept = Box::pin(store.observe());
    let mut dropped = Box::pin(store.observe());
    timeout(WAIT, kept.next()).await?.expect("kept initial")?;
    timeout(WAIT, dropped.next()).await?.expect("dropped initial")?;
    drop(dropped);

    store.write(&SHOW_COMPLETED, true).await?;
    let next = timeout(WAIT, kept.next()).await?.expect("kept update")?;
    assert_eq!(next.get(&SHOW_COMPLETED), Some(true));
    Ok(())
}

#[tokio::test]
async fn snapshots_survive_reopening_the_file() -> Result<(), anyhow::Error> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("user_preferences.preferences.json");

    let first = SettingsStore::builder("user_preferences", Arc::new(FileStorage::new(&path))).build();
    UserPreferencesRepository::new(first).enable_sort_by_priority(true).await?;

    let reopened = SettingsStore::builder("user_preferences", Arc::new(FileStorage::new(&path))).build();
    let prefs = UserPreferencesRepository::new(reopened).fetch_initial_preferences().await?;
    assert_eq!(prefs.sort_order, SortOrder::ByPriority);
    assert!(!prefs.show_completed);
    Ok(())
}

#[tokio::test]
async fn watcher_sees_writes_from_another_store_on_the_same_file() -> Result<(), anyhow::Error> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("layout_preferences.preferences.json");
    let open = || SettingsStore::builder("layout_preferences", Arc::new(FileStorage::new(&path))).build();
    let watcher = LayoutSettings::new(open());
    let writer = LayoutSettings::new(open());

    let poller = watcher.store().spawn_refresh(Duration::from_millis(10));
    let mut values = Box::pin(watcher.is_linear_layout_stream());
    assert!(timeout(WAIT, values.next()).await?.expect("initial value")?);

    writer.save_layout(false).await?;
    assert!(!timeout(WAIT, values.next()).await?.expect("value written elsewhere")?);
    assert!(!watcher.is_linear_layout().await?);
    poller.abort();
    Ok(())
}
