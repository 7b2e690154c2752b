use std::{
    collections::VecDeque,
    io::{Error, ErrorKind},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use super::PreferencesStorage;

/// In-memory snapshot storage with scripted failures.
///
/// Useful for ephemeral stores and for exercising the store's error paths.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<Option<Vec<u8>>>,
    read_failures: Mutex<VecDeque<ErrorKind>>,
    write_failures: Mutex<VecDeque<ErrorKind>>,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with raw stored bytes, e.g. a corrupted document.
    pub fn with_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let storage = Self::default();
        *lock(&storage.data) = Some(bytes.into());
        storage
    }

    /// Make the next read fail with an I/O error of the given kind.
    pub fn fail_next_read(&self, kind: ErrorKind) {
        lock(&self.read_failures).push_back(kind);
    }

    /// Make the next write fail with an I/O error of the given kind.
    pub fn fail_next_write(&self, kind: ErrorKind) {
        lock(&self.write_failures).push_back(kind);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn bytes(&self) -> Option<Vec<u8>> {
        lock(&self.data).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl PreferencesStorage for MemoryStorage {
    async fn read(&self) -> std::io::Result<Option<Vec<u8>>> {
        if let Some(kind) = lock(&self.read_failures).pop_front() {
            return Err(Error::new(kind, "injected read failure"));
        }
        Ok(lock(&self.data).clone())
    }

    async fn write(&self, data: &[u8]) -> std::io::Result<()> {
        if let Some(kind) = lock(&self.write_failures).pop_front() {
            return Err(Error::new(kind, "injected write failure"));
        }
        *lock(&self.data) = Some(data.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
