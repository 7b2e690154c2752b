use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;

use super::PreferencesStorage;

/// File-backed snapshot storage.
///
/// Writes go to a sibling `*.tmp` file which is flushed to disk and then
/// renamed over the target, so a crash leaves either the old or the new
/// snapshot, never a torn one. On Unix the directory is synced after the
/// rename so the new entry itself survives a crash.
#[derive(Debug, Clone)]
pub struct FileStorage {
    file_path: PathBuf,
}

impl FileStorage {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { file_path: path.into() }
    }

    fn dir(&self) -> &Path {
        match self.file_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.file_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.file_path.with_file_name(name)
    }
}

#[async_trait]
impl PreferencesStorage for FileStorage {
    async fn read(&self) -> std::io::Result<Option<Vec<u8>>> {
        match fs::read(&self.file_path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write(&self, data: &[u8]) -> std::io::Result<()> {
        fs::create_dir_all(self.dir()).await?;
        let tmp = self.temp_path();
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        if let Err(e) = fs::rename(&tmp, &self.file_path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        #[cfg(unix)]
        fs::File::open(self.dir()).await?.sync_all().await?;
        debug!(path = %self.file_path.display(), bytes = data.len(), "preferences file committed");
        Ok(())
    }

    fn location(&self) -> String {
        self.file_path.display().to_string()
    }
}
