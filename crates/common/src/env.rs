//! Environment/runtime helpers
//!
//! Sanity checks to ensure expected directories exist at startup.

use tracing::{debug, warn};

/// Create the data directory; warn when the legacy preferences directory is missing.
pub async fn ensure_env(data_dir: &str, legacy_dir: &str) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {data_dir}: {e}"))?;
    if tokio::fs::metadata(legacy_dir).await.is_err() {
        debug!(%legacy_dir, "legacy preferences directory not found; nothing to migrate");
    } else if legacy_dir == data_dir {
        warn!(%legacy_dir, "legacy preferences share the data directory");
    }
    Ok(())
}
