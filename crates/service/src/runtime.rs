//! Runtime environment helpers
//!
//! Wires configuration to the process-wide store registry so binaries only
//! depend on `service`.

use configs::AppConfig;

use crate::registry::{self, StoreRegistry};

/// Make sure the data directory exists, then install the global registry rooted there.
pub async fn open_registry(cfg: &AppConfig) -> anyhow::Result<&'static StoreRegistry> {
    common::env::ensure_env(&cfg.storage.data_dir, &cfg.storage.legacy_dir).await?;
    Ok(registry::init_global(&cfg.storage.data_dir))
}
