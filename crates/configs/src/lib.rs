use anyhow::anyhow;
use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root of all store files (`<data_dir>/datastore/<name>.preferences.json`).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Directory holding legacy `<name>.xml` preference files to import.
    #[serde(default = "default_legacy_dir")]
    pub legacy_dir: String,
    #[serde(default = "default_delete_legacy")]
    pub delete_legacy_after_migration: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            legacy_dir: default_legacy_dir(),
            delete_legacy_after_migration: default_delete_legacy(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Fallback filter directive when `RUST_LOG` is unset.
    #[serde(default)]
    pub filter: Option<String>,
}

fn default_data_dir() -> String { "data".into() }
fn default_legacy_dir() -> String { "data/shared_prefs".into() }
fn default_delete_legacy() -> bool { true }

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let cfg: AppConfig = toml::from_str(&content)?;
    Ok(cfg)
}

impl AppConfig {
    /// Load `CONFIG_PATH` (default `config.toml`) if present, otherwise defaults;
    /// then apply env overrides and validate.
    pub fn load_and_validate() -> Result<Self> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        let mut cfg = if Path::new(&path).exists() { load_from_file(&path)? } else { AppConfig::default() };
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.storage.normalize_from_env();
        self.storage.validate()?;
        Ok(())
    }
}

impl StorageConfig {
    pub fn normalize_from_env(&mut self) {
        if let Ok(dir) = std::env::var("PREFS_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.data_dir = dir;
            }
        }
        if let Ok(dir) = std::env::var("PREFS_LEGACY_DIR") {
            if !dir.trim().is_empty() {
                self.legacy_dir = dir;
            }
        }
        self.data_dir = self.data_dir.trim().to_string();
        self.legacy_dir = self.legacy_dir.trim().to_string();
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_dir.is_empty() {
            return Err(anyhow!("storage.data_dir must not be empty; set it in config.toml or PREFS_DATA_DIR"));
        }
        if self.legacy_dir.is_empty() {
            return Err(anyhow!("storage.legacy_dir must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() -> Result<()> {
        let cfg: AppConfig = toml::from_str("")?;
        assert_eq!(cfg.storage.data_dir, "data");
        assert_eq!(cfg.storage.legacy_dir, "data/shared_prefs");
        assert!(cfg.storage.delete_legacy_after_migration);
        assert_eq!(cfg.logging.format, LogFormat::Compact);
        Ok(())
    }

    #[test]
    fn parses_full_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[storage]
data_dir = "/var/lib/prefs"
legacy_dir = "/var/lib/prefs/legacy"
delete_legacy_after_migration = false

[logging]
format = "json"
filter = "debug"
"#,
        )?;
        let cfg = load_from_file(&path.to_string_lossy())?;
        assert_eq!(cfg.storage.data_dir, "/var/lib/prefs");
        assert!(!cfg.storage.delete_legacy_after_migration);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.logging.filter.as_deref(), Some("debug"));
        Ok(())
    }

    #[test]
    fn blank_data_dir_is_rejected() {
        let storage = StorageConfig { data_dir: String::new(), ..StorageConfig::default() };
        assert!(storage.validate().is_err());
    }
}
