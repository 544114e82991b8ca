//! Configuration file of the CLI

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use transio_common::TransientStoreConfig;

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub store: TransientStoreConfig,
    #[serde(default)]
    pub gc: GcConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// Holds `kv.redb` and the `blobs/` tree
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GcConfig {
    /// Period of `gc --interval` when no interval is given on the command line
    #[serde(default = "default_gc_interval")]
    pub interval_secs: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_gc_interval(),
        }
    }
}

impl GcConfig {
    /// Period of the GC loop: `secs` when non-zero, otherwise `interval_secs`
    pub fn period(&self, secs: u64) -> anyhow::Result<Duration> {
        let secs = if secs == 0 { self.interval_secs } else { secs };
        anyhow::ensure!(
            secs > 0,
            "GC interval must be positive (set gc.interval_secs or pass --interval)"
        );
        Ok(Duration::from_secs(secs))
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/transio")
}

const fn default_gc_interval() -> u64 {
    600
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load `path` if it exists, otherwise defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let config_str = std::fs::read_to_string(path)?;
        toml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file {}: {}", path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load(Path::new("/nonexistent/transio.toml")).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/transio"));
        assert_eq!(config.store.name, "default");
        assert_eq!(config.gc.period(0).unwrap(), Duration::from_secs(600));
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("transio.toml");
        std::fs::write(
            &path,
            r#"
[storage]
data_dir = "/tmp/transio"

[store]
name = "conversions"
target_max_size_mb = 512
absolute_max_size_mb = 1024

[store.lock]
timeout_ms = 250

[logging]
level = "debug"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/transio"));
        assert_eq!(config.store.name, "conversions");
        assert_eq!(config.store.blob_provider_id(), "transient_conversions");
        assert_eq!(config.store.target_max_size(), Some(512 * 1024 * 1024));
        assert_eq!(config.store.lock.timeout_ms, 250);
        assert_eq!(config.store.lock.ttl_ms, 60_000);
        assert_eq!(config.store.first_level_ttl_minutes, 120);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.gc.interval_secs, 600);
    }

    #[test]
    fn test_gc_period() {
        let gc = GcConfig { interval_secs: 0 };
        assert_eq!(gc.period(30).unwrap(), Duration::from_secs(30));
        assert!(gc.period(0).is_err());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("transio.toml");
        std::fs::write(&path, "[store]\nname = 3\n").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
