//! Engine configuration: cache sizes, thumbnail location and decode bounds.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then environment variables. Every field in the file is optional.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::page::DEFAULT_PAGE_SLOTS;

pub const ENV_PAGE_CACHE_SLOTS: &str = "LEAFVIEW_PAGE_CACHE_SLOTS";
pub const ENV_THUMBNAIL_DIR: &str = "LEAFVIEW_THUMBNAIL_DIR";
pub const ENV_THUMBNAIL_RETENTION_DAYS: &str = "LEAFVIEW_THUMBNAIL_RETENTION_DAYS";
pub const ENV_THUMBNAIL_CACHE_MB: &str = "LEAFVIEW_THUMBNAIL_CACHE_MB";

/// Configuration for page decoding and both cache tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Decoded pages kept per open document
    pub page_cache_slots: usize,
    /// Share of available RAM given to the thumbnail memory tier
    pub thumbnail_memory_fraction: f64,
    /// Fixed thumbnail memory budget in megabytes, overriding the fraction
    pub thumbnail_cache_mb: Option<u64>,
    /// Directory for persisted thumbnails
    pub thumbnail_dir: PathBuf,
    /// Thumbnails older than this many days are removed by cleanup
    pub retention_days: u64,
    /// Bounding square for rendered pages of paged documents
    pub max_page_side: u32,
    /// Bounding square for thumbnails
    pub thumbnail_side: u32,
    pub jpeg_quality: u8,
    /// Pages decoded ahead of the visible one
    pub read_ahead: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            page_cache_slots: DEFAULT_PAGE_SLOTS,
            thumbnail_memory_fraction: 0.25,
            thumbnail_cache_mb: None,
            thumbnail_dir: Self::default_thumbnail_dir(),
            retention_days: 30,
            max_page_side: leafview_render::DEFAULT_PAGE_SIDE,
            thumbnail_side: leafview_render::DEFAULT_THUMBNAIL_SIDE,
            jpeg_quality: leafview_render::DEFAULT_JPEG_QUALITY,
            read_ahead: 1,
        }
    }
}

impl CacheConfig {
    pub fn with_page_cache_slots(mut self, slots: usize) -> Self {
        self.page_cache_slots = slots.max(1);
        self
    }

    pub fn with_thumbnail_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.thumbnail_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn with_thumbnail_cache_mb(mut self, mb: u64) -> Self {
        self.thumbnail_cache_mb = Some(mb);
        self
    }

    pub fn with_retention_days(mut self, days: u64) -> Self {
        self.retention_days = days;
        self
    }

    pub fn with_read_ahead(mut self, pages: u32) -> Self {
        self.read_ahead = pages;
        self
    }

    /// Returns the default thumbnail directory for the current platform.
    ///
    /// - macOS: ~/Library/Caches/leafview/thumbnails
    /// - Linux: ~/.cache/leafview/thumbnails
    /// - Windows: %LOCALAPPDATA%\leafview\thumbnails
    pub fn default_thumbnail_dir() -> PathBuf {
        if let Some(cache_dir) = dirs::cache_dir() {
            cache_dir.join("leafview").join("thumbnails")
        } else {
            std::env::temp_dir().join("leafview").join("thumbnails")
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(24 * 60 * 60))
    }

    /// Fixed thumbnail budget in bytes, if one was configured
    pub fn thumbnail_cache_bytes(&self) -> Option<u64> {
        self.thumbnail_cache_mb.map(|mb| mb.saturating_mul(1024 * 1024))
    }

    /// Defaults, then `path` if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()
    }

    /// Loads configuration from environment variables over the defaults.
    ///
    /// Environment variables:
    /// - `LEAFVIEW_PAGE_CACHE_SLOTS`: decoded pages per document (default: 5)
    /// - `LEAFVIEW_THUMBNAIL_DIR`: thumbnail directory
    /// - `LEAFVIEW_THUMBNAIL_RETENTION_DAYS`: thumbnail retention (default: 30)
    /// - `LEAFVIEW_THUMBNAIL_CACHE_MB`: fixed thumbnail memory budget
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Overlay environment variables on this configuration.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Some(slots) = env_number::<usize>(ENV_PAGE_CACHE_SLOTS)? {
            if slots == 0 {
                return Err(ConfigError::InvalidValue {
                    key: ENV_PAGE_CACHE_SLOTS.to_string(),
                    value: "0".to_string(),
                });
            }
            self.page_cache_slots = slots;
        }

        if let Ok(val) = std::env::var(ENV_THUMBNAIL_DIR) {
            if !val.is_empty() {
                self.thumbnail_dir = PathBuf::from(val);
            }
        }

        if let Some(days) = env_number::<u64>(ENV_THUMBNAIL_RETENTION_DAYS)? {
            self.retention_days = days;
        }

        if let Some(mb) = env_number::<u64>(ENV_THUMBNAIL_CACHE_MB)? {
            self.thumbnail_cache_mb = Some(mb);
        }

        Ok(self)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format (all keys optional):
    /// ```toml
    /// page_cache_slots = 5
    /// thumbnail_dir = "/path/to/thumbnails"
    /// retention_days = 30
    /// thumbnail_cache_mb = 64
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, value: String| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        };

        if self.page_cache_slots == 0 {
            return Err(invalid("page_cache_slots", "0".to_string()));
        }
        if !(self.thumbnail_memory_fraction > 0.0 && self.thumbnail_memory_fraction <= 1.0) {
            return Err(invalid(
                "thumbnail_memory_fraction",
                self.thumbnail_memory_fraction.to_string(),
            ));
        }
        if self.max_page_side == 0 {
            return Err(invalid("max_page_side", "0".to_string()));
        }
        if self.thumbnail_side == 0 {
            return Err(invalid("thumbnail_side", "0".to_string()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(invalid("jpeg_quality", self.jpeg_quality.to_string()));
        }
        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key: key.to_string(), value: val }),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for configuration key {key}")]
    InvalidValue { key: String, value: String },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ALL_VARS: [&str; 4] = [
        ENV_PAGE_CACHE_SLOTS,
        ENV_THUMBNAIL_DIR,
        ENV_THUMBNAIL_RETENTION_DAYS,
        ENV_THUMBNAIL_CACHE_MB,
    ];

    // Helper to save and restore environment variables
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in var_names {
                env::remove_var(name);
            }
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.page_cache_slots, 5);
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.max_page_side, 1280);
        assert_eq!(config.thumbnail_side, 400);
        assert_eq!(config.jpeg_quality, 85);
        assert_eq!(config.read_ahead, 1);
        assert!(config.thumbnail_dir.ends_with("leafview/thumbnails"));
        assert_eq!(config.retention(), Duration::from_secs(30 * 24 * 60 * 60));
    }

    #[test]
    fn test_builder_methods() {
        let config = CacheConfig::default()
            .with_page_cache_slots(8)
            .with_thumbnail_dir("/custom/thumbs")
            .with_thumbnail_cache_mb(32)
            .with_retention_days(7)
            .with_read_ahead(2);

        assert_eq!(config.page_cache_slots, 8);
        assert_eq!(config.thumbnail_dir, PathBuf::from("/custom/thumbs"));
        assert_eq!(config.thumbnail_cache_bytes(), Some(32 * 1024 * 1024));
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.read_ahead, 2);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(&ALL_VARS);

        env::set_var(ENV_PAGE_CACHE_SLOTS, "9");
        env::set_var(ENV_THUMBNAIL_DIR, "/tmp/leafview-thumbs");
        env::set_var(ENV_THUMBNAIL_RETENTION_DAYS, "3");
        env::set_var(ENV_THUMBNAIL_CACHE_MB, "48");

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.page_cache_slots, 9);
        assert_eq!(config.thumbnail_dir, PathBuf::from("/tmp/leafview-thumbs"));
        assert_eq!(config.retention_days, 3);
        assert_eq!(config.thumbnail_cache_mb, Some(48));
    }

    #[test]
    #[serial]
    fn test_from_env_partial() {
        let _guard = EnvGuard::new(&ALL_VARS);
        env::set_var(ENV_THUMBNAIL_RETENTION_DAYS, "10");

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.retention_days, 10);
        assert_eq!(config.page_cache_slots, 5);
        assert_eq!(config.thumbnail_cache_mb, None);
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(&ALL_VARS);

        env::set_var(ENV_PAGE_CACHE_SLOTS, "not_a_number");
        let err = CacheConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == ENV_PAGE_CACHE_SLOTS));

        env::set_var(ENV_PAGE_CACHE_SLOTS, "0");
        assert!(CacheConfig::from_env().is_err());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = CacheConfig::from_toml(
            r#"
            # Reader configuration
            page_cache_slots = 3
            thumbnail_dir = "/tmp/test"
            "#,
        )
        .unwrap();

        assert_eq!(config.page_cache_slots, 3);
        assert_eq!(config.thumbnail_dir, PathBuf::from("/tmp/test"));
        assert_eq!(config.retention_days, 30);
    }

    #[test]
    fn test_from_toml_rejects_bad_values() {
        assert!(matches!(
            CacheConfig::from_toml("jpeg_quality = 0").unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
        assert!(matches!(
            CacheConfig::from_toml("page_cache_slots = \"five\"").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    #[serial]
    fn test_file_save_and_load_with_env_overlay() {
        let _guard = EnvGuard::new(&ALL_VARS);
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("leafview.toml");

        let config = CacheConfig::default()
            .with_page_cache_slots(7)
            .with_thumbnail_dir(temp_dir.path().join("thumbs"));
        config.save_to_file(&config_path).unwrap();

        let loaded = CacheConfig::load(Some(&config_path)).unwrap();
        assert_eq!(loaded, config);

        env::set_var(ENV_PAGE_CACHE_SLOTS, "2");
        let overlaid = CacheConfig::load(Some(&config_path)).unwrap();
        assert_eq!(overlaid.page_cache_slots, 2);
    }
}
