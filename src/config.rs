//! Service configuration.
//!
//! Settings come from an optional `thumbcache.toml`. The file is sparse: any
//! key it omits keeps its stock default, and unknown keys are rejected to
//! catch typos early.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! public_root = "public"          # Slugs are resolved relative to this directory
//! cache_dir = "resize"            # Artifact cache root, relative to public_root
//! default_image = "images/placeholder.png"   # Served when a slug is missing
//!
//! [resize]
//! max_auto_width = 1920           # Source width cap when w is not requested
//! max_dimension = 4096            # Hard cap on either output side
//! force_modern_format = true      # Transcode every source to WebP
//! modern_quality = 85             # WebP quality when transcoding
//! original_quality = 90           # Quality when keeping the source format
//!
//! [lock]
//! timeout_ms = 5000               # Give up waiting for a generation lock
//! poll_interval_ms = 100          # Delay between lock attempts
//!
//! [metadata]
//! ttl_secs = 2592000              # Dimension cache lifetime (30 days)
//! max_entries = 10000
//!
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [url]
//! base_url = ""                   # Prefix for generated image URLs
//!
//! [url.sizes]                     # Named size presets for URL generation
//! thumb = "150x150"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name looked up when no explicit `--config` is given.
pub const CONFIG_FILENAME: &str = "thumbcache.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Directory that slugs are resolved against.
    pub public_root: PathBuf,
    /// Artifact cache root, relative to `public_root` unless absolute.
    pub cache_dir: PathBuf,
    /// Slug served in place of a missing source image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_image: Option<String>,
    pub resize: ResizeConfig,
    pub lock: LockConfig,
    pub metadata: MetadataConfig,
    pub server: ServerConfig,
    pub url: UrlConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            public_root: PathBuf::from("public"),
            cache_dir: PathBuf::from("resize"),
            default_image: None,
            resize: ResizeConfig::default(),
            lock: LockConfig::default(),
            metadata: MetadataConfig::default(),
            server: ServerConfig::default(),
            url: UrlConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Absolute-or-relative path of the artifact cache root.
    pub fn cache_root(&self) -> PathBuf {
        self.public_root.join(&self.cache_dir)
    }

    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("resize.modern_quality", self.resize.modern_quality),
            ("resize.original_quality", self.resize.original_quality),
        ] {
            if value == 0 || value > 100 {
                return Err(ConfigError::Validation(format!("{key} must be 1-100")));
            }
        }
        if self.resize.max_auto_width == 0 || self.resize.max_dimension == 0 {
            return Err(ConfigError::Validation(
                "resize.max_auto_width and resize.max_dimension must be non-zero".into(),
            ));
        }
        if self.lock.timeout_ms == 0 || self.lock.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "lock.timeout_ms and lock.poll_interval_ms must be non-zero".into(),
            ));
        }
        if self.lock.poll_interval_ms > self.lock.timeout_ms {
            return Err(ConfigError::Validation(
                "lock.poll_interval_ms must not exceed lock.timeout_ms".into(),
            ));
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation("cache_dir must not be empty".into()));
        }
        Ok(())
    }
}

/// Output sizing and encoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizeConfig {
    /// Cap on the source width applied when a request names no width.
    pub max_auto_width: u32,
    /// Largest width or height a request may ask for or resolve to.
    pub max_dimension: u32,
    /// Transcode jpg/png/gif/webp sources to WebP.
    pub force_modern_format: bool,
    /// Quality used when transcoding to WebP.
    pub modern_quality: u32,
    /// Quality used when the output keeps the source's format.
    pub original_quality: u32,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            max_auto_width: 1920,
            max_dimension: 4096,
            force_modern_format: true,
            modern_quality: 85,
            original_quality: 90,
        }
    }
}

/// Generation lock settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockConfig {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            poll_interval_ms: 100,
        }
    }
}

impl LockConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Dimension metadata cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataConfig {
    pub ttl_secs: u64,
    pub max_entries: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 60 * 60 * 24 * 30,
            max_entries: 10_000,
        }
    }
}

impl MetadataConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

/// URL generation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UrlConfig {
    /// Prefix joined in front of every generated path. Empty means root-relative.
    pub base_url: String,
    /// Named size presets, e.g. `thumb = "150x150"`.
    pub sizes: BTreeMap<String, String>,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ServiceConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key-by-key; any other overlay value replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. `Ok(None)` when it doesn't exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ServiceConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ServiceConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to stock defaults when it is absent.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    resolve_config(stock_defaults_value(), load_raw_config(path)?)
}

/// A fully-commented stock `thumbcache.toml`, printed by `gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# thumbcache configuration
# ========================
# Every key is optional; omitted keys keep the values shown here.

# Directory that request slugs are resolved against.
public_root = "public"

# Where generated thumbnails are stored, relative to public_root.
cache_dir = "resize"

# Slug served when the requested image does not exist.
# default_image = "images/placeholder.png"

[resize]
# Cap on the source width applied when a request gives no w.
max_auto_width = 1920
# Largest w or h a request may ask for; larger values are rejected.
max_dimension = 4096
# Transcode every jpg/png/gif/webp source to WebP.
force_modern_format = true
# WebP quality when transcoding (1-100).
modern_quality = 85
# Quality when the output keeps the source's own format (1-100).
original_quality = 90

[lock]
# How long a request waits for another worker generating the same thumbnail.
timeout_ms = 5000
# Delay between lock attempts.
poll_interval_ms = 100

[metadata]
# Lifetime of cached source dimensions, in seconds (30 days).
ttl_secs = 2592000
# Upper bound on cached entries.
max_entries = 10000

[server]
bind = "127.0.0.1:8080"

[url]
# Prefix for generated image URLs; empty produces root-relative URLs.
base_url = ""

[url.sizes]
# Named size presets usable wherever a "WxH" size is accepted.
# thumb = "150x150"
# card = "480xauto"
"##
}
