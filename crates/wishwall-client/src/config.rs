//! Client configuration
//!
//! Defaults match the hosted site; a TOML file and the environment can
//! override them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wishwall_core::{DEFAULT_STORAGE_BASE_URL, PHOTO_BUCKET};

/// Environment variable overriding [`ClientConfig::storage_base_url`]
pub const STORAGE_URL_ENV: &str = "WISHWALL_STORAGE_URL";

/// Errors loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for the submission form, feed, and presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Largest accepted photo, in bytes
    pub max_photo_bytes: u64,
    /// MIME prefix a photo must carry
    pub accepted_mime_prefix: String,
    /// Minimum wish length in characters, after trimming
    pub wish_min_chars: usize,
    /// Maximum wish length in characters, after trimming
    pub wish_max_chars: usize,
    /// Bucket photos are uploaded to
    pub photo_bucket: String,
    /// Folder inside the bucket for uploaded photos
    pub photo_key_prefix: String,
    /// Base URL public photo URLs are built from
    pub storage_base_url: String,
    /// Carousel autoplay delay
    pub autoplay_delay_ms: u64,
    /// Looping and autoplay start above this many wishes
    pub loop_threshold: usize,
    /// Capacity of the change notification channel
    pub event_channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_photo_bytes: 2 * 1024 * 1024,
            accepted_mime_prefix: "image/".to_string(),
            wish_min_chars: 5,
            wish_max_chars: 300,
            photo_bucket: PHOTO_BUCKET.to_string(),
            photo_key_prefix: "public".to_string(),
            storage_base_url: DEFAULT_STORAGE_BASE_URL.to_string(),
            autoplay_delay_ms: 2200,
            loop_threshold: 2,
            event_channel_capacity: 1024,
        }
    }
}

impl ClientConfig {
    /// Parse and validate a TOML document; missing keys keep their defaults
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_toml_str(&raw)?.with_env_overrides())
    }

    /// Apply `WISHWALL_STORAGE_URL` if set
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(STORAGE_URL_ENV)
            && !url.trim().is_empty()
        {
            self.storage_base_url = url;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wish_min_chars == 0 {
            return Err(ConfigError::Invalid("wish_min_chars must be at least 1".into()));
        }
        if self.wish_min_chars > self.wish_max_chars {
            return Err(ConfigError::Invalid(format!(
                "wish_min_chars ({}) exceeds wish_max_chars ({})",
                self.wish_min_chars, self.wish_max_chars
            )));
        }
        if self.max_photo_bytes == 0 {
            return Err(ConfigError::Invalid("max_photo_bytes must be positive".into()));
        }
        if self.photo_bucket.is_empty() {
            return Err(ConfigError::Invalid("photo_bucket must not be empty".into()));
        }
        Ok(())
    }

    pub fn autoplay_delay(&self) -> Duration {
        Duration::from_millis(self.autoplay_delay_ms)
    }
}
