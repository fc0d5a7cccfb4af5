//! Streaming configuration
//!
//! Loaded from JSON; every field is optional in the file and falls back to
//! the defaults below.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Request mode forwarded to the fetcher
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    #[default]
    Cors,
    NoCors,
    SameOrigin,
}

/// Options handed to every [`Fetcher`](super::fetch::Fetcher) call unchanged
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    pub mode: RequestMode,
    pub headers: BTreeMap<String, String>,
    /// Per-request timeout, if the fetcher supports one
    pub timeout_ms: Option<u64>,
}

/// Tunables for [`TilesetStreamer`](super::orchestrator::TilesetStreamer)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Screen-space error (pixels) below which a tile is detailed enough
    pub error_threshold: f64,
    /// Fetch/decode operations allowed in flight at once
    pub max_concurrent_fetches: usize,
    /// Resident payload budget in bytes
    pub cache_byte_budget: usize,
    /// Optional cap on the number of resident tiles
    pub cache_max_tiles: Option<usize>,
    /// Emit bounding box line lists with each published frame
    pub display_bounds_debug: bool,
    pub fetch: FetchOptions,
    /// Traversal recursion guard
    pub max_depth: u32,
    /// Lower clamp for camera-to-volume distance in the error metric
    pub min_camera_distance: f64,
    /// Failed attempts after which a tile is no longer requested
    pub max_retries: u32,
    /// Frames to wait before requesting a failed tile again
    pub retry_backoff_frames: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            error_threshold: 6.0,
            max_concurrent_fetches: 6,
            cache_byte_budget: 256 * 1024 * 1024,
            cache_max_tiles: None,
            display_bounds_debug: false,
            fetch: FetchOptions::default(),
            max_depth: 64,
            min_camera_distance: 0.01,
            max_retries: 3,
            retry_backoff_frames: 30,
        }
    }
}

impl StreamingConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.error_threshold.is_finite() || self.error_threshold < 0.0 {
            return Err(Error::Config(format!(
                "error_threshold must be a non-negative number, got {}",
                self.error_threshold
            )));
        }
        if !self.min_camera_distance.is_finite() || self.min_camera_distance <= 0.0 {
            return Err(Error::Config(format!(
                "min_camera_distance must be positive, got {}",
                self.min_camera_distance
            )));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(Error::Config("max_concurrent_fetches must be at least 1".into()));
        }
        if self.cache_byte_budget == 0 {
            return Err(Error::Config("cache_byte_budget must be non-zero".into()));
        }
        if self.cache_max_tiles == Some(0) {
            return Err(Error::Config("cache_max_tiles must be non-zero when set".into()));
        }
        if self.max_depth == 0 {
            return Err(Error::Config("max_depth must be at least 1".into()));
        }
        Ok(())
    }
}
