//! Memory budget for resident tile content
//!
//! Tracks the byte and tile-count limits of the cache and provides pressure
//! metrics to guide eviction and reporting.

use super::config::StreamingConfig;

/// Limits the resident cache is evicted down to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheBudget {
    /// Maximum resident payload bytes
    pub max_bytes: usize,
    /// Optional maximum number of resident tiles
    pub max_tiles: Option<usize>,
}

impl CacheBudget {
    /// Create a byte-only budget
    ///
    /// # Arguments
    /// * `max_bytes` - Maximum resident payload bytes
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes, max_tiles: None }
    }

    /// Additionally cap the number of resident tiles
    pub fn with_max_tiles(mut self, max_tiles: usize) -> Self {
        self.max_tiles = Some(max_tiles);
        self
    }

    pub fn from_config(config: &StreamingConfig) -> Self {
        Self {
            max_bytes: config.cache_byte_budget,
            max_tiles: config.cache_max_tiles,
        }
    }

    /// Byte pressure (0.0 to 1.0+)
    ///
    /// Values above 1.0 indicate over-budget.
    pub fn byte_pressure(&self, used_bytes: usize) -> f32 {
        if self.max_bytes == 0 {
            return 0.0;
        }
        used_bytes as f32 / self.max_bytes as f32
    }

    /// Tile count pressure (0.0 to 1.0+), 0 when uncapped
    pub fn tile_pressure(&self, tiles: usize) -> f32 {
        match self.max_tiles {
            Some(max) if max > 0 => tiles as f32 / max as f32,
            _ => 0.0,
        }
    }

    /// Check whether the given usage fits
    ///
    /// # Arguments
    /// * `used_bytes` - Resident payload bytes
    /// * `tiles` - Resident tile count
    pub fn fits(&self, used_bytes: usize, tiles: usize) -> bool {
        used_bytes <= self.max_bytes && self.max_tiles.is_none_or(|max| tiles <= max)
    }

    /// Bytes left before the budget is reached
    pub fn available_bytes(&self, used_bytes: usize) -> usize {
        self.max_bytes.saturating_sub(used_bytes)
    }
}

impl Default for CacheBudget {
    fn default() -> Self {
        Self::from_config(&StreamingConfig::default())
    }
}
