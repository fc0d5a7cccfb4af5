//! Resident tile content with LRU eviction
//!
//! Entries are pinned while part of the frame's active set. Eviction only
//! ever considers unpinned entries, least recently used first, so content on
//! screen is never torn down even when the budget is exceeded.

use std::cmp::Reverse;
use std::collections::HashMap;

use crate::tileset::TileId;

use super::budget::CacheBudget;

/// Decoded content of one tile
#[derive(Debug)]
pub struct ResidentEntry<P> {
    pub payload: P,
    pub byte_size: usize,
    /// Last frame the tile was displayed or retained
    pub last_used_frame: u64,
    /// Non-zero while the tile is in the active set
    pub pin_count: u32,
}

/// Result of an [`ResidentCache::evict_to`] pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Evicted tiles in eviction order
    pub evicted: Vec<TileId>,
    pub freed_bytes: usize,
    pub remaining_bytes: usize,
    /// Budget still exceeded because everything left is pinned
    pub over_budget: bool,
}

/// Tile payloads kept in memory
pub struct ResidentCache<P> {
    entries: HashMap<TileId, ResidentEntry<P>>,
    total_bytes: usize,
}

impl<P> Default for ResidentCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> ResidentCache<P> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            total_bytes: 0,
        }
    }

    pub fn get(&self, id: TileId) -> Option<&P> {
        self.entries.get(&id).map(|e| &e.payload)
    }

    pub fn entry(&self, id: TileId) -> Option<&ResidentEntry<P>> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: TileId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Insert a payload, returning the one it replaced
    ///
    /// # Arguments
    /// * `id` - Tile the payload belongs to
    /// * `payload` - Decoded content
    /// * `byte_size` - Size charged against the budget
    /// * `frame` - Current frame, used as the initial LRU stamp
    pub fn insert(&mut self, id: TileId, payload: P, byte_size: usize, frame: u64) -> Option<P> {
        self.total_bytes += byte_size;
        let entry = ResidentEntry { payload, byte_size, last_used_frame: frame, pin_count: 0 };
        let replaced = self.entries.insert(id, entry)?;
        self.total_bytes -= replaced.byte_size;
        Some(replaced.payload)
    }

    /// Pin a tile for this frame and refresh its LRU stamp
    ///
    /// Returns `false` if the tile is not resident.
    pub fn mark_active(&mut self, id: TileId, frame: u64) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.pin_count += 1;
                entry.last_used_frame = frame;
                true
            }
            None => false,
        }
    }

    /// Refresh the LRU stamp without pinning
    pub fn touch(&mut self, id: TileId, frame: u64) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.last_used_frame = entry.last_used_frame.max(frame);
                true
            }
            None => false,
        }
    }

    /// Unpin everything, at the start of a frame
    pub fn reset_pins(&mut self) {
        for entry in self.entries.values_mut() {
            entry.pin_count = 0;
        }
    }

    pub fn is_pinned(&self, id: TileId) -> bool {
        self.entries.get(&id).is_some_and(|e| e.pin_count > 0)
    }

    pub fn remove(&mut self, id: TileId) -> Option<P> {
        let entry = self.entries.remove(&id)?;
        self.total_bytes -= entry.byte_size;
        Some(entry.payload)
    }

    /// Evict unpinned entries until the budget is met
    ///
    /// Candidates go least recently used first; ties evict larger entries
    /// first, then lower ids. Every evicted payload is handed to `teardown`.
    pub fn evict_to(&mut self, budget: &CacheBudget, mut teardown: impl FnMut(TileId, P)) -> EvictionReport {
        let mut report = EvictionReport::default();
        if !budget.fits(self.total_bytes, self.entries.len()) {
            let mut candidates: Vec<(u64, Reverse<usize>, TileId)> = self
                .entries
                .iter()
                .filter(|(_, e)| e.pin_count == 0)
                .map(|(id, e)| (e.last_used_frame, Reverse(e.byte_size), *id))
                .collect();
            candidates.sort_unstable();

            for (_, _, id) in candidates {
                if budget.fits(self.total_bytes, self.entries.len()) {
                    break;
                }
                if let Some(entry) = self.entries.remove(&id) {
                    self.total_bytes -= entry.byte_size;
                    report.freed_bytes += entry.byte_size;
                    report.evicted.push(id);
                    teardown(id, entry.payload);
                }
            }
        }

        report.remaining_bytes = self.total_bytes;
        report.over_budget = !budget.fits(self.total_bytes, self.entries.len());
        if !report.evicted.is_empty() {
            log::debug!(
                "Evicted {} tiles ({} bytes), {} bytes resident",
                report.evicted.len(),
                report.freed_bytes,
                report.remaining_bytes
            );
        }
        report
    }

    /// Remove every entry, handing payloads to `teardown`
    pub fn clear(&mut self, mut teardown: impl FnMut(TileId, P)) {
        for (id, entry) in self.entries.drain() {
            teardown(id, entry.payload);
        }
        self.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total resident payload bytes
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn pinned_count(&self) -> usize {
        self.entries.values().filter(|e| e.pin_count > 0).count()
    }

    pub fn ids(&self) -> impl Iterator<Item = TileId> + '_ {
        self.entries.keys().copied()
    }
}
