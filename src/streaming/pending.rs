//! Outstanding requests, one per tile
//!
//! The request handle doubles as a generation token: a completion is only
//! accepted if it carries the handle currently recorded for its tile and the
//! record was not cancelled. A cancelled request that is already running
//! keeps its record until its completion arrives, so the tile can never have
//! two fetches in flight.

use std::collections::HashMap;

use crate::tileset::TileId;

use super::priority::RequestHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingRequest {
    pub handle: RequestHandle,
    /// No longer wanted; the result is discarded when it arrives
    pub cancelled: bool,
}

/// What to do with a finished request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Current and wanted
    Accept,
    /// Cancelled or superseded; drop the result
    Discard,
}

#[derive(Debug, Default)]
pub struct PendingTable {
    requests: HashMap<TileId, PendingRequest>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new request; the tile must not already have one
    pub fn insert(&mut self, tile: TileId, handle: RequestHandle) {
        let previous = self.requests.insert(tile, PendingRequest { handle, cancelled: false });
        debug_assert!(previous.is_none(), "duplicate request for {tile}");
    }

    pub fn get(&self, tile: TileId) -> Option<&PendingRequest> {
        self.requests.get(&tile)
    }

    pub fn contains(&self, tile: TileId) -> bool {
        self.requests.contains_key(&tile)
    }

    /// Flag a request whose result is no longer wanted
    pub fn mark_cancelled(&mut self, tile: TileId) {
        if let Some(request) = self.requests.get_mut(&tile) {
            request.cancelled = true;
        }
    }

    /// Want a cancelled-but-running request again
    ///
    /// Returns `true` if the tile has a record (cancelled or not), in which
    /// case no new request must be issued.
    pub fn revive(&mut self, tile: TileId) -> bool {
        match self.requests.get_mut(&tile) {
            Some(request) => {
                request.cancelled = false;
                true
            }
            None => false,
        }
    }

    /// Drop a record without a completion (the queue removed it)
    pub fn remove(&mut self, tile: TileId) -> Option<PendingRequest> {
        self.requests.remove(&tile)
    }

    /// Match a completion against the table, clearing the record
    pub fn resolve(&mut self, tile: TileId, handle: RequestHandle) -> Resolution {
        match self.requests.get(&tile) {
            Some(request) if request.handle == handle => {
                let cancelled = request.cancelled;
                self.requests.remove(&tile);
                if cancelled { Resolution::Discard } else { Resolution::Accept }
            }
            // Stale completion from an older request for the same tile
            _ => Resolution::Discard,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileId, &PendingRequest)> {
        self.requests.iter().map(|(tile, request)| (*tile, request))
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn clear(&mut self) {
        self.requests.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_current_request() {
        let mut table = PendingTable::new();
        table.insert(TileId(1), RequestHandle(7));
        assert_eq!(table.resolve(TileId(1), RequestHandle(7)), Resolution::Accept);
        assert!(table.is_empty());
    }

    #[test]
    fn test_cancelled_running_request_discarded() {
        let mut table = PendingTable::new();
        table.insert(TileId(1), RequestHandle(7));
        table.mark_cancelled(TileId(1));
        // Record stays until the completion arrives
        assert!(table.contains(TileId(1)));
        assert_eq!(table.resolve(TileId(1), RequestHandle(7)), Resolution::Discard);
        assert!(!table.contains(TileId(1)));
    }

    #[test]
    fn test_revive_reuses_running_request() {
        let mut table = PendingTable::new();
        table.insert(TileId(1), RequestHandle(7));
        table.mark_cancelled(TileId(1));
        assert!(table.revive(TileId(1)));
        assert_eq!(table.resolve(TileId(1), RequestHandle(7)), Resolution::Accept);
        assert!(!table.revive(TileId(2)));
    }

    #[test]
    fn test_stale_handle_discarded() {
        let mut table = PendingTable::new();
        table.insert(TileId(1), RequestHandle(9));
        assert_eq!(table.resolve(TileId(1), RequestHandle(3)), Resolution::Discard);
        // The current request is untouched
        assert_eq!(table.get(TileId(1)).map(|r| r.handle), Some(RequestHandle(9)));
    }
}
