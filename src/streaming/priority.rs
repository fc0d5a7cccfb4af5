//! Request priorities and the queue of requests waiting for a fetch slot
//!
//! The queue is a binary heap with lazy invalidation: re-prioritizing or
//! removing a request leaves its old heap entry behind, and stale entries are
//! skipped when popped. Each live request remembers the version of its
//! current heap entry so stale ones are recognized without searching.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap};

/// Identifies one submitted request for its whole lifetime
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestHandle(pub u64);

/// Load priority of a tile
///
/// Ordered so that the greatest value is loaded first.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TilePriority {
    /// The tile would replace content that is currently displayed in its place
    pub replaces_displayed: bool,
    /// Screen-space error of the tile this frame, in pixels
    pub error: f64,
    pub depth: u32,
}

impl TilePriority {
    pub fn new(replaces_displayed: bool, error: f64, depth: u32) -> Self {
        Self { replaces_displayed, error, depth }
    }
}

impl Eq for TilePriority {}

impl Ord for TilePriority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.replaces_displayed
            .cmp(&other.replaces_displayed)
            // total_cmp keeps +inf (degenerate volumes) well ordered
            .then_with(|| self.error.total_cmp(&other.error))
            // Shallower tiles first
            .then_with(|| other.depth.cmp(&self.depth))
    }
}

impl PartialOrd for TilePriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct HeapEntry {
    priority: TilePriority,
    /// Submission order, newer is larger
    seq: u64,
    version: u32,
    handle: RequestHandle,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Equal priorities: most recent submission first
        self.priority.cmp(&other.priority).then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Queued<J> {
    priority: TilePriority,
    seq: u64,
    version: u32,
    job: J,
}

/// Max-priority queue of pending jobs keyed by [`RequestHandle`]
pub struct RequestQueue<J> {
    heap: BinaryHeap<HeapEntry>,
    live: HashMap<RequestHandle, Queued<J>>,
    next_seq: u64,
}

impl<J> Default for RequestQueue<J> {
    fn default() -> Self {
        Self::new()
    }
}

impl<J> RequestQueue<J> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Queue a job
    ///
    /// Pushing a handle that is already queued replaces its job and priority
    /// but keeps its place in submission order.
    pub fn push(&mut self, handle: RequestHandle, priority: TilePriority, job: J) {
        let seq = self.next_seq;
        self.next_seq += 1;
        match self.live.entry(handle) {
            Entry::Occupied(mut slot) => {
                let queued = slot.get_mut();
                queued.version = queued.version.wrapping_add(1);
                queued.priority = priority;
                queued.job = job;
                self.heap.push(HeapEntry { priority, seq: queued.seq, version: queued.version, handle });
            }
            Entry::Vacant(slot) => {
                slot.insert(Queued { priority, seq, version: 0, job });
                self.heap.push(HeapEntry { priority, seq, version: 0, handle });
            }
        }
        self.maybe_compact();
    }

    /// Change the priority of a queued job
    ///
    /// Returns `false` if the handle is not queued (already started or gone).
    pub fn update(&mut self, handle: RequestHandle, priority: TilePriority) -> bool {
        let Some(queued) = self.live.get_mut(&handle) else {
            return false;
        };
        if queued.priority == priority {
            return true;
        }
        queued.version = queued.version.wrapping_add(1);
        queued.priority = priority;
        self.heap.push(HeapEntry { priority, seq: queued.seq, version: queued.version, handle });
        self.maybe_compact();
        true
    }

    /// Remove a queued job, returning it
    pub fn remove(&mut self, handle: RequestHandle) -> Option<J> {
        let job = self.live.remove(&handle).map(|q| q.job);
        self.maybe_compact();
        job
    }

    /// Take the highest priority job
    pub fn pop(&mut self) -> Option<(RequestHandle, J)> {
        while let Some(entry) = self.heap.pop() {
            let current = self.live.get(&entry.handle).is_some_and(|q| q.version == entry.version);
            if current {
                if let Some(queued) = self.live.remove(&entry.handle) {
                    return Some((entry.handle, queued.job));
                }
            }
        }
        None
    }

    /// Priority of a queued job
    pub fn priority(&self, handle: RequestHandle) -> Option<TilePriority> {
        self.live.get(&handle).map(|q| q.priority)
    }

    pub fn contains(&self, handle: RequestHandle) -> bool {
        self.live.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Drop every queued job
    pub fn clear(&mut self) -> Vec<(RequestHandle, J)> {
        self.heap.clear();
        self.live.drain().map(|(handle, q)| (handle, q.job)).collect()
    }

    /// Rebuild the heap once stale entries dominate it
    fn maybe_compact(&mut self) {
        if self.heap.len() <= 2 * self.live.len() + 64 {
            return;
        }
        self.heap = self
            .live
            .iter()
            .map(|(&handle, q)| HeapEntry { priority: q.priority, seq: q.seq, version: q.version, handle })
            .collect();
    }
}
