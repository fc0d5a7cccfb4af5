//! Frame update orchestration
//!
//! [`TilesetStreamer`] owns the tile tree, the resident cache, the pending
//! request table and the fetch pipeline, and runs one update per rendered
//! frame:
//!
//! 1. unpin last frame's tiles
//! 2. drain finished requests into the cache (or attach external tilesets)
//! 3. traverse the tree for the new camera
//! 4. submit, re-rank and cancel requests to match what the traversal wants
//! 5. evict unpinned content down to the budget
//! 6. publish the active set to the render sink

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::core::types::DMat4;
use crate::core::{Camera, Result, TileError};
use crate::math::{Aabb, Ray};
use crate::tileset::{LoadState, TileId, Tileset};

use super::budget::CacheBudget;
use super::cache::ResidentCache;
use super::config::StreamingConfig;
use super::debug::{LineVertex, depth_color, push_outline};
use super::fetch::{Decoder, Fetcher, LoadedContent};
use super::pending::{PendingTable, Resolution};
use super::pipeline::{Completion, FetchPipeline};
use super::traversal::{TileRequest, TraversalEngine};

/// A displayed tile handed to the renderer
#[derive(Debug)]
pub struct ActiveTile<'a, P> {
    pub id: TileId,
    pub payload: &'a P,
    /// Model matrix: root transform times the tile's own transform
    pub transform: DMat4,
}

/// Everything the renderer needs for one frame
#[derive(Debug)]
pub struct PublishedFrame<'a, P> {
    pub frame: u64,
    /// Tiles to draw, in traversal order
    pub tiles: &'a [ActiveTile<'a, P>],
    /// Bounds outlines, empty unless `display_bounds_debug` is set
    pub debug_lines: &'a [LineVertex],
}

/// Receives displayed content and disposes of evicted content
pub trait RenderSink<P> {
    fn publish(&mut self, frame: &PublishedFrame<'_, P>);

    /// Release GPU or other resources held for a payload
    fn dispose(&mut self, tile: TileId, payload: P);
}

/// What happened during one [`TilesetStreamer::update`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: u64,
    pub active: usize,
    pub visited: usize,
    pub culled: usize,
    /// Requests newly handed to the pipeline
    pub requested: usize,
    /// Queued requests re-ranked for this frame
    pub reprioritized: usize,
    /// Requests dropped because the tile is no longer wanted
    pub cancelled: usize,
    pub loaded: usize,
    pub failed: usize,
    /// Completions for requests that were cancelled or superseded
    pub discarded: usize,
    pub evicted: usize,
    pub resident_tiles: usize,
    pub resident_bytes: usize,
    pub pending: usize,
    pub guard_trips: usize,
    /// Everything left in the cache is pinned and still over budget
    pub budget_exceeded: bool,
}

/// Counters accumulated over the streamer's lifetime
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamingStats {
    pub frames: u64,
    pub requests: u64,
    pub cancellations: u64,
    pub loads: u64,
    pub failures: u64,
    pub evictions: u64,
    pub tilesets_attached: u64,
    pub peak_resident_bytes: usize,
}

/// Streams a tileset's content for a moving camera
pub struct TilesetStreamer<P: Send + 'static, S: RenderSink<P>> {
    tileset: Tileset,
    config: StreamingConfig,
    engine: TraversalEngine,
    budget: CacheBudget,
    cache: ResidentCache<P>,
    pending: PendingTable,
    pipeline: FetchPipeline<P>,
    sink: S,
    root_transform: DMat4,
    frame: u64,
    active: Vec<TileId>,
    debug_lines: Vec<LineVertex>,
    over_budget: bool,
    stats: StreamingStats,
    shut_down: bool,
}

impl<P: Send + 'static, S: RenderSink<P>> TilesetStreamer<P, S> {
    /// Create a streamer with its own fetch runtime
    ///
    /// Fails if the configuration is invalid or the runtime cannot start.
    pub fn new(
        tileset: Tileset,
        config: StreamingConfig,
        fetcher: Arc<dyn Fetcher>,
        decoder: Arc<dyn Decoder<Payload = P>>,
        sink: S,
    ) -> Result<Self> {
        config.validate()?;
        let pipeline = FetchPipeline::new(fetcher, decoder, config.max_concurrent_fetches, config.fetch.clone())?;
        Ok(Self::with_pipeline(tileset, config, pipeline, sink))
    }

    /// Create a streamer whose fetches run on an existing runtime
    pub fn with_handle(
        handle: &Handle,
        tileset: Tileset,
        config: StreamingConfig,
        fetcher: Arc<dyn Fetcher>,
        decoder: Arc<dyn Decoder<Payload = P>>,
        sink: S,
    ) -> Result<Self> {
        config.validate()?;
        let pipeline =
            FetchPipeline::with_handle(handle, fetcher, decoder, config.max_concurrent_fetches, config.fetch.clone());
        Ok(Self::with_pipeline(tileset, config, pipeline, sink))
    }

    fn with_pipeline(tileset: Tileset, config: StreamingConfig, pipeline: FetchPipeline<P>, sink: S) -> Self {
        Self {
            engine: TraversalEngine::from_config(&config),
            budget: CacheBudget::from_config(&config),
            tileset,
            config,
            cache: ResidentCache::new(),
            pending: PendingTable::new(),
            pipeline,
            sink,
            root_transform: DMat4::IDENTITY,
            frame: 0,
            active: Vec::new(),
            debug_lines: Vec::new(),
            over_budget: false,
            stats: StreamingStats::default(),
            shut_down: false,
        }
    }

    /// Run one frame of streaming for `camera`
    pub fn update(&mut self, camera: &Camera) -> FrameReport {
        self.frame += 1;
        let frame = self.frame;
        let mut report = FrameReport { frame, ..Default::default() };

        self.cache.reset_pins();
        self.process_completions(&mut report);

        let cache = &self.cache;
        let output = self
            .engine
            .traverse(&self.tileset, camera, &self.root_transform, frame, |id| cache.contains(id));
        report.visited = output.visited;
        report.culled = output.culled;
        report.guard_trips = output.guard_trips;

        for &id in &output.retained {
            self.cache.touch(id, frame);
        }
        for &id in &output.active {
            self.cache.mark_active(id, frame);
        }
        self.issue_requests(&output.requests, &mut report);
        self.active = output.active;

        let sink = &mut self.sink;
        let eviction = self.cache.evict_to(&self.budget, |id, payload| sink.dispose(id, payload));
        for &id in &eviction.evicted {
            self.tileset.set_load_state(id, LoadState::Unloaded);
        }
        report.evicted = eviction.evicted.len();
        report.budget_exceeded = eviction.over_budget;
        if eviction.over_budget && !self.over_budget {
            log::warn!(
                "Cache budget exceeded: {} bytes pinned by the active set (budget {})",
                eviction.remaining_bytes,
                self.budget.max_bytes
            );
        } else if !eviction.over_budget && self.over_budget {
            log::info!("Cache back within budget ({} bytes)", eviction.remaining_bytes);
        }
        self.over_budget = eviction.over_budget;

        self.rebuild_debug_lines();
        self.publish(frame);

        report.active = self.active.len();
        report.resident_tiles = self.cache.len();
        report.resident_bytes = self.cache.total_bytes();
        report.pending = self.pending.len();

        self.stats.frames += 1;
        self.stats.requests += report.requested as u64;
        self.stats.cancellations += report.cancelled as u64;
        self.stats.loads += report.loaded as u64;
        self.stats.failures += report.failed as u64;
        self.stats.evictions += report.evicted as u64;
        self.stats.peak_resident_bytes = self.stats.peak_resident_bytes.max(report.resident_bytes);

        log::trace!("Frame {}: {:?}", frame, report);
        report
    }

    fn process_completions(&mut self, report: &mut FrameReport) {
        for completion in self.pipeline.drain() {
            let tile = completion.tile();
            if self.pending.resolve(tile, completion.handle()) == Resolution::Discard {
                match completion {
                    // Unwanted or not, the attempt counts against the retry limit
                    Completion::Failed { error, .. } => {
                        log::debug!("Cancelled request for {} failed anyway: {}", tile, error);
                        self.count_failure(tile, &error);
                        report.failed += 1;
                    }
                    Completion::Cancelled { .. } => {}
                    Completion::Loaded { .. } => report.discarded += 1,
                }
                // Payloads never reached the cache, so the sink never saw them
                if !self.pending.contains(tile) && self.tileset.load_state(tile) == LoadState::Pending {
                    let runtime = self.tileset.runtime_mut(tile);
                    runtime.state = if runtime.failures > 0 { LoadState::Failed } else { LoadState::Unloaded };
                }
                continue;
            }

            match completion {
                Completion::Loaded { content: LoadedContent::Renderable { payload, byte_size }, .. } => {
                    if let Some(old) = self.cache.insert(tile, payload, byte_size, self.frame) {
                        self.sink.dispose(tile, old);
                    }
                    let runtime = self.tileset.runtime_mut(tile);
                    runtime.state = LoadState::Loaded;
                    runtime.failures = 0;
                    report.loaded += 1;
                }
                Completion::Loaded { content: LoadedContent::Tileset(document), .. } => {
                    let uri = self.content_uri(tile);
                    match self.tileset.attach_external(tile, &document, &uri) {
                        Ok(_) => {
                            let runtime = self.tileset.runtime_mut(tile);
                            runtime.state = LoadState::Loaded;
                            runtime.failures = 0;
                            self.stats.tilesets_attached += 1;
                            report.loaded += 1;
                        }
                        Err(e) => self.record_failure(tile, TileError::Parse(e), report),
                    }
                }
                Completion::Failed { error, .. } => self.record_failure(tile, error, report),
                Completion::Cancelled { .. } => {}
            }
        }
    }

    fn content_uri(&self, tile: TileId) -> String {
        self.tileset.node(tile).content.as_ref().map(|c| c.uri.clone()).unwrap_or_default()
    }

    fn record_failure(&mut self, tile: TileId, error: TileError, report: &mut FrameReport) {
        log::warn!("Failed to load {} for {} ({}): {}", self.content_uri(tile), tile, error.kind(), error);
        self.count_failure(tile, &error);
        self.tileset.set_load_state(tile, LoadState::Failed);
        report.failed += 1;
    }

    /// Bump the failure count and schedule the next attempt
    fn count_failure(&mut self, tile: TileId, error: &TileError) {
        let max_retries = self.config.max_retries;
        let retry_at = self.frame.saturating_add(self.config.retry_backoff_frames);
        let runtime = self.tileset.runtime_mut(tile);
        runtime.failures = runtime.failures.saturating_add(1);
        runtime.retry_at_frame = retry_at;
        // A malformed document will not get better by asking again
        if matches!(error, TileError::Parse(_)) {
            runtime.failures = runtime.failures.max(max_retries);
        }
    }

    fn issue_requests(&mut self, requests: &[TileRequest], report: &mut FrameReport) {
        let mut wanted = HashSet::with_capacity(requests.len());
        for request in requests {
            wanted.insert(request.tile);
            if let Some(pending) = self.pending.get(request.tile).copied() {
                if pending.cancelled {
                    self.pending.revive(request.tile);
                }
                if self.pipeline.reprioritize(pending.handle, request.priority) {
                    report.reprioritized += 1;
                }
                continue;
            }

            let Some(content) = self.tileset.node(request.tile).content.clone() else {
                continue;
            };
            let handle = self.pipeline.submit(request.tile, content, request.priority);
            self.pending.insert(request.tile, handle);
            self.tileset.set_load_state(request.tile, LoadState::Pending);
            report.requested += 1;
        }

        let unwanted: Vec<_> = self
            .pending
            .iter()
            .filter(|(tile, pending)| !pending.cancelled && !wanted.contains(tile))
            .map(|(tile, pending)| (tile, pending.handle))
            .collect();
        for (tile, handle) in unwanted {
            if self.pipeline.cancel(handle) {
                self.pending.remove(tile);
                let runtime = self.tileset.runtime_mut(tile);
                runtime.state = if runtime.failures > 0 { LoadState::Failed } else { LoadState::Unloaded };
            } else {
                // Already running; its result is dropped when it arrives
                self.pending.mark_cancelled(tile);
            }
            report.cancelled += 1;
        }
    }

    fn rebuild_debug_lines(&mut self) {
        self.debug_lines.clear();
        if !self.config.display_bounds_debug {
            return;
        }
        for &id in &self.active {
            let node = self.tileset.node(id);
            push_outline(&mut self.debug_lines, &node.bounds, &self.root_transform, depth_color(node.depth));
        }
    }

    fn publish(&mut self, frame: u64) {
        let tiles: Vec<ActiveTile<'_, P>> = self
            .active
            .iter()
            .filter_map(|&id| {
                self.cache.get(id).map(|payload| ActiveTile {
                    id,
                    payload,
                    transform: self.root_transform * self.tileset.node(id).transform,
                })
            })
            .collect();
        self.sink.publish(&PublishedFrame { frame, tiles: &tiles, debug_lines: &self.debug_lines });
    }

    /// Tiles displayed by the last update, in traversal order
    pub fn active_tiles(&self) -> impl Iterator<Item = (TileId, &P)> + '_ {
        self.active.iter().filter_map(|&id| self.cache.get(id).map(|payload| (id, payload)))
    }

    pub fn active_ids(&self) -> &[TileId] {
        &self.active
    }

    /// World-space bounds of the whole tileset, loaded or not
    pub fn bounds(&self) -> Aabb {
        self.tileset.total_bounds().transformed(&self.root_transform)
    }

    /// Active tiles whose bounds the ray hits, nearest first
    ///
    /// Distances are in world units from the ray origin.
    pub fn raycast(&self, ray: &Ray) -> Vec<(TileId, f64)> {
        let local = ray.transform(&self.root_transform.inverse());
        let mut hits: Vec<(TileId, f64)> = self
            .active
            .iter()
            .filter_map(|&id| {
                let t = self.tileset.bounds(id).ray_intersection(&local)?;
                let hit = self.root_transform.transform_point3(local.at(t));
                Some((id, hit.distance(ray.origin)))
            })
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits
    }

    /// Place the tileset in the world
    pub fn set_root_transform(&mut self, transform: DMat4) {
        self.root_transform = transform;
    }

    pub fn root_transform(&self) -> &DMat4 {
        &self.root_transform
    }

    /// Block until no request is queued or running
    ///
    /// Completions are still only applied by the next [`update`](Self::update).
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.pipeline.wait_idle(timeout)
    }

    pub fn tileset(&self) -> &Tileset {
        &self.tileset
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResidentCache<P> {
        &self.cache
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn stats(&self) -> &StreamingStats {
        &self.stats
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Stop loading and tear down every resident payload
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.pipeline.shutdown();
        for (tile, _) in self.pending.iter() {
            if self.tileset.load_state(tile) == LoadState::Pending {
                self.tileset.set_load_state(tile, LoadState::Unloaded);
            }
        }
        self.pending.clear();
        let sink = &mut self.sink;
        self.cache.clear(|id, payload| sink.dispose(id, payload));
        self.active.clear();
        self.debug_lines.clear();
        log::info!("Streamer shut down after {} frames", self.stats.frames);
    }
}

impl<P: Send + 'static, S: RenderSink<P>> Drop for TilesetStreamer<P, S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
