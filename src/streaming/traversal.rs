//! Per-frame tile selection
//!
//! Walks the tree depth-first from the root, culling against the view
//! frustum and refining wherever the screen-space error is above the
//! threshold. The walk never does I/O: it reports which resident tiles to
//! display and which tiles it wants loaded, and the caller acts on both.
//!
//! REPLACE refinement never regresses: a parent whose content is resident
//! stays on screen until every visible tile below it is ready to take over.
//! A refining parent's own content is only fetched when a tile below it has
//! failed for good and would otherwise leave a hole.

use crate::core::Camera;
use crate::core::types::{DMat4, DVec3};
use crate::math::Frustum;
use crate::tileset::{LoadState, Refinement, TileId, TileRuntime, Tileset};

use super::config::StreamingConfig;
use super::lod::{LodConfig, screen_space_error};
use super::priority::TilePriority;

/// Content the traversal wants loaded
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileRequest {
    pub tile: TileId,
    pub priority: TilePriority,
}

/// Result of one traversal
#[derive(Clone, Debug, Default)]
pub struct TraversalOutput {
    /// Resident tiles to display, in traversal order
    pub active: Vec<TileId>,
    /// Resident tiles withheld while their parent covers them
    pub retained: Vec<TileId>,
    pub requests: Vec<TileRequest>,
    pub visited: usize,
    pub culled: usize,
    /// Nodes where the depth guard stopped refinement
    pub guard_trips: usize,
}

/// Tile selection parameters
#[derive(Clone, Copy, Debug)]
pub struct TraversalEngine {
    pub lod: LodConfig,
    /// Failed attempts after which a tile is no longer requested
    pub max_retries: u32,
}

impl TraversalEngine {
    pub fn new(lod: LodConfig, max_retries: u32) -> Self {
        Self { lod, max_retries }
    }

    pub fn from_config(config: &StreamingConfig) -> Self {
        Self::new(LodConfig::from_config(config), config.max_retries)
    }

    /// Select tiles for one frame
    ///
    /// # Arguments
    /// * `tileset` - Tree to walk
    /// * `camera` - World-space camera
    /// * `root_transform` - Places the tileset in the world
    /// * `frame` - Current frame, for retry back-off
    /// * `is_resident` - Whether a tile's content is in the cache
    pub fn traverse(
        &self,
        tileset: &Tileset,
        camera: &Camera,
        root_transform: &DMat4,
        frame: u64,
        is_resident: impl Fn(TileId) -> bool,
    ) -> TraversalOutput {
        // Cull and measure in tileset space instead of moving every volume
        let frustum = Frustum::from_view_projection(&(camera.view_projection() * *root_transform));
        let camera_position = root_transform.inverse().transform_point3(camera.position);

        let mut walker = Walker {
            engine: self,
            tileset,
            camera,
            frustum,
            camera_position,
            frame,
            is_resident,
            out: TraversalOutput::default(),
        };
        walker.visit(tileset.root(), false);

        log::trace!(
            "Traversal: {} visited, {} culled, {} active, {} requested",
            walker.out.visited,
            walker.out.culled,
            walker.out.active.len(),
            walker.out.requests.len()
        );
        walker.out
    }

    /// True if a tile without resident content should be requested
    pub fn wants_request(&self, runtime: &TileRuntime, frame: u64) -> bool {
        match runtime.state {
            LoadState::Unloaded | LoadState::Pending => true,
            LoadState::Loaded => false,
            LoadState::Failed => runtime.failures < self.max_retries && frame >= runtime.retry_at_frame,
        }
    }

    /// True once a tile has used up its retries
    pub fn gave_up(&self, runtime: &TileRuntime) -> bool {
        runtime.state == LoadState::Failed && runtime.failures >= self.max_retries
    }
}

/// How far a visible subtree is from being displayable
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Readiness {
    Ready,
    /// Content is on its way or will be retried
    Loading,
    /// Some content below will never arrive
    Blocked,
}

struct Walker<'a, R> {
    engine: &'a TraversalEngine,
    tileset: &'a Tileset,
    camera: &'a Camera,
    frustum: Frustum,
    camera_position: DVec3,
    frame: u64,
    is_resident: R,
    out: TraversalOutput,
}

impl<R: Fn(TileId) -> bool> Walker<'_, R> {
    /// Visit a node and report whether its visible subtree can be displayed
    ///
    /// `covered` is set when a resident REPLACE ancestor is on screen in
    /// this node's place.
    fn visit(&mut self, id: TileId, covered: bool) -> Readiness {
        let node = self.tileset.node(id);
        self.out.visited += 1;

        if !node.bounds.intersects_frustum(&self.frustum) {
            self.out.culled += 1;
            return Readiness::Ready;
        }

        let sse = screen_space_error(
            node.geometric_error,
            &node.bounds,
            self.camera_position,
            self.camera,
            self.engine.lod.min_camera_distance,
        );
        let mut refine = self.engine.lod.needs_refinement(sse) && !node.is_leaf();
        if refine && node.depth >= self.engine.lod.max_depth {
            self.out.guard_trips += 1;
            log::debug!("Depth guard stopped refinement at {} (depth {})", id, node.depth);
            refine = false;
        }

        let resident = node.has_renderable_content() && (self.is_resident)(id);
        let priority = TilePriority::new(covered, sse, node.depth);

        if !refine {
            return self.display(id, resident, priority);
        }

        match node.refine {
            Refinement::Add => {
                let mut readiness = self.display(id, resident, priority);
                for child in node.child_ids() {
                    readiness = readiness.max(self.visit(child, covered));
                }
                readiness
            }
            Refinement::Replace => {
                let mark = self.out.active.len();
                let mut children = Readiness::Ready;
                for child in node.child_ids() {
                    children = children.max(self.visit(child, covered || resident));
                }
                match children {
                    Readiness::Ready => Readiness::Ready,
                    _ if resident => {
                        // Hold the parent until the whole visible group can swap in
                        let withheld: Vec<TileId> = self.out.active.drain(mark..).collect();
                        self.out.retained.extend(withheld);
                        self.out.active.push(id);
                        Readiness::Ready
                    }
                    Readiness::Loading => Readiness::Loading,
                    // A tile below is gone for good: fall back to this one
                    Readiness::Blocked if node.has_renderable_content() => self.display(id, false, priority),
                    Readiness::Blocked => Readiness::Blocked,
                }
            }
        }
    }

    /// Show a node's own content, requesting it when missing
    fn display(&mut self, id: TileId, resident: bool, priority: TilePriority) -> Readiness {
        let node = self.tileset.node(id);
        if resident {
            self.out.active.push(id);
            return Readiness::Ready;
        }
        let needs_content = node.has_renderable_content() || node.is_unexpanded_external();
        if !needs_content {
            return Readiness::Ready;
        }
        let runtime = self.tileset.runtime(id);
        if self.engine.wants_request(runtime, self.frame) {
            self.out.requests.push(TileRequest { tile: id, priority });
        }
        if self.engine.gave_up(runtime) { Readiness::Blocked } else { Readiness::Loading }
    }
}
