//! In-memory fetch/decode collaborators for tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::Semaphore;

use crate::core::types::DVec3;
use crate::core::{Camera, TileError};
use crate::tileset::{ContentKind, Tileset};

use super::config::FetchOptions;
use super::fetch::{Decoded, Decoder, FetchFuture, Fetcher};

const OPEN: usize = 1 << 20;

/// Serves bytes from a map, optionally slowed down or held at a gate
pub struct MockFetcher {
    files: Mutex<HashMap<String, Vec<u8>>>,
    requested: Mutex<Vec<String>>,
    delay: Duration,
    gate: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            requested: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            gate: Arc::new(Semaphore::new(OPEN)),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Hold every fetch until [`resume`](Self::resume)
    pub fn paused(mut self) -> Self {
        self.gate = Arc::new(Semaphore::new(0));
        self
    }

    pub fn resume(&self) {
        self.gate.add_permits(OPEN);
    }

    pub fn insert(&self, uri: &str, bytes: &[u8]) {
        self.files.lock().unwrap().insert(uri.to_string(), bytes.to_vec());
    }

    pub fn remove(&self, uri: &str) {
        self.files.lock().unwrap().remove(uri);
    }

    /// URIs in the order their fetch started
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    pub fn request_count(&self, uri: &str) -> usize {
        self.requested.lock().unwrap().iter().filter(|u| *u == uri).count()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, uri: &str, _options: &FetchOptions) -> FetchFuture {
        self.requested.lock().unwrap().push(uri.to_string());
        let bytes = self.files.lock().unwrap().get(uri).cloned();
        let uri = uri.to_string();
        let delay = self.delay;
        let gate = Arc::clone(&self.gate);
        let active = Arc::clone(&self.active);
        let peak = Arc::clone(&self.peak);
        Box::pin(async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            active.fetch_sub(1, Ordering::SeqCst);
            bytes.ok_or_else(|| TileError::Network(format!("{uri}: not found")))
        })
    }
}

/// Decodes bytes as UTF-8; the literal `corrupt` fails
pub struct MockDecoder;

impl Decoder for MockDecoder {
    type Payload = String;

    fn decode(&self, bytes: &[u8], _kind: &ContentKind) -> Result<Decoded<String>, TileError> {
        if bytes == b"corrupt" {
            return Err(TileError::Decode("corrupt payload".into()));
        }
        let payload = String::from_utf8(bytes.to_vec()).map_err(|e| TileError::Decode(e.to_string()))?;
        Ok(Decoded { byte_size: payload.len(), payload })
    }
}

/// Square quadtree over `[-100, 100]^2` with `levels` levels
///
/// Children are listed row by row starting at the `-x, -y` quadrant, so the
/// first level below the root gets ids 1 to 4 in that order. Geometric error
/// halves per level starting at 64; leaves have none.
pub fn quadtree_tileset(levels: u32, refine: &str) -> Tileset {
    let mut root = quadtree_tile(0.0, 0.0, 100.0, 0, levels);
    root["refine"] = json!(refine);
    let document = json!({
        "asset": { "version": "1.1" },
        "geometricError": 128.0,
        "root": root,
    });
    let bytes = serde_json::to_vec(&document).unwrap();
    Tileset::from_json(&bytes, "tileset.json").unwrap()
}

fn quadtree_tile(cx: f64, cy: f64, half: f64, depth: u32, levels: u32) -> Value {
    let leaf = depth + 1 >= levels;
    let error = if leaf { 0.0 } else { 64.0 / f64::from(1u32 << depth) };
    let mut children = Vec::new();
    if !leaf {
        let quarter = half / 2.0;
        for dy in [-1.0, 1.0] {
            for dx in [-1.0, 1.0] {
                children.push(quadtree_tile(cx + dx * quarter, cy + dy * quarter, quarter, depth + 1, levels));
            }
        }
    }
    json!({
        "boundingVolume": { "box": [cx, cy, 0.0, half, 0.0, 0.0, 0.0, half, 0.0, 0.0, 0.0, 1.0] },
        "geometricError": error,
        "content": { "uri": format!("{depth}/{cx}_{cy}.b3dm") },
        "children": children,
    })
}

/// Camera at `position` looking straight down, 1000x1000 pixels
pub fn top_down_camera(position: DVec3) -> Camera {
    let mut camera = Camera::new(position, 60.0, 1000.0, 1000.0);
    camera.near = 0.1;
    camera.far = 1.0e6;
    camera.face(DVec3::new(position.x, position.y, 0.0), DVec3::Y);
    camera
}
