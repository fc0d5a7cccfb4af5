use criterion::{criterion_group, criterion_main, Criterion, black_box};
use serde_json::{json, Value};

use tilestream::core::types::{DMat4, DVec3};
use tilestream::streaming::{
    CacheBudget, LodConfig, RequestHandle, RequestQueue, ResidentCache, TilePriority, TraversalEngine,
};
use tilestream::{Camera, TileId, Tileset};

fn quadtree_tile(cx: f64, cy: f64, half: f64, depth: u32, levels: u32) -> Value {
    let leaf = depth + 1 >= levels;
    let children: Vec<Value> = if leaf {
        Vec::new()
    } else {
        let q = half / 2.0;
        [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)]
            .iter()
            .map(|(dx, dy)| quadtree_tile(cx + dx * q, cy + dy * q, q, depth + 1, levels))
            .collect()
    };
    json!({
        "boundingVolume": { "box": [cx, cy, 0.0, half, 0.0, 0.0, 0.0, half, 0.0, 0.0, 0.0, 1.0] },
        "geometricError": if leaf { 0.0 } else { half / 4.0 },
        "content": { "uri": format!("{depth}/{cx}_{cy}.b3dm") },
        "children": children,
    })
}

/// 7 levels, 5461 tiles
fn quadtree(levels: u32) -> Tileset {
    let document = json!({
        "asset": { "version": "1.1" },
        "geometricError": 4096.0,
        "root": quadtree_tile(0.0, 0.0, 4096.0, 0, levels),
    });
    let bytes = serde_json::to_vec(&document).unwrap();
    Tileset::from_json(&bytes, "tileset.json").unwrap()
}

fn low_oblique_camera() -> Camera {
    let mut camera = Camera::new(DVec3::new(-3000.0, -3000.0, 400.0), 60.0, 1920.0, 1080.0);
    camera.far = 1.0e6;
    camera.face(DVec3::new(0.0, 0.0, 0.0), DVec3::Z);
    camera
}

fn bench_traverse_cold(c: &mut Criterion) {
    let tileset = quadtree(7);
    let camera = low_oblique_camera();
    let engine = TraversalEngine::new(LodConfig::default(), 3);

    c.bench_function("traverse_quadtree_cold", |b| {
        b.iter(|| {
            engine.traverse(black_box(&tileset), black_box(&camera), &DMat4::IDENTITY, 1, |_| false)
        });
    });
}

fn bench_traverse_resident(c: &mut Criterion) {
    let tileset = quadtree(7);
    let camera = low_oblique_camera();
    let engine = TraversalEngine::new(LodConfig::default(), 3);

    c.bench_function("traverse_quadtree_all_resident", |b| {
        b.iter(|| {
            let out = engine.traverse(black_box(&tileset), black_box(&camera), &DMat4::IDENTITY, 1, |_| true);
            black_box(out.active.len())
        });
    });
}

fn bench_request_queue(c: &mut Criterion) {
    c.bench_function("request_queue_push_update_pop_1000", |b| {
        b.iter(|| {
            let mut queue = RequestQueue::new();
            for i in 0..1000u64 {
                let priority = TilePriority::new(i % 3 == 0, (i % 97) as f64, (i % 11) as u32);
                queue.push(RequestHandle(i), priority, i);
            }
            // Camera moved: half the requests change priority
            for i in (0..1000u64).step_by(2) {
                queue.update(RequestHandle(i), TilePriority::new(false, (i % 13) as f64, 0));
            }
            let mut popped = 0;
            while let Some((_, job)) = queue.pop() {
                popped += job;
            }
            black_box(popped)
        });
    });
}

fn bench_evict_to_budget(c: &mut Criterion) {
    let budget = CacheBudget::new(512 * 1024);

    c.bench_function("evict_4096_tiles_to_budget", |b| {
        b.iter_batched(
            || {
                let mut cache = ResidentCache::new();
                for i in 0..4096u32 {
                    let size = 1024 + (i as usize % 7) * 256;
                    cache.insert(TileId(i), i, size, u64::from(i % 64));
                }
                for i in (0..4096u32).step_by(16) {
                    cache.mark_active(TileId(i), 64);
                }
                cache
            },
            |mut cache| {
                let report = cache.evict_to(black_box(&budget), |_, payload| {
                    black_box(payload);
                });
                black_box(report.evicted)
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_traverse_cold,
    bench_traverse_resident,
    bench_request_queue,
    bench_evict_to_budget,
);
criterion_main!(benches);
