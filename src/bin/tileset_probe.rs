//! Headless tileset probe. Streams a local tileset for an orbiting camera
//! and logs what gets selected, loaded and evicted.
//!
//! Usage: cargo run --release --bin tileset_probe -- <TILESET.JSON> [OPTIONS]
//!
//! Options:
//!   --config <FILE>      Streaming configuration JSON (default: built-in)
//!   --frames <N>         Frames to simulate (default: 120)
//!   --error <PX>         Override the screen-space error threshold
//!   --fit <SCALE>        Camera fit offset, below 1 moves closer (default: 1.0)
//!   --width <PX>         Viewport width (default: 1280)
//!   --height <PX>        Viewport height (default: 720)
//!   --z-up               Rotate a Z-up tileset into Y-up before viewing
//!   --debug-bounds       Build bounding box line lists each frame

use std::f64::consts::{FRAC_PI_2, TAU};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tilestream::core::logging;
use tilestream::core::types::{DMat4, DQuat, DVec3};
use tilestream::streaming::{BytesDecoder, Fetcher, FileFetcher, PublishedFrame, RenderSink};
use tilestream::{Camera, Error, StreamingConfig, TileId, Tileset, TilesetStreamer};

/// Counts what the streamer hands to the renderer
#[derive(Default)]
struct ProbeSink {
    frames: u64,
    last_tiles: usize,
    last_bytes: usize,
    last_debug_vertices: usize,
    disposed: u64,
}

impl RenderSink<Vec<u8>> for ProbeSink {
    fn publish(&mut self, frame: &PublishedFrame<'_, Vec<u8>>) {
        self.frames += 1;
        self.last_tiles = frame.tiles.len();
        self.last_bytes = frame.tiles.iter().map(|t| t.payload.len()).sum();
        self.last_debug_vertices = frame.debug_lines.len();
    }

    fn dispose(&mut self, tile: TileId, payload: Vec<u8>) {
        log::trace!("Disposed {} ({} bytes)", tile, payload.len());
        self.disposed += 1;
    }
}

fn main() {
    logging::init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> tilestream::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let tileset_path = args
        .get(1)
        .filter(|a| !a.starts_with("--"))
        .map(PathBuf::from)
        .ok_or_else(|| Error::Config("usage: tileset_probe <TILESET.JSON> [OPTIONS]".into()))?;

    let mut config = match parse_str_arg(&args, "--config") {
        Some(path) => StreamingConfig::load(Path::new(&path))?,
        None => StreamingConfig::default(),
    };
    if let Some(error) = parse_f64_arg(&args, "--error") {
        config.error_threshold = error;
    }
    if args.iter().any(|a| a == "--debug-bounds") {
        config.display_bounds_debug = true;
    }
    config.validate()?;

    let frames = parse_u64_arg(&args, "--frames").unwrap_or(120);
    let fit = parse_f64_arg(&args, "--fit").unwrap_or(1.0);
    let width = parse_f64_arg(&args, "--width").unwrap_or(1280.0);
    let height = parse_f64_arg(&args, "--height").unwrap_or(720.0);

    let root = tileset_path.parent().map(Path::to_path_buf).unwrap_or_default();
    let uri = tileset_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Config(format!("not a file: {}", tileset_path.display())))?;

    println!("=== Tilestream Probe ===");
    println!("Tileset: {}", tileset_path.display());
    println!("Frames:  {}", frames);
    println!("Error:   {} px", config.error_threshold);
    println!("Budget:  {} MiB", config.cache_byte_budget / (1024 * 1024));
    println!();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("tile-fetch")
        .build()?;
    let fetcher = Arc::new(FileFetcher::new(root));
    let bytes = runtime
        .block_on(fetcher.fetch(&uri, &config.fetch))
        .map_err(|e| Error::Streaming(e.to_string()))?;
    let tileset = Tileset::from_json(&bytes, &uri)?;
    println!("Tiles:   {} (before external expansion)", tileset.len());

    let mut streamer = TilesetStreamer::with_handle(
        runtime.handle(),
        tileset,
        config,
        fetcher,
        Arc::new(BytesDecoder),
        ProbeSink::default(),
    )?;
    if args.iter().any(|a| a == "--z-up") {
        streamer.set_root_transform(DMat4::from_rotation_x(-FRAC_PI_2));
    }

    let bounds = streamer.bounds();
    let center = bounds.center();
    let mut camera = Camera::new(center + DVec3::new(1.0, 1.0, 1.0), 60.0, width, height);
    camera.face(center, DVec3::Y);
    let distance = camera.fit_to_bounds(&bounds, fit);
    let offset = camera.position - center;
    println!("Bounds:  {:?} .. {:?}", bounds.min, bounds.max);
    println!("Camera:  {:.1} units from center", distance);
    println!();

    let start = Instant::now();
    for frame in 0..frames {
        let angle = TAU * frame as f64 / frames.max(1) as f64;
        camera.position = center + DQuat::from_rotation_y(angle) * offset;
        camera.face(center, DVec3::Y);

        let report = streamer.update(&camera);
        if !streamer.wait_idle(Duration::from_secs(30)) {
            log::warn!("Frame {}: loads still running after 30s", report.frame);
        }

        if frame % 10 == 0 || frame + 1 == frames {
            log::info!(
                "Frame {:>4}: {} active, {} requested, {} loaded, {} failed, {} evicted, {} KiB resident{}",
                report.frame,
                report.active,
                report.requested,
                report.loaded,
                report.failed,
                report.evicted,
                report.resident_bytes / 1024,
                if report.budget_exceeded { " (over budget)" } else { "" }
            );
        }
    }

    let sink = streamer.sink();
    let stats = streamer.stats();
    println!();
    println!("=== Summary ===");
    println!("Time:        {:.2}s", start.elapsed().as_secs_f64());
    println!("Tiles:       {}", streamer.tileset().len());
    println!("Requests:    {}", stats.requests);
    println!("Loads:       {}", stats.loads);
    println!("Failures:    {}", stats.failures);
    println!("Evictions:   {}", stats.evictions);
    println!("Cancelled:   {}", stats.cancellations);
    println!("External:    {}", stats.tilesets_attached);
    println!("Peak memory: {} KiB", stats.peak_resident_bytes / 1024);
    println!("Last frame:  {} tiles, {} KiB, {} debug vertices", sink.last_tiles, sink.last_bytes / 1024, sink.last_debug_vertices);
    println!("Published:   {} frames, {} disposals", sink.frames, sink.disposed);

    Ok(())
}

fn parse_f64_arg(args: &[String], flag: &str) -> Option<f64> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_u64_arg(args: &[String], flag: &str) -> Option<u64> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
