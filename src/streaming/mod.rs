//! Tile content streaming: selection, loading, caching and eviction

pub mod budget;
pub mod cache;
pub mod config;
pub mod debug;
pub mod fetch;
pub mod lod;
pub mod orchestrator;
pub mod pending;
pub mod pipeline;
pub mod priority;
pub mod traversal;

#[cfg(test)]
pub(crate) mod testing;

pub use budget::CacheBudget;
pub use cache::{EvictionReport, ResidentCache, ResidentEntry};
pub use config::{FetchOptions, RequestMode, StreamingConfig};
pub use debug::LineVertex;
pub use fetch::{BytesDecoder, Decoded, Decoder, FetchFuture, Fetcher, FileFetcher, LoadedContent};
pub use lod::{LodConfig, screen_space_error};
pub use orchestrator::{ActiveTile, FrameReport, PublishedFrame, RenderSink, StreamingStats, TilesetStreamer};
pub use pending::{PendingRequest, PendingTable, Resolution};
pub use pipeline::{Completion, FetchJob, FetchPipeline};
pub use priority::{RequestHandle, RequestQueue, TilePriority};
pub use traversal::{TileRequest, TraversalEngine, TraversalOutput};
