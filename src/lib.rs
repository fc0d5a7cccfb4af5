//! Tilestream - streaming of hierarchical 3D tilesets
//!
//! Loads a tileset document into an arena of tiles, then, every frame,
//! selects the tiles whose detail matches the camera, fetches and decodes
//! their content in the background and keeps resident memory within a
//! budget.

pub mod core;
pub mod math;
pub mod tileset;
pub mod streaming;

pub use crate::core::{Camera, Error, ParseError, Projection, Result, TileError};
pub use crate::streaming::{RenderSink, StreamingConfig, TilesetStreamer};
pub use crate::tileset::{TileId, Tileset};
