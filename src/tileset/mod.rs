//! Tileset documents and the in-memory tile hierarchy

pub mod document;
pub mod node;
pub mod tree;
pub mod uri;

pub use document::{AssetInfo, BoundingVolumeDocument, ContentDocument, TileDocument, TilesetDocument};
pub use node::{ContentKind, ContentRef, DocumentId, LoadState, Refinement, TileId, TileNode, TileRuntime};
pub use tree::{SourceDocument, Tileset};
pub use uri::resolve_uri;
