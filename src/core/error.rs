//! Error types for tilestream
//!
//! Only [`Error`] ever reaches callers of the public API. [`TileError`] is
//! contained inside the streaming engine: a tile that fails to fetch or decode
//! is marked failed and the frame carries on with coarser content.

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("Tileset parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Streaming error: {0}")]
    Streaming(String),
}

/// A tileset document could not be turned into a tile tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("missing required field `{field}` at {path}")]
    MissingField { path: String, field: &'static str },

    #[error("malformed bounding volume at {path}: {reason}")]
    BoundingVolume { path: String, reason: String },

    #[error("invalid geometric error {value} at {path}")]
    GeometricError { path: String, value: f64 },

    #[error("unknown refinement mode `{value}` at {path}")]
    Refinement { path: String, value: String },

    #[error("malformed transform at {path}")]
    Transform { path: String },

    #[error("cyclic tileset reference to {uri}")]
    CyclicReference { uri: String },
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError::Json(err.to_string())
    }
}

/// Per-tile failure reported by the fetch/decode pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TileError {
    #[error("network error: {0}")]
    Network(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("external tileset error: {0}")]
    Parse(#[from] ParseError),
}

impl TileError {
    /// Short label used in logs and statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            TileError::Network(_) => "network",
            TileError::Decode(_) => "decode",
            TileError::Parse(_) => "parse",
        }
    }
}
