//! Serialized form of a tileset document
//!
//! Field names follow the 3D Tiles JSON layout. Numeric arrays are kept as
//! plain vectors so that arity problems surface as [`ParseError`]s with a
//! tile path instead of opaque serde messages.
//!
//! [`ParseError`]: crate::core::ParseError

use serde::{Deserialize, Serialize};

use crate::core::ParseError;

/// Top-level tileset document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TilesetDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<AssetInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometric_error: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<TileDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,
}

impl TilesetDocument {
    /// Parse a document from raw JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// `asset` block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tileset_version: Option<String>,
}

/// One tile of the document tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_volume: Option<BoundingVolumeDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometric_error: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TileDocument>,
    /// Column-major 4x4 matrix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Vec<f64>>,
}

/// `boundingVolume` block; the first present of box, sphere, region wins
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoundingVolumeDocument {
    #[serde(rename = "box", default, skip_serializing_if = "Option::is_none")]
    pub obb: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sphere: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Vec<f64>>,
}

/// `content` block; `url` is the pre-1.0 spelling of `uri`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ContentDocument {
    pub fn reference(&self) -> Option<&str> {
        self.uri.as_deref().or(self.url.as_deref())
    }
}
