//! Tile nodes and their runtime load state

use std::fmt;
use std::ops::Range;

use crate::core::types::DMat4;
use crate::math::BoundingVolume;

/// Stable arena index of a tile
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub u32);

impl TileId {
    /// The root of the main document is always the first node
    pub const ROOT: TileId = TileId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile#{}", self.0)
    }
}

/// Index of a source document (the main tileset or an external one)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DocumentId(pub u32);

/// How a tile's children relate to its own content
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Refinement {
    /// Children are drawn in addition to the parent
    Add,
    /// Children are drawn instead of the parent
    Replace,
}

impl Refinement {
    /// Parse the document spelling, case-insensitively
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("add") {
            Some(Refinement::Add)
        } else if value.eq_ignore_ascii_case("replace") {
            Some(Refinement::Replace)
        } else {
            None
        }
    }
}

/// Payload type inferred from a content reference
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// Another tileset document, expanded in place
    Tileset,
    /// Batched 3D model (`.b3dm`)
    Batched,
    /// Instanced 3D model (`.i3dm`)
    Instanced,
    /// Point cloud (`.pnts`)
    PointCloud,
    /// Composite of other tiles (`.cmpt`)
    Composite,
    /// glTF asset (`.glb` / `.gltf`)
    Gltf,
    /// Anything else, keyed by lowercase extension
    Other(String),
}

impl ContentKind {
    pub fn from_uri(uri: &str) -> Self {
        let path = uri.split(['?', '#']).next().unwrap_or(uri);
        let file = path.rsplit('/').next().unwrap_or(path);
        let extension = file
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "json" => ContentKind::Tileset,
            "b3dm" => ContentKind::Batched,
            "i3dm" => ContentKind::Instanced,
            "pnts" => ContentKind::PointCloud,
            "cmpt" => ContentKind::Composite,
            "glb" | "gltf" => ContentKind::Gltf,
            _ => ContentKind::Other(extension),
        }
    }

    pub fn is_tileset(&self) -> bool {
        matches!(self, ContentKind::Tileset)
    }
}

/// Reference to a tile's external payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentRef {
    /// URI resolved against the referencing document
    pub uri: String,
    pub kind: ContentKind,
}

impl ContentRef {
    pub fn new(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let kind = ContentKind::from_uri(&uri);
        Self { uri, kind }
    }
}

/// Runtime load state of a tile's content
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Unloaded,
    Pending,
    Loaded,
    Failed,
}

/// Mutable per-tile bookkeeping, kept apart from the immutable tree
#[derive(Clone, Debug, Default)]
pub struct TileRuntime {
    pub state: LoadState,
    /// Failed attempts so far
    pub failures: u32,
    /// Earliest frame at which a failed tile may be requested again
    pub retry_at_frame: u64,
}

/// One node of the tile hierarchy
#[derive(Clone, Debug)]
pub struct TileNode {
    pub id: TileId,
    pub parent: Option<TileId>,
    /// Contiguous arena range holding the children
    pub children: Range<u32>,
    /// World-space bounds of the tileset frame
    pub bounds: BoundingVolume,
    pub geometric_error: f64,
    pub refine: Refinement,
    pub content: Option<ContentRef>,
    /// Accumulated tile transform
    pub transform: DMat4,
    pub depth: u32,
    pub document: DocumentId,
}

impl TileNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn child_ids(&self) -> impl Iterator<Item = TileId> + use<> {
        self.children.clone().map(TileId)
    }

    /// True if the content is a drawable payload (not a nested tileset)
    pub fn has_renderable_content(&self) -> bool {
        self.content.as_ref().is_some_and(|c| !c.kind.is_tileset())
    }

    /// True for an external tileset reference whose subtree is not attached
    pub fn is_unexpanded_external(&self) -> bool {
        self.is_leaf() && self.content.as_ref().is_some_and(|c| c.kind.is_tileset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_kind_from_uri() {
        assert_eq!(ContentKind::from_uri("tiles/0/0.b3dm"), ContentKind::Batched);
        assert_eq!(ContentKind::from_uri("sub/tileset.JSON?v=2"), ContentKind::Tileset);
        assert_eq!(ContentKind::from_uri("a.glb#frag"), ContentKind::Gltf);
        assert_eq!(ContentKind::from_uri("points.pnts"), ContentKind::PointCloud);
        assert_eq!(ContentKind::from_uri("dir.v2/noext"), ContentKind::Other(String::new()));
        assert_eq!(ContentKind::from_uri("mesh.obj"), ContentKind::Other("obj".into()));
    }

    #[test]
    fn test_refinement_parse() {
        assert_eq!(Refinement::parse("ADD"), Some(Refinement::Add));
        assert_eq!(Refinement::parse("replace"), Some(Refinement::Replace));
        assert_eq!(Refinement::parse("merge"), None);
    }
}
