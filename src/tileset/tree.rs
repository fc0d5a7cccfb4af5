//! Arena-backed tile tree
//!
//! Nodes live in a single vector addressed by [`TileId`]. Children of a node
//! occupy a contiguous index range, allocated breadth-first while parsing.
//! External tilesets are appended at the end of the arena and hooked into
//! their parent by setting its child range, so attaching a subtree never
//! moves existing nodes.

use std::collections::VecDeque;
use std::ops::Range;

use crate::core::ParseError;
use crate::core::types::{DMat4, DVec3};
use crate::math::{Aabb, BoundingSphere, BoundingVolume, OrientedBox, Region};

use super::document::{BoundingVolumeDocument, TileDocument, TilesetDocument};
use super::node::{ContentRef, DocumentId, LoadState, Refinement, TileId, TileNode, TileRuntime};
use super::uri::resolve_uri;

/// A document the tree was built from
#[derive(Clone, Debug)]
pub struct SourceDocument {
    pub uri: String,
    /// Document holding the tile that referenced this one
    pub parent: Option<DocumentId>,
    pub version: Option<String>,
}

/// Tile hierarchy plus per-tile runtime state
#[derive(Debug)]
pub struct Tileset {
    nodes: Vec<TileNode>,
    runtime: Vec<TileRuntime>,
    documents: Vec<SourceDocument>,
    /// Roots of attached external tilesets
    external_roots: Vec<TileId>,
    /// Document-level geometric error of the main tileset
    geometric_error: f64,
}

impl Tileset {
    /// Build the tree for a parsed document located at `uri`.
    ///
    /// Nothing is retained if any tile fails validation.
    pub fn load(document: &TilesetDocument, uri: &str) -> Result<Self, ParseError> {
        let geometric_error = document.geometric_error.ok_or_else(|| ParseError::MissingField {
            path: "tileset".into(),
            field: "geometricError",
        })?;
        validate_error("tileset", geometric_error)?;
        let root = document.root.as_ref().ok_or_else(|| ParseError::MissingField {
            path: "tileset".into(),
            field: "root",
        })?;

        let documents = vec![SourceDocument {
            uri: uri.to_string(),
            parent: None,
            version: document.asset.as_ref().map(|a| a.version.clone()),
        }];
        let chain = vec![uri.to_string()];
        let builder = TreeBuilder {
            first_id: 0,
            document: DocumentId(0),
            base_uri: uri,
            document_chain: &chain,
        };
        let nodes = builder.build(root, None, DMat4::IDENTITY, Refinement::Replace, 0)?;

        log::info!(
            "Loaded tileset {} (version {}, {} tiles)",
            uri,
            documents[0].version.as_deref().unwrap_or("unknown"),
            nodes.len()
        );

        Ok(Self {
            runtime: vec![TileRuntime::default(); nodes.len()],
            nodes,
            documents,
            external_roots: Vec::new(),
            geometric_error,
        })
    }

    /// Parse JSON bytes and build the tree
    pub fn from_json(bytes: &[u8], uri: &str) -> Result<Self, ParseError> {
        let document = TilesetDocument::from_slice(bytes)?;
        Self::load(&document, uri)
    }

    /// Attach an external tileset below `parent`.
    ///
    /// The subtree is validated completely before the arena is touched.
    /// Returns the arena range of the new nodes.
    pub fn attach_external(
        &mut self,
        parent: TileId,
        document: &TilesetDocument,
        uri: &str,
    ) -> Result<Range<u32>, ParseError> {
        let (parent_document, parent_transform, parent_refine, parent_depth) = {
            let node = &self.nodes[parent.index()];
            (node.document, node.transform, node.refine, node.depth)
        };
        let chain = self.document_chain(parent_document);
        if chain.iter().any(|u| u == uri) {
            return Err(ParseError::CyclicReference { uri: uri.to_string() });
        }
        let root = document.root.as_ref().ok_or_else(|| ParseError::MissingField {
            path: uri.to_string(),
            field: "root",
        })?;

        let mut chain = chain;
        chain.push(uri.to_string());
        let document_id = DocumentId(self.documents.len() as u32);
        let first_id = self.nodes.len() as u32;
        let builder = TreeBuilder {
            first_id,
            document: document_id,
            base_uri: uri,
            document_chain: &chain,
        };
        let subtree = builder.build(
            root,
            Some(parent),
            parent_transform,
            parent_refine,
            parent_depth + 1,
        )?;

        let range = first_id..first_id + subtree.len() as u32;
        self.documents.push(SourceDocument {
            uri: uri.to_string(),
            parent: Some(parent_document),
            version: document.asset.as_ref().map(|a| a.version.clone()),
        });
        self.runtime.extend(std::iter::repeat_n(TileRuntime::default(), subtree.len()));
        self.nodes.extend(subtree);
        // The external root is the only child of the referencing tile
        self.nodes[parent.index()].children = first_id..first_id + 1;
        self.external_roots.push(TileId(first_id));

        log::info!("Attached external tileset {} below {} ({} tiles)", uri, parent, range.len());
        Ok(range)
    }

    /// URIs of a document and every document above it
    fn document_chain(&self, mut document: DocumentId) -> Vec<String> {
        let mut chain = Vec::new();
        loop {
            let source = &self.documents[document.0 as usize];
            chain.push(source.uri.clone());
            match source.parent {
                Some(parent) => document = parent,
                None => return chain,
            }
        }
    }

    pub fn root(&self) -> TileId {
        TileId::ROOT
    }

    /// Get a node by id
    ///
    /// Ids are only ever produced by this tileset, so an unknown id is a
    /// caller bug and panics.
    pub fn node(&self, id: TileId) -> &TileNode {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: TileId) -> Option<&TileNode> {
        self.nodes.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[TileNode] {
        &self.nodes
    }

    pub fn children(&self, id: TileId) -> &[TileNode] {
        let range = &self.nodes[id.index()].children;
        &self.nodes[range.start as usize..range.end as usize]
    }

    /// Static bounds of a tile, available whether or not it is loaded
    pub fn bounds(&self, id: TileId) -> &BoundingVolume {
        &self.nodes[id.index()].bounds
    }

    /// Union of the root bounds and every attached external tileset
    pub fn total_bounds(&self) -> Aabb {
        self.external_roots
            .iter()
            .fold(self.nodes[0].bounds.aabb(), |acc, id| acc.merged(&self.bounds(*id).aabb()))
    }

    pub fn geometric_error(&self) -> f64 {
        self.geometric_error
    }

    pub fn documents(&self) -> &[SourceDocument] {
        &self.documents
    }

    pub fn load_state(&self, id: TileId) -> LoadState {
        self.runtime[id.index()].state
    }

    pub fn set_load_state(&mut self, id: TileId, state: LoadState) {
        self.runtime[id.index()].state = state;
    }

    pub fn runtime(&self, id: TileId) -> &TileRuntime {
        &self.runtime[id.index()]
    }

    pub fn runtime_mut(&mut self, id: TileId) -> &mut TileRuntime {
        &mut self.runtime[id.index()]
    }
}

fn validate_error(path: &str, value: f64) -> Result<(), ParseError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ParseError::GeometricError { path: path.to_string(), value })
    }
}

/// Builds one document's subtree into a scratch vector
struct TreeBuilder<'a> {
    first_id: u32,
    document: DocumentId,
    base_uri: &'a str,
    /// URIs that may not be referenced again from this subtree
    document_chain: &'a [String],
}

impl TreeBuilder<'_> {
    fn build(
        &self,
        root: &TileDocument,
        parent: Option<TileId>,
        parent_transform: DMat4,
        parent_refine: Refinement,
        depth: u32,
    ) -> Result<Vec<TileNode>, ParseError> {
        let mut nodes = Vec::new();
        let mut explicit_bounds = Vec::new();

        let (node, bounds) = self.make_node(root, "root".into(), TileId(self.first_id), parent, parent_transform, parent_refine, depth)?;
        nodes.push(node);
        explicit_bounds.push(bounds);

        let mut queue: VecDeque<(&TileDocument, String)> = VecDeque::new();
        queue.push_back((root, "root".into()));
        let mut local = 0usize;

        while let Some((tile, path)) = queue.pop_front() {
            let id = TileId(self.first_id + local as u32);
            let start = self.first_id + nodes.len() as u32;
            let (transform, refine, child_depth) = {
                let node = &nodes[local];
                (node.transform, node.refine, node.depth + 1)
            };

            for (i, child) in tile.children.iter().enumerate() {
                let child_path = format!("{path}.children[{i}]");
                let child_id = TileId(self.first_id + nodes.len() as u32);
                let (node, bounds) = self.make_node(child, child_path.clone(), child_id, Some(id), transform, refine, child_depth)?;
                nodes.push(node);
                explicit_bounds.push(bounds);
                queue.push_back((child, child_path));
            }

            nodes[local].children = start..self.first_id + nodes.len() as u32;
            local += 1;
        }

        // Children always follow their parent, so a reverse sweep sees every
        // child before the tile that needs its union.
        for local in (0..nodes.len()).rev() {
            if let Some(bounds) = explicit_bounds[local].take() {
                nodes[local].bounds = bounds;
                continue;
            }
            let range = nodes[local].children.clone();
            if range.is_empty() {
                return Err(ParseError::MissingField {
                    path: format!("{}#{}", self.base_uri, nodes[local].id),
                    field: "boundingVolume",
                });
            }
            let union = range
                .map(|c| nodes[(c - self.first_id) as usize].bounds.aabb())
                .fold(Aabb::EMPTY, |acc, b| acc.merged(&b));
            nodes[local].bounds = BoundingVolume::from_aabb(&union);
        }

        Ok(nodes)
    }

    #[allow(clippy::too_many_arguments)]
    fn make_node(
        &self,
        tile: &TileDocument,
        path: String,
        id: TileId,
        parent: Option<TileId>,
        parent_transform: DMat4,
        parent_refine: Refinement,
        depth: u32,
    ) -> Result<(TileNode, Option<BoundingVolume>), ParseError> {
        let geometric_error = tile.geometric_error.ok_or_else(|| ParseError::MissingField {
            path: path.clone(),
            field: "geometricError",
        })?;
        validate_error(&path, geometric_error)?;

        let refine = match tile.refine.as_deref() {
            Some(value) => Refinement::parse(value).ok_or_else(|| ParseError::Refinement {
                path: path.clone(),
                value: value.to_string(),
            })?,
            None => parent_refine,
        };

        let transform = match &tile.transform {
            Some(values) => {
                let array: [f64; 16] = values
                    .as_slice()
                    .try_into()
                    .map_err(|_| ParseError::Transform { path: path.clone() })?;
                if array.iter().any(|v| !v.is_finite()) {
                    return Err(ParseError::Transform { path });
                }
                parent_transform * DMat4::from_cols_array(&array)
            }
            None => parent_transform,
        };

        let bounds = tile
            .bounding_volume
            .as_ref()
            .map(|bv| parse_bounding_volume(bv, &path, &transform))
            .transpose()?;

        let content = match tile.content.as_ref().and_then(|c| c.reference()) {
            Some(reference) => {
                let content = ContentRef::new(resolve_uri(self.base_uri, reference));
                if content.kind.is_tileset() && self.document_chain.contains(&content.uri) {
                    return Err(ParseError::CyclicReference { uri: content.uri });
                }
                Some(content)
            }
            None => None,
        };

        let node = TileNode {
            id,
            parent,
            children: 0..0,
            // Placeholder until the bounds pass resolves implicit volumes
            bounds: BoundingVolume::from_aabb(&Aabb::EMPTY),
            geometric_error,
            refine,
            content,
            transform,
            depth,
            document: self.document,
        };
        Ok((node, bounds))
    }
}

fn parse_bounding_volume(
    volume: &BoundingVolumeDocument,
    path: &str,
    transform: &DMat4,
) -> Result<BoundingVolume, ParseError> {
    let malformed = |reason: &str| ParseError::BoundingVolume {
        path: path.to_string(),
        reason: reason.to_string(),
    };
    let check_finite = |values: &[f64]| {
        if values.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(malformed("non-finite value"))
        }
    };

    if let Some(values) = &volume.obb {
        let array: [f64; 12] = values
            .as_slice()
            .try_into()
            .map_err(|_| malformed("box needs 12 numbers"))?;
        check_finite(&array)?;
        return Ok(BoundingVolume::Box(OrientedBox::from_array(array).transformed(transform)));
    }
    if let Some(values) = &volume.sphere {
        let [x, y, z, radius]: [f64; 4] = values
            .as_slice()
            .try_into()
            .map_err(|_| malformed("sphere needs 4 numbers"))?;
        check_finite(&[x, y, z, radius])?;
        if radius < 0.0 {
            return Err(malformed("negative sphere radius"));
        }
        let sphere = BoundingSphere::new(DVec3::new(x, y, z), radius);
        return Ok(BoundingVolume::Sphere(sphere.transformed(transform)));
    }
    if let Some(values) = &volume.region {
        let array: [f64; 6] = values
            .as_slice()
            .try_into()
            .map_err(|_| malformed("region needs 6 numbers"))?;
        let region = Region::from_array(array);
        region.validate().map_err(|reason| malformed(&reason))?;
        // Regions are geographic and ignore tile transforms
        return Ok(BoundingVolume::Box(region.to_oriented_box()));
    }
    Err(malformed("no box, sphere or region"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Tileset, ParseError> {
        Tileset::from_json(json.as_bytes(), "data/tileset.json")
    }

    const QUAD: &str = r#"{
        "asset": { "version": "1.0" },
        "geometricError": 200,
        "root": {
            "boundingVolume": { "box": [0,0,0, 100,0,0, 0,100,0, 0,0,10] },
            "geometricError": 100,
            "refine": "REPLACE",
            "content": { "uri": "root.b3dm" },
            "children": [
                { "boundingVolume": { "box": [-50,-50,0, 50,0,0, 0,50,0, 0,0,10] }, "geometricError": 10,
                  "content": { "uri": "0.b3dm" },
                  "children": [ { "boundingVolume": { "sphere": [-50,-50,0, 5] }, "geometricError": 0, "content": { "uri": "0/0.b3dm" } } ] },
                { "boundingVolume": { "box": [50,-50,0, 50,0,0, 0,50,0, 0,0,10] }, "geometricError": 10, "refine": "add",
                  "content": { "uri": "1.b3dm" } }
            ]
        }
    }"#;

    #[test]
    fn test_breadth_first_layout() {
        let tileset = parse(QUAD).unwrap();
        assert_eq!(tileset.len(), 4);
        let root = tileset.node(TileId::ROOT);
        assert_eq!(root.children, 1..3);
        assert_eq!(tileset.node(TileId(1)).children, 3..4);
        assert!(tileset.node(TileId(2)).is_leaf());
        assert_eq!(tileset.node(TileId(3)).parent, Some(TileId(1)));
        assert_eq!(tileset.node(TileId(3)).depth, 2);
    }

    #[test]
    fn test_refinement_inheritance_and_uris() {
        let tileset = parse(QUAD).unwrap();
        assert_eq!(tileset.node(TileId(1)).refine, Refinement::Replace);
        assert_eq!(tileset.node(TileId(2)).refine, Refinement::Add);
        assert_eq!(tileset.node(TileId(3)).content.as_ref().unwrap().uri, "data/0/0.b3dm");
        assert_eq!(tileset.load_state(TileId(3)), LoadState::Unloaded);
    }

    #[test]
    fn test_bounds_defined_for_every_node() {
        let tileset = parse(QUAD).unwrap();
        for node in tileset.nodes() {
            let aabb = tileset.bounds(node.id).aabb();
            assert!(!aabb.is_empty());
            assert!(aabb.min.is_finite() && aabb.max.is_finite());
        }
        let total = tileset.total_bounds();
        assert_eq!(total.min, DVec3::new(-100.0, -100.0, -10.0));
    }

    #[test]
    fn test_missing_volume_uses_children_union() {
        let json = r#"{
            "geometricError": 10,
            "root": {
                "geometricError": 5,
                "children": [
                    { "boundingVolume": { "sphere": [0,0,0,1] }, "geometricError": 0 },
                    { "boundingVolume": { "sphere": [10,0,0,1] }, "geometricError": 0 }
                ]
            }
        }"#;
        let tileset = parse(json).unwrap();
        let aabb = tileset.bounds(TileId::ROOT).aabb();
        assert_eq!(aabb.min, DVec3::new(-1.0, -1.0, -1.0));
        assert_eq!(aabb.max, DVec3::new(11.0, 1.0, 1.0));
    }

    #[test]
    fn test_leaf_without_volume_rejected() {
        let json = r#"{ "geometricError": 1, "root": { "geometricError": 0 } }"#;
        let err = parse(json).unwrap_err();
        assert!(matches!(err, ParseError::MissingField { field: "boundingVolume", .. }));
    }

    #[test]
    fn test_malformed_inputs_rejected() {
        let bad_box = r#"{ "geometricError": 1, "root": { "boundingVolume": { "box": [0,0,0] }, "geometricError": 0 } }"#;
        assert!(matches!(parse(bad_box), Err(ParseError::BoundingVolume { .. })));

        let negative = r#"{ "geometricError": 1, "root": { "boundingVolume": { "sphere": [0,0,0,1] }, "geometricError": -3 } }"#;
        assert!(matches!(parse(negative), Err(ParseError::GeometricError { .. })));

        let refine = r#"{ "geometricError": 1, "root": { "boundingVolume": { "sphere": [0,0,0,1] }, "geometricError": 0, "refine": "MERGE" } }"#;
        assert!(matches!(parse(refine), Err(ParseError::Refinement { .. })));

        let no_root = r#"{ "geometricError": 1 }"#;
        assert!(matches!(parse(no_root), Err(ParseError::MissingField { field: "root", .. })));

        let no_error = r#"{ "root": { "boundingVolume": { "sphere": [0,0,0,1] }, "geometricError": 0 } }"#;
        assert!(matches!(parse(no_error), Err(ParseError::MissingField { field: "geometricError", .. })));
    }

    #[test]
    fn test_self_reference_rejected() {
        let json = r#"{ "geometricError": 1, "root": {
            "boundingVolume": { "sphere": [0,0,0,1] }, "geometricError": 1,
            "content": { "uri": "tileset.json" } } }"#;
        assert!(matches!(parse(json), Err(ParseError::CyclicReference { .. })));
    }

    #[test]
    fn test_transform_applied_to_bounds() {
        let json = r#"{ "geometricError": 1, "root": {
            "transform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 100,0,0,1],
            "boundingVolume": { "sphere": [0,0,0,1] }, "geometricError": 0 } }"#;
        let tileset = parse(json).unwrap();
        assert_eq!(tileset.bounds(TileId::ROOT).center(), DVec3::new(100.0, 0.0, 0.0));
    }

    #[test]
    fn test_attach_external() {
        let json = r#"{ "geometricError": 100, "root": {
            "boundingVolume": { "sphere": [0,0,0,100] }, "geometricError": 50,
            "children": [ { "boundingVolume": { "sphere": [0,0,0,50] }, "geometricError": 20,
                            "content": { "uri": "sub/tileset.json" } } ] } }"#;
        let mut tileset = parse(json).unwrap();
        let external = TileId(1);
        assert!(tileset.node(external).is_unexpanded_external());

        let sub = TilesetDocument::from_slice(br#"{ "geometricError": 20, "root": {
            "boundingVolume": { "sphere": [0,0,0,40] }, "geometricError": 10,
            "children": [ { "boundingVolume": { "sphere": [5,0,0,5] }, "geometricError": 0,
                            "content": { "uri": "leaf.b3dm" } } ] } }"#).unwrap();
        let range = tileset.attach_external(external, &sub, "data/sub/tileset.json").unwrap();

        assert_eq!(range, 2..4);
        assert_eq!(tileset.node(external).children, 2..3);
        assert!(!tileset.node(external).is_unexpanded_external());
        let leaf = tileset.node(TileId(3));
        assert_eq!(leaf.content.as_ref().unwrap().uri, "data/sub/leaf.b3dm");
        assert_eq!(leaf.depth, 3);
        assert_eq!(tileset.load_state(TileId(3)), LoadState::Unloaded);
        assert_eq!(tileset.documents().len(), 2);
    }

    #[test]
    fn test_attach_external_cycle_rejected_without_changes() {
        let json = r#"{ "geometricError": 100, "root": {
            "boundingVolume": { "sphere": [0,0,0,100] }, "geometricError": 50,
            "content": { "uri": "sub.json" } } }"#;
        let mut tileset = parse(json).unwrap();
        let looping = TilesetDocument::from_slice(br#"{ "geometricError": 20, "root": {
            "boundingVolume": { "sphere": [0,0,0,40] }, "geometricError": 10,
            "content": { "uri": "tileset.json" } } }"#).unwrap();

        let err = tileset.attach_external(TileId::ROOT, &looping, "data/sub.json").unwrap_err();
        assert!(matches!(err, ParseError::CyclicReference { .. }));
        assert_eq!(tileset.len(), 1);
        assert!(tileset.node(TileId::ROOT).is_leaf());
    }
}
