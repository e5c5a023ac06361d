//! Tile data model shared by the parser, the pipeline and the pool.

use std::collections::BTreeMap;
use std::sync::Arc;

use meshtile_decode::{AttributeArray, ElementType, IndexArray, Quantization};

use crate::transfer::TransferList;

/// Vertex positions.
pub const POSITION: &str = "POSITION";
/// Vertex normals.
pub const NORMAL: &str = "NORMAL";
/// First texture coordinate set.
pub const TEXCOORD_0: &str = "TEXCOORD_0";
/// First vertex color set.
pub const COLOR_0: &str = "COLOR_0";
/// Vertex tangents with handedness in `w`.
pub const TANGENT: &str = "TANGENT";
/// Prefix of per-vertex feature ID attributes (`_FEATURE_ID_0`, ...).
pub const FEATURE_ID_PREFIX: &str = "_FEATURE_ID_";

/// One named attribute stream of a primitive.
#[derive(Debug, Clone)]
pub struct AttributeBuffer {
    pub data: AttributeArray,
    /// Components per vertex.
    pub item_size: usize,
    /// Declared accessor type from the source metadata.
    pub element_type: ElementType,
    /// Present until the attribute has been decoded.
    pub quantization: Option<Quantization>,
}

impl AttributeBuffer {
    /// An unquantized attribute.
    #[must_use]
    pub fn new(data: impl Into<AttributeArray>, element_type: ElementType) -> Self {
        Self {
            data: data.into(),
            item_size: element_type.components(),
            element_type,
            quantization: None,
        }
    }

    #[must_use]
    pub fn quantized(mut self, quantization: Quantization) -> Self {
        self.quantization = Some(quantization);
        self
    }

    /// Number of vertices described by this attribute.
    #[must_use]
    pub fn count(&self) -> usize {
        if self.item_size == 0 {
            0
        } else {
            self.data.len() / self.item_size
        }
    }
}

/// One drawable sub-mesh.
#[derive(Debug, Clone, Default)]
pub struct PrimitiveRecord {
    pub attributes: BTreeMap<String, AttributeBuffer>,
    pub indices: Option<IndexArray>,
    pub material: Option<usize>,
    /// Extension JSON carried through untouched for metadata consumers.
    pub extensions: Option<serde_json::Value>,
}

impl PrimitiveRecord {
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, attribute: AttributeBuffer) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    #[must_use]
    pub fn with_indices(mut self, indices: impl Into<IndexArray>) -> Self {
        self.indices = Some(indices.into());
        self
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeBuffer> {
        self.attributes.get(name)
    }
}

/// Ordered primitives of one mesh.
#[derive(Debug, Clone, Default)]
pub struct MeshRecord {
    pub primitives: Vec<PrimitiveRecord>,
}

/// Output of the external mesh-format parser.
#[derive(Debug, Clone, Default)]
pub struct ParsedTile {
    /// Meshes keyed by tile-local mesh index.
    pub meshes: BTreeMap<usize, MeshRecord>,
    /// Texture images and metadata buffers. Not interpreted, only handed
    /// over with the response.
    pub sidecar_buffers: Vec<Arc<[u8]>>,
}

impl ParsedTile {
    #[must_use]
    pub fn with_mesh(mut self, index: usize, mesh: MeshRecord) -> Self {
        self.meshes.insert(index, mesh);
        self
    }
}

/// Counters describing what the pipeline did to a tile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub primitives: usize,
    /// Attributes replaced by a decoder.
    pub decoded_attributes: usize,
    /// Primitives whose normals were synthesized from positions.
    pub synthesized_normals: usize,
}

/// A fully decoded tile, ready to publish.
///
/// Buffers are not mutated once a tile is handed back to the caller.
#[derive(Debug, Clone, Default)]
pub struct DecodedTile {
    pub meshes: BTreeMap<usize, MeshRecord>,
    pub sidecar_buffers: Vec<Arc<[u8]>>,
    /// Every buffer handed over by this tile, each listed once.
    pub transferables: TransferList,
    pub stats: DecodeStats,
}

impl DecodedTile {
    #[must_use]
    pub fn primitive(&self, mesh: usize, primitive: usize) -> Option<&PrimitiveRecord> {
        self.meshes.get(&mesh)?.primitives.get(primitive)
    }
}
