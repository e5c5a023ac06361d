//! Attribute decode pipeline.
//!
//! Runs inside a worker after the parser. Each primitive's attributes are
//! decoded in a fixed order, replaced in place, and their storage recorded
//! in the tile's transfer list:
//!
//! 1. `POSITION` - dequantized, 3 components
//! 2. `NORMAL` - octahedral decode, or synthesized from positions if absent
//! 3. `TEXCOORD_0` - dequantized, 2 components
//! 4. `COLOR_0` - dequantized, 3 or 4 components per the declared type
//! 5. `TANGENT` - octahedral tangent decode, 4 components
//! 6. `_FEATURE_ID_*` - dequantized, 1 component
//! 7. Indices - passed through untouched

use std::collections::BTreeMap;

use meshtile_decode::{
    AttributeArray, DecodeResult, ElementType, IndexArray, Quantization, compute_vertex_normals,
    decode_oct_normals, decode_oct_tangents, dequantize,
};

use crate::error::{Error, Result};
use crate::mesh::{
    AttributeBuffer, COLOR_0, DecodeStats, DecodedTile, FEATURE_ID_PREFIX, NORMAL, POSITION,
    ParsedTile, PrimitiveRecord, TANGENT, TEXCOORD_0,
};
use crate::transfer::TransferList;

/// Decode every primitive of a parsed tile.
///
/// Any malformed attribute fails the whole tile.
pub fn decode_tile(tile: ParsedTile) -> Result<DecodedTile> {
    let ParsedTile {
        mut meshes,
        sidecar_buffers,
    } = tile;

    let mut transferables = TransferList::default();
    let mut stats = DecodeStats::default();

    for (&mesh_index, mesh) in &mut meshes {
        for (primitive_index, primitive) in mesh.primitives.iter_mut().enumerate() {
            if primitive.attributes.is_empty() {
                continue;
            }
            if !primitive.attributes.contains_key(POSITION) {
                return Err(Error::MissingPosition {
                    mesh: mesh_index,
                    primitive: primitive_index,
                });
            }
            decode_primitive(primitive, &mut transferables, &mut stats)?;
            tracing::trace!(
                mesh = mesh_index,
                primitive = primitive_index,
                "decoded primitive"
            );
        }
    }

    for buffer in &sidecar_buffers {
        transferables.register(buffer);
    }

    tracing::debug!(
        "Decoded tile: {} primitives, {} attributes, {} synthesized normals, {} bytes to transfer",
        stats.primitives,
        stats.decoded_attributes,
        stats.synthesized_normals,
        transferables.total_bytes()
    );

    Ok(DecodedTile {
        meshes,
        sidecar_buffers,
        transferables,
        stats,
    })
}

fn decode_primitive(
    primitive: &mut PrimitiveRecord,
    transferables: &mut TransferList,
    stats: &mut DecodeStats,
) -> Result<()> {
    stats.primitives += 1;
    let mut decoder = AttributeDecoder {
        attributes: &mut primitive.attributes,
        transferables,
        stats,
    };

    decoder.replace(POSITION, ElementType::Vec3, |data, quant| {
        dequantize(data, 3, quant)
    })?;

    let has_normals = decoder.replace(NORMAL, ElementType::Vec3, decode_oct_normals)?;
    if !has_normals {
        decoder.synthesize_normals(primitive.indices.as_ref())?;
    }

    decoder.replace(TEXCOORD_0, ElementType::Vec2, |data, quant| {
        dequantize(data, 2, quant)
    })?;

    if let Some(color) = decoder.attributes.get(COLOR_0) {
        let element_type = if color.element_type == ElementType::Vec4 {
            ElementType::Vec4
        } else {
            ElementType::Vec3
        };
        decoder.replace(COLOR_0, element_type, |data, quant| {
            dequantize(data, element_type.components(), quant)
        })?;
    }

    decoder.replace(TANGENT, ElementType::Vec4, decode_oct_tangents)?;

    let feature_ids: Vec<String> = decoder
        .attributes
        .keys()
        .filter(|name| name.starts_with(FEATURE_ID_PREFIX))
        .cloned()
        .collect();
    for name in &feature_ids {
        decoder.replace(name, ElementType::Scalar, |data, quant| {
            dequantize(data, 1, quant)
        })?;
    }

    if let Some(indices) = &primitive.indices {
        decoder.transferables.register(indices);
    }

    Ok(())
}

struct AttributeDecoder<'a> {
    attributes: &'a mut BTreeMap<String, AttributeBuffer>,
    transferables: &'a mut TransferList,
    stats: &'a mut DecodeStats,
}

impl AttributeDecoder<'_> {
    /// Decode `name` in place. Returns `false` if the attribute is absent.
    fn replace(
        &mut self,
        name: &str,
        element_type: ElementType,
        decode: impl FnOnce(&AttributeArray, Option<&Quantization>) -> DecodeResult<AttributeArray>,
    ) -> Result<bool> {
        let Some(attribute) = self.attributes.get_mut(name) else {
            return Ok(false);
        };

        let data = decode(&attribute.data, attribute.quantization.as_ref()).map_err(|source| {
            Error::Attribute {
                name: name.to_owned(),
                source,
            }
        })?;

        *attribute = AttributeBuffer::new(data, element_type);
        self.transferables.register(&attribute.data);
        self.stats.decoded_attributes += 1;
        Ok(true)
    }

    /// Compute `NORMAL` from the already decoded `POSITION`.
    fn synthesize_normals(&mut self, indices: Option<&IndexArray>) -> Result<()> {
        let Some(positions) = self.attributes.get(POSITION) else {
            return Ok(());
        };

        let normals = compute_vertex_normals(&positions.data.to_f32(), indices)?;
        let normals = AttributeBuffer::new(normals, ElementType::Vec3);
        self.transferables.register(&normals.data);
        self.attributes.insert(NORMAL.to_owned(), normals);
        self.stats.synthesized_normals += 1;
        Ok(())
    }
}
