//! Octahedral unit vector decoding.
//!
//! A unit vector is projected onto the octahedron `|x| + |y| + |z| = 1`, the
//! lower half is folded over the upper half, and the result is flattened
//! onto the `[-1, 1]` square. Two quantized components per vector remain.

use glam::{DVec2, DVec3};

use crate::array::{Component, with_components};
use crate::error::{DecodeError, DecodeResult};
use crate::quantization::{Quantization, dequantize};
use crate::AttributeArray;

/// Decode oct-encoded normals into 3 `f32` components per vertex.
///
/// Attributes without quantization are passed through (they were decoded
/// upstream). Any quantized normal is treated as an octahedral pair, whether
/// or not its descriptor carries the flag.
pub fn decode_oct_normals(
    array: &AttributeArray,
    quantization: Option<&Quantization>,
) -> DecodeResult<AttributeArray> {
    let Some(quant) = quantization else {
        return dequantize(array, 3, None);
    };
    quant.validate()?;
    check_stride(array, 2)?;

    let max = quant.max_quantized_value();
    let out = with_components!(array, s => unfold_normals(s, max));
    Ok(AttributeArray::from(out))
}

/// Decode oct-encoded tangents into 4 `f32` components per vertex.
///
/// The input stores three components per vertex: the octahedral pair and a
/// raw value whose upper half encodes `w = +1`, lower half `w = -1`.
pub fn decode_oct_tangents(
    array: &AttributeArray,
    quantization: Option<&Quantization>,
) -> DecodeResult<AttributeArray> {
    let quant = match quantization {
        Some(quant) if quant.oct_encoded => quant,
        other => return dequantize(array, 4, other),
    };
    quant.validate()?;
    check_stride(array, 3)?;

    let max = quant.max_quantized_value();
    let out = with_components!(array, s => unfold_tangents(s, max));
    Ok(AttributeArray::from(out))
}

/// Decode one quantized octahedral pair into a unit vector.
///
/// `max` is the largest quantized value, `2^bits - 1`.
#[must_use]
pub fn oct_decode(u: f64, v: f64, max: f64) -> DVec3 {
    let mut p = DVec2::new(u / max, v / max) * 2.0 - 1.0;
    let z = 1.0 - p.x.abs() - p.y.abs();

    if z < 0.0 {
        // y depends on the pre-fold x.
        let old_x = p.x;
        p.x = (1.0 - p.y.abs()) * sign(p.x);
        p.y = (1.0 - old_x.abs()) * sign(p.y);
    }

    let n = p.extend(z);
    n / n.length()
}

// Zero counts as positive.
fn sign(value: f64) -> f64 {
    if value >= 0.0 { 1.0 } else { -1.0 }
}

fn check_stride(array: &AttributeArray, stride: usize) -> DecodeResult<()> {
    if array.len() % stride == 0 {
        Ok(())
    } else {
        Err(DecodeError::LengthMismatch {
            len: array.len(),
            stride,
        })
    }
}

fn unfold_normals<T: Component>(data: &[T], max: f64) -> Vec<f32> {
    let mut out = Vec::with_capacity(data.len() / 2 * 3);
    for pair in data.chunks_exact(2) {
        let n = oct_decode(pair[0].into(), pair[1].into(), max).as_vec3();
        out.extend_from_slice(&n.to_array());
    }
    out
}

fn unfold_tangents<T: Component>(data: &[T], max: f64) -> Vec<f32> {
    let half = max / 2.0;
    let mut out = Vec::with_capacity(data.len() / 3 * 4);
    for element in data.chunks_exact(3) {
        let n = oct_decode(element[0].into(), element[1].into(), max).as_vec3();
        let handedness: f64 = element[2].into();
        let w = if handedness > half { 1.0 } else { -1.0 };
        out.extend_from_slice(&n.extend(w).to_array());
    }
    out
}
