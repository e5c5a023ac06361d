//! Vertex normal synthesis.

use glam::Vec3;

use crate::IndexArray;
use crate::error::{DecodeError, DecodeResult};

/// Compute smooth per-vertex normals from triangle positions.
///
/// # Arguments
///
/// * `positions` - XYZ per vertex
/// * `indices` - Triangle list indices, or `None` for non-indexed geometry
///   where every three consecutive vertices form a triangle
///
/// # Returns
///
/// One normal per vertex (XYZ). Each triangle's unnormalized face normal
/// `(c - b) × (a - b)` is added to its three vertices, then every
/// accumulator is normalized. Vertices no triangle touches, or whose
/// contributions cancel out, keep the zero vector.
pub fn compute_vertex_normals(
    positions: &[f32],
    indices: Option<&IndexArray>,
) -> DecodeResult<Vec<f32>> {
    if positions.len() % 3 != 0 {
        return Err(DecodeError::LengthMismatch {
            len: positions.len(),
            stride: 3,
        });
    }
    let vertex_count = positions.len() / 3;
    let position = |i: usize| Vec3::from_slice(&positions[i * 3..i * 3 + 3]);

    let mut accumulated = vec![Vec3::ZERO; vertex_count];
    let mut add_triangle = |a: usize, b: usize, c: usize| -> DecodeResult<()> {
        for index in [a, b, c] {
            if index >= vertex_count {
                return Err(DecodeError::IndexOutOfRange {
                    index,
                    vertex_count,
                });
            }
        }
        let (pa, pb, pc) = (position(a), position(b), position(c));
        let face = (pc - pb).cross(pa - pb);
        accumulated[a] += face;
        accumulated[b] += face;
        accumulated[c] += face;
        Ok(())
    };

    match indices {
        Some(indices) => {
            for t in 0..indices.len() / 3 {
                let corner = |k: usize| indices.get(t * 3 + k).unwrap_or(usize::MAX);
                add_triangle(corner(0), corner(1), corner(2))?;
            }
        }
        None => {
            for t in 0..vertex_count / 3 {
                add_triangle(t * 3, t * 3 + 1, t * 3 + 2)?;
            }
        }
    }

    let mut out = Vec::with_capacity(positions.len());
    for normal in accumulated {
        out.extend_from_slice(&normal.normalize_or_zero().to_array());
    }
    Ok(out)
}
