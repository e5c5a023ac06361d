//! Decode quantized mesh attributes into float vertex buffers.
//!
//! Everything here is plain functions over borrowed attribute buffers, for
//! the streams a Draco-style encoder leaves behind after entropy decoding.
//! Nothing spawns or locks; the `meshtile` crate runs these on its workers.
//!
//! Inputs are never modified. Each decoder returns a freshly allocated
//! `f32` buffer, or hands back the input's storage when there is nothing
//! to decode.
//!
//! # Key functions
//!
//! - [`dequantize`]: Linear dequantization of quantized components
//! - [`decode_oct_normals`]: Unfold 2-component octahedral normals to XYZ
//! - [`decode_oct_tangents`]: Unfold octahedral tangents plus a 1-bit handedness
//! - [`compute_vertex_normals`]: Synthesize smooth normals from positions

mod array;
mod error;

pub mod normals;
pub mod octahedral;
pub mod quantization;

pub use array::{AttributeArray, ElementType, IndexArray};
pub use error::{DecodeError, DecodeResult};
pub use normals::compute_vertex_normals;
pub use octahedral::{decode_oct_normals, decode_oct_tangents};
pub use quantization::{Quantization, dequantize};

/// Widest quantization supported by the encoder.
pub const MAX_QUANTIZATION_BITS: u32 = 32;
