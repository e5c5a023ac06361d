//! Error types for attribute decoding.

use thiserror::Error;

/// Result alias used by every decoder in this crate.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Errors produced while decoding a single attribute stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Quantization bit width outside `[1, 32]`.
    #[error("invalid quantization bit width {0} (expected 1..=32)")]
    InvalidBits(u32),

    /// Exactly one of `range` / `min_values` was supplied.
    #[error("quantization range and min values must be present together")]
    UnpairedRange,

    /// Fewer per-component minimums than components per element.
    #[error("quantization has {actual} min values but the attribute has {expected} components")]
    MinValuesTooShort { expected: usize, actual: usize },

    /// Zero components per element.
    #[error("attribute item size must be non-zero")]
    ZeroItemSize,

    /// Buffer does not hold a whole number of elements.
    #[error("buffer length {len} is not a multiple of the element stride {stride}")]
    LengthMismatch { len: usize, stride: usize },

    /// Index buffer references a vertex that does not exist.
    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: usize, vertex_count: usize },
}
