//! Linear dequantization.

use crate::array::{Component, with_components};
use crate::error::{DecodeError, DecodeResult};
use crate::{AttributeArray, MAX_QUANTIZATION_BITS};

/// Quantization parameters attached to an encoded attribute.
///
/// When `range` and `min_values` are present the stored integers map
/// linearly onto `[min, min + range]` per component. When both are absent
/// the values are plain normalized integers (or octahedral pairs if
/// `oct_encoded` is set).
#[derive(Debug, Clone, PartialEq)]
pub struct Quantization {
    /// Bit width of each quantized component.
    pub bits: u32,
    /// Extent of the quantized interval, shared by all components.
    pub range: Option<f32>,
    /// Per-component lower bound.
    pub min_values: Option<Vec<f32>>,
    /// Components are octahedral-encoded unit vectors.
    pub oct_encoded: bool,
}

impl Quantization {
    /// Plain normalized quantization.
    #[must_use]
    pub fn new(bits: u32) -> Self {
        Self {
            bits,
            range: None,
            min_values: None,
            oct_encoded: false,
        }
    }

    /// Octahedral-encoded unit vectors.
    #[must_use]
    pub fn octahedral(bits: u32) -> Self {
        Self {
            oct_encoded: true,
            ..Self::new(bits)
        }
    }

    /// Attach a linear range.
    #[must_use]
    pub fn with_range(mut self, range: f32, min_values: Vec<f32>) -> Self {
        self.range = Some(range);
        self.min_values = Some(min_values);
        self
    }

    /// Check the descriptor is well formed.
    pub fn validate(&self) -> DecodeResult<()> {
        if !(1..=MAX_QUANTIZATION_BITS).contains(&self.bits) {
            return Err(DecodeError::InvalidBits(self.bits));
        }
        if self.range.is_some() != self.min_values.is_some() {
            return Err(DecodeError::UnpairedRange);
        }
        Ok(())
    }

    /// Largest representable quantized value, `2^bits - 1`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn max_quantized_value(&self) -> f64 {
        ((1u64 << self.bits.min(MAX_QUANTIZATION_BITS)) - 1) as f64
    }
}

/// Dequantize `array` into `f32` components.
///
/// Returns the input handle unchanged when `quantization` is `None`. The
/// input is never modified.
pub fn dequantize(
    array: &AttributeArray,
    item_size: usize,
    quantization: Option<&Quantization>,
) -> DecodeResult<AttributeArray> {
    let Some(quant) = quantization else {
        return Ok(array.clone());
    };
    quant.validate()?;
    if item_size == 0 {
        return Err(DecodeError::ZeroItemSize);
    }

    let max = quant.max_quantized_value();
    let out = match (quant.range, quant.min_values.as_deref()) {
        (Some(range), Some(min_values)) => {
            if array.len() % item_size != 0 {
                return Err(DecodeError::LengthMismatch {
                    len: array.len(),
                    stride: item_size,
                });
            }
            if min_values.len() < item_size {
                return Err(DecodeError::MinValuesTooShort {
                    expected: item_size,
                    actual: min_values.len(),
                });
            }
            with_components!(array, s => {
                dequantize_linear(s, item_size, max, f64::from(range), min_values)
            })
        }
        _ => with_components!(array, s => normalize(s, max)),
    };

    Ok(AttributeArray::from(out))
}

#[allow(clippy::cast_possible_truncation)]
fn dequantize_linear<T: Component>(
    data: &[T],
    item_size: usize,
    max: f64,
    range: f64,
    min_values: &[f32],
) -> Vec<f32> {
    let mut out = Vec::with_capacity(data.len());
    for element in data.chunks_exact(item_size) {
        for (&v, &min) in element.iter().zip(min_values) {
            out.push(((Into::<f64>::into(v) / max) * range + f64::from(min)) as f32);
        }
    }
    out
}

#[allow(clippy::cast_possible_truncation)]
fn normalize<T: Component>(data: &[T], max: f64) -> Vec<f32> {
    data.iter().map(|&v| (Into::<f64>::into(v) / max) as f32).collect()
}
