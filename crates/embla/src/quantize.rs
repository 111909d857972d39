//! Dequantization of MLX affine-quantized weights.
//!
//! Quantized checkpoints store each weight matrix as packed `u32` words
//! plus per-group scales and biases: `w = scale * q + bias`, with
//! `group_size` elements per group along each row.

use anyhow::Result;
use ndarray::Array2;

#[derive(Clone, Copy, Debug, serde::Deserialize)]
pub struct QuantizationConfig {
    pub group_size: usize,
    pub bits: usize,
}

/// Expands a packed quantized matrix back to `f32`.
///
/// `packed` is `[rows, cols * bits / 32]`; `scales` and `biases` are
/// `[rows, cols / group_size]`. Returns `[rows, cols]`.
pub fn dequantize(
    packed: &Array2<u32>,
    scales: &Array2<f32>,
    biases: &Array2<f32>,
    group_size: usize,
    bits: usize,
) -> Result<Array2<f32>> {
    anyhow::ensure!(
        matches!(bits, 2 | 4 | 8),
        "unsupported quantization width: {} bits",
        bits
    );
    anyhow::ensure!(group_size > 0, "group_size must be positive");

    let per_word = 32 / bits;
    let mask = (1u32 << bits) - 1;
    let (rows, packed_cols) = packed.dim();
    let cols = packed_cols * per_word;
    anyhow::ensure!(
        cols % group_size == 0,
        "row width {} is not a multiple of group_size {}",
        cols,
        group_size
    );
    anyhow::ensure!(
        scales.dim() == (rows, cols / group_size) && biases.dim() == scales.dim(),
        "scales/biases shape {:?}/{:?} does not match {} rows of {} groups",
        scales.dim(),
        biases.dim(),
        rows,
        cols / group_size
    );

    let mut out = Array2::zeros((rows, cols));
    for r in 0..rows {
        for j in 0..cols {
            let word = packed[[r, j / per_word]];
            let q = (word >> (bits * (j % per_word))) & mask;
            let g = j / group_size;
            out[[r, j]] = scales[[r, g]] * q as f32 + biases[[r, g]];
        }
    }
    Ok(out)
}
