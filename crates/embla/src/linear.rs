//! Bias-free linear projection.

use ndarray::{Array2, Array3, ArrayView2};

/// A linear layer without bias, as used throughout LLaMA-family blocks.
///
/// The weight is stored transposed, `[in_features, out_features]`, so the
/// forward pass is a plain row-major matmul.
#[derive(Debug)]
pub struct Linear {
    weight_t: Array2<f32>,
}

impl Linear {
    /// Builds the layer from a checkpoint-layout weight `[out, in]`.
    pub fn new(weight: Array2<f32>) -> Self {
        let weight_t = weight.reversed_axes().as_standard_layout().to_owned();
        Self { weight_t }
    }

    pub fn in_features(&self) -> usize {
        self.weight_t.nrows()
    }

    pub fn out_features(&self) -> usize {
        self.weight_t.ncols()
    }

    pub fn forward_2d(&self, x: &ArrayView2<f32>) -> Array2<f32> {
        x.dot(&self.weight_t)
    }

    /// `[batch, seq, in] -> [batch, seq, out]`
    pub fn forward_3d(&self, x: &Array3<f32>) -> Array3<f32> {
        let (batch, seq, dim) = x.dim();
        let x_std = x.as_standard_layout();
        let flat = x_std
            .view()
            .into_shape_with_order((batch * seq, dim))
            .expect("standard layout reshape cannot fail");
        let out = flat.dot(&self.weight_t);
        out.into_shape_with_order((batch, seq, self.out_features()))
            .expect("matmul output reshape cannot fail")
    }
}
