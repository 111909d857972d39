//! RMS normalization as used by LLaMA-family models.

use ndarray::{Array1, Array3, Axis};

#[derive(Debug)]
pub struct RmsNorm {
    pub weight: Array1<f32>,
    pub eps: f32,
}

impl RmsNorm {
    pub fn new(weight: Array1<f32>, eps: f32) -> Self {
        Self { weight, eps }
    }

    /// `x * weight / sqrt(mean(x^2) + eps)` over the hidden axis.
    pub fn forward(&self, x: &Array3<f32>) -> Array3<f32> {
        let mut out = x.clone();
        for mut lane in out.lanes_mut(Axis(2)) {
            let mean_sq = lane.iter().map(|v| v * v).sum::<f32>() / lane.len() as f32;
            let inv = 1.0 / (mean_sq + self.eps).sqrt();
            for (v, w) in lane.iter_mut().zip(self.weight.iter()) {
                *v = *v * inv * w;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    #[test]
    fn test_unit_weight_normalizes_rms_to_one() {
        let norm = RmsNorm::new(Array1::ones(4), 1e-6);
        let mut x = Array3::zeros((1, 1, 4));
        x.slice_mut(ndarray::s![0, 0, ..])
            .assign(&array![2.0, -2.0, 2.0, -2.0]);

        let y = norm.forward(&x);
        let rms = (y.iter().map(|v| v * v).sum::<f32>() / 4.0).sqrt();
        assert!((rms - 1.0).abs() < 1e-4);
        assert!((y[[0, 0, 0]] - 1.0).abs() < 1e-4);
        assert!((y[[0, 0, 1]] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_weight_scales_output() {
        let norm = RmsNorm::new(array![2.0, 2.0], 1e-6);
        let mut x = Array3::zeros((1, 1, 2));
        x.slice_mut(ndarray::s![0, 0, ..]).assign(&array![3.0, 3.0]);

        let y = norm.forward(&x);
        assert!((y[[0, 0, 0]] - 2.0).abs() < 1e-4);
    }
}
