//! Activation functions and softmax helpers.

use libm::expf;
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array3, ArrayViewMut1, Axis};

/// Minimum buffer size before parallel execution pays off.
pub const PARALLEL_THRESHOLD: usize = 16_384;

#[inline(always)]
pub fn silu_scalar(x: f32) -> f32 {
    if x <= -20.0 {
        0.0
    } else if x >= 20.0 {
        x
    } else {
        x / (1.0 + expf(-x))
    }
}

/// SiLU applied in place, parallel for large buffers.
pub fn silu_inplace(x: &mut Array3<f32>) {
    if x.len() >= PARALLEL_THRESHOLD {
        x.par_mapv_inplace(silu_scalar);
    } else {
        x.mapv_inplace(silu_scalar);
    }
}

/// Numerically stable in-place softmax over a 1D slice.
pub fn softmax_1d_inplace(logits: &mut ArrayViewMut1<f32>) {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for x in logits.iter_mut() {
        *x = expf(*x - max);
        sum += *x;
    }
    if sum > 0.0 {
        for x in logits.iter_mut() {
            *x /= sum;
        }
    }
}

/// Softmax of a 1D array, returning a fresh probability vector.
pub fn softmax_1d(logits: &Array1<f32>) -> Array1<f32> {
    let mut probs = logits.clone();
    softmax_1d_inplace(&mut probs.view_mut());
    probs
}

/// In-place softmax over the last axis of a 4D tensor (attention scores).
pub fn softmax_last_axis_inplace(scores: &mut ndarray::Array4<f32>) {
    let last = scores.ndim() - 1;
    for mut lane in scores.lanes_mut(Axis(last)) {
        softmax_1d_inplace(&mut lane);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_silu_scalar_known_values() {
        assert_eq!(silu_scalar(0.0), 0.0);
        assert!((silu_scalar(1.0) - 0.7310586).abs() < 1e-5);
        // Saturated tails
        assert_eq!(silu_scalar(-30.0), 0.0);
        assert_eq!(silu_scalar(30.0), 30.0);
    }

    #[test]
    fn test_softmax_1d_sums_to_one() {
        let probs = softmax_1d(&array![1.0, 2.0, 3.0]);
        assert!((probs.sum() - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_softmax_1d_numerical_stability() {
        let probs = softmax_1d(&array![1000.0, 1001.0, 1002.0]);
        assert!((probs.sum() - 1.0).abs() < 1e-6);
        assert!(probs.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_softmax_handles_neg_infinity() {
        let probs = softmax_1d(&array![0.0, f32::NEG_INFINITY, 0.0]);
        assert_eq!(probs[1], 0.0);
        assert!((probs[0] - 0.5).abs() < 1e-6);
    }
}
