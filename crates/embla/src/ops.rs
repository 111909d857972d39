//! Batched matmul and masking primitives used by attention.

use ndarray::{s, Array4};

/// Additive mask value, large enough to zero out a position after softmax.
pub const MASK_VALUE: f32 = -1e9;

/// Batched matrix multiply over the last two axes:
/// `[batch, heads, m, k] x [batch, heads, k, n] -> [batch, heads, m, n]`.
///
/// Both inputs must be in standard layout.
pub fn matmul_4d(a: &Array4<f32>, b: &Array4<f32>) -> Array4<f32> {
    let (batch, heads, m, k) = a.dim();
    let (b_batch, b_heads, k2, n) = b.dim();
    assert_eq!((batch, heads), (b_batch, b_heads), "batch/head dims must match");
    assert_eq!(k, k2, "matmul inner dimensions do not match");

    let mut out = Array4::<f32>::zeros((batch, heads, m, n));
    for bi in 0..batch {
        for h in 0..heads {
            let lhs = a.slice(s![bi, h, .., ..]);
            let rhs = b.slice(s![bi, h, .., ..]);
            out.slice_mut(s![bi, h, .., ..]).assign(&lhs.dot(&rhs));
        }
    }
    out
}

/// Masks future positions in attention scores, offset-aware for cached
/// decoding: the query at row `i` sits at absolute position `offset + i`
/// and may only attend to keys at positions `<= offset + i`.
pub fn apply_causal_mask(scores: &mut Array4<f32>, offset: usize) {
    let seq_q = scores.shape()[2];
    let seq_k = scores.shape()[3];
    for i in 0..seq_q {
        let query_pos = offset + i;
        for j in 0..seq_k {
            if j > query_pos {
                scores.slice_mut(s![.., .., i, j]).fill(MASK_VALUE);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn test_matmul_4d_identity() {
        let mut a = Array4::<f32>::zeros((1, 2, 3, 3));
        for h in 0..2 {
            for i in 0..3 {
                a[[0, h, i, i]] = 1.0;
            }
        }
        let b = Array4::from_shape_fn((1, 2, 3, 4), |(_, h, i, j)| (h * 12 + i * 4 + j) as f32);
        let c = matmul_4d(&a, &b);
        assert_eq!(c, b);
    }

    #[test]
    fn test_causal_mask_no_offset() {
        let mut scores = Array4::<f32>::zeros((1, 1, 3, 3));
        apply_causal_mask(&mut scores, 0);

        // Row 0 sees only position 0
        assert_eq!(scores[[0, 0, 0, 1]], MASK_VALUE);
        assert_eq!(scores[[0, 0, 0, 2]], MASK_VALUE);
        // Row 2 sees everything
        assert_eq!(scores[[0, 0, 2, 0]], 0.0);
        assert_eq!(scores[[0, 0, 2, 2]], 0.0);
    }

    #[test]
    fn test_causal_mask_with_offset() {
        // One query at absolute position 4 over 5 cached keys: nothing masked.
        let mut scores = Array4::<f32>::zeros((1, 1, 1, 5));
        apply_causal_mask(&mut scores, 4);
        assert!(scores.iter().all(|&x| x == 0.0));

        // Two queries at positions 2 and 3 over 4 keys.
        let mut scores = Array4::<f32>::zeros((1, 1, 2, 4));
        apply_causal_mask(&mut scores, 2);
        assert_eq!(scores[[0, 0, 0, 3]], MASK_VALUE);
        assert_eq!(scores[[0, 0, 0, 2]], 0.0);
        assert_eq!(scores[[0, 0, 1, 3]], 0.0);
    }
}
