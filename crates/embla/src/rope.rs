//! Rotary position embeddings.
//!
//! Applied to query and key heads before attention; the position offset
//! comes from the KV cache so incremental decoding rotates each token at
//! its absolute position.

use ndarray::{Array1, Array4};

#[derive(Debug)]
pub struct Rope {
    inv_freq: Array1<f32>,
    head_dim: usize,
    /// Position scale, `1 / factor` when linear rope scaling is configured.
    scale: f32,
    /// Interleaved-pair rotation instead of the rotate-half layout.
    traditional: bool,
}

impl Rope {
    pub fn new(head_dim: usize, theta: f32, traditional: bool, scale: f32) -> Self {
        assert!(head_dim % 2 == 0, "RoPE requires an even head dimension");
        let inv_freq = Array1::from_iter((0..head_dim / 2).map(|i| {
            let exponent = (2 * i) as f32 / head_dim as f32;
            1.0 / theta.powf(exponent)
        }));
        Self {
            inv_freq,
            head_dim,
            scale,
            traditional,
        }
    }

    pub fn head_dim(&self) -> usize {
        self.head_dim
    }

    /// Rotates `[batch, heads, seq, head_dim]` in place, with the token at
    /// sequence index `s` treated as absolute position `offset + s`.
    pub fn rotate_in_place(&self, x: &mut Array4<f32>, offset: usize) {
        let (batch, heads, seq_len, head_dim) = x.dim();
        debug_assert_eq!(head_dim, self.head_dim);
        let half = head_dim / 2;

        for b in 0..batch {
            for h in 0..heads {
                for s in 0..seq_len {
                    let pos = (offset + s) as f32 * self.scale;
                    for i in 0..half {
                        let angle = pos * self.inv_freq[i];
                        let (sin, cos) = angle.sin_cos();

                        let (lo, hi) = if self.traditional {
                            (2 * i, 2 * i + 1)
                        } else {
                            (i, i + half)
                        };
                        // Read both before writing either.
                        let x0 = x[[b, h, s, lo]];
                        let x1 = x[[b, h, s, hi]];
                        x[[b, h, s, lo]] = x0 * cos - x1 * sin;
                        x[[b, h, s, hi]] = x0 * sin + x1 * cos;
                    }
                }
            }
        }
    }
}
