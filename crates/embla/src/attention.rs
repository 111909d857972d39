//! Grouped-query self-attention with rotary embeddings and KV caching.

use anyhow::Result;
use ndarray::{s, Array3, Array4};

use crate::activations::softmax_last_axis_inplace;
use crate::cache::KvCache;
use crate::linear::Linear;
use crate::ops::{apply_causal_mask, matmul_4d};
use crate::rope::Rope;

#[derive(Debug)]
pub struct Attention {
    pub q_proj: Linear,
    pub k_proj: Linear,
    pub v_proj: Linear,
    pub o_proj: Linear,
    pub rope: Rope,

    pub num_heads: usize,
    pub num_kv_heads: usize,
    pub head_dim: usize,
    pub scale: f32,
}

impl Attention {
    pub fn new(
        q_proj: Linear,
        k_proj: Linear,
        v_proj: Linear,
        o_proj: Linear,
        rope: Rope,
        num_heads: usize,
        num_kv_heads: usize,
        head_dim: usize,
    ) -> Self {
        let scale = 1.0 / (head_dim as f32).sqrt();
        Self {
            q_proj,
            k_proj,
            v_proj,
            o_proj,
            rope,
            num_heads,
            num_kv_heads,
            head_dim,
            scale,
        }
    }

    /// Causal self-attention over `x` `[batch=1, seq, hidden]`.
    ///
    /// With a cache, new keys/values are rotated at the cache offset,
    /// appended, and attention runs over the full valid history. Without a
    /// cache the call behaves as a plain full-sequence forward pass.
    pub fn forward(&self, x: &Array3<f32>, cache: Option<&mut KvCache>) -> Result<Array3<f32>> {
        let (batch, seq_len, _) = x.dim();

        let q = self.q_proj.forward_3d(x);
        let k = self.k_proj.forward_3d(x);
        let v = self.v_proj.forward_3d(x);

        // [batch, seq, heads*dim] -> [batch, heads, seq, dim]
        let mut q = split_heads(q, self.num_heads, self.head_dim)?;
        let mut k = split_heads(k, self.num_kv_heads, self.head_dim)?;
        let v = split_heads(v, self.num_kv_heads, self.head_dim)?;

        let offset = cache.as_ref().map_or(0, |c| c.len());
        self.rope.rotate_in_place(&mut q, offset);
        self.rope.rotate_in_place(&mut k, offset);

        let (keys, values) = match cache {
            Some(cache) => {
                let (ck, cv) = cache.update_and_fetch(k.view(), v.view())?;
                (ck.to_owned(), cv.to_owned())
            }
            None => (k, v),
        };

        let (keys, values) = if self.num_kv_heads != self.num_heads {
            let groups = self.num_heads / self.num_kv_heads;
            (repeat_kv(&keys, groups), repeat_kv(&values, groups))
        } else {
            (keys, values)
        };

        let keys_t = keys
            .permuted_axes([0, 1, 3, 2])
            .as_standard_layout()
            .to_owned();
        let mut scores = matmul_4d(&q, &keys_t);
        scores *= self.scale;

        // A single query attends to the whole history; only multi-token
        // windows need masking.
        if seq_len > 1 {
            apply_causal_mask(&mut scores, offset);
        }
        softmax_last_axis_inplace(&mut scores);

        let context = matmul_4d(&scores, &values);
        let context = context
            .permuted_axes([0, 2, 1, 3])
            .as_standard_layout()
            .to_owned()
            .into_shape_with_order((batch, seq_len, self.num_heads * self.head_dim))?;

        Ok(self.o_proj.forward_3d(&context))
    }
}

/// `[batch, seq, heads*dim] -> [batch, heads, seq, dim]`, standard layout.
fn split_heads(x: Array3<f32>, heads: usize, head_dim: usize) -> Result<Array4<f32>> {
    let (batch, seq, width) = x.dim();
    anyhow::ensure!(
        width == heads * head_dim,
        "projection width {} does not factor into {} heads of dim {}",
        width,
        heads,
        head_dim
    );
    Ok(x
        .into_shape_with_order((batch, seq, heads, head_dim))?
        .permuted_axes([0, 2, 1, 3])
        .as_standard_layout()
        .to_owned())
}

/// Repeats KV heads for grouped-query attention:
/// `[batch, kv_heads, seq, dim] -> [batch, kv_heads*groups, seq, dim]`.
fn repeat_kv(kv: &Array4<f32>, groups: usize) -> Array4<f32> {
    let (batch, kv_heads, seq, dim) = kv.dim();
    let mut repeated = Array4::zeros((batch, kv_heads * groups, seq, dim));
    for b in 0..batch {
        for kv_head in 0..kv_heads {
            for g in 0..groups {
                let q_head = kv_head * groups + g;
                repeated
                    .slice_mut(s![b, q_head, .., ..])
                    .assign(&kv.slice(s![b, kv_head, .., ..]));
            }
        }
    }
    repeated
}
