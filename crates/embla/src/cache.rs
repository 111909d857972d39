//! Chunked key-value cache for autoregressive decoding.
//!
//! One `KvCache` exists per transformer layer. Storage grows in fixed-size
//! chunks so tensor shapes stay stable across many decode steps instead of
//! reallocating once per token.

use anyhow::Result;
use ndarray::{s, Array4, ArrayView4};

/// Default number of positions added per growth event.
pub const CACHE_CHUNK: usize = 256;

/// Key/value storage for one attention layer.
///
/// Tensors are shaped `[batch=1, num_kv_heads, seq_len, head_dim]`. The
/// physical sequence dimension is always a multiple of the chunk size;
/// `offset` tracks how many positions hold valid data.
pub struct KvCache {
    num_kv_heads: usize,
    head_dim: usize,
    keys: Option<Array4<f32>>,
    values: Option<Array4<f32>>,
    offset: usize,
    step: usize,
}

impl KvCache {
    pub fn new(num_kv_heads: usize, head_dim: usize) -> Self {
        Self::with_step(num_kv_heads, head_dim, CACHE_CHUNK)
    }

    /// Cache with a custom chunk size. Mainly useful in tests.
    pub fn with_step(num_kv_heads: usize, head_dim: usize, step: usize) -> Self {
        assert!(step > 0, "cache chunk size must be positive");
        Self {
            num_kv_heads,
            head_dim,
            keys: None,
            values: None,
            offset: 0,
            step,
        }
    }

    /// Number of valid cached positions.
    pub fn len(&self) -> usize {
        self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset == 0
    }

    /// Physical capacity of the sequence dimension.
    pub fn capacity(&self) -> usize {
        self.keys.as_ref().map_or(0, |k| k.shape()[2])
    }

    pub fn num_kv_heads(&self) -> usize {
        self.num_kv_heads
    }

    pub fn head_dim(&self) -> usize {
        self.head_dim
    }

    /// Appends freshly projected keys/values and returns the full valid
    /// history `[0, offset)` including the new positions.
    ///
    /// `new_keys`/`new_values` cover exactly the positions computed by this
    /// forward call: the whole prompt on the first call, a single token on
    /// later calls. When the valid region would outgrow capacity, storage is
    /// reallocated to the smallest chunk multiple that fits; the old buffers
    /// are dropped, never retained.
    pub fn update_and_fetch(
        &mut self,
        new_keys: ArrayView4<f32>,
        new_values: ArrayView4<f32>,
    ) -> Result<(ArrayView4<'_, f32>, ArrayView4<'_, f32>)> {
        let new_len = new_keys.shape()[2];
        if new_len == 0 {
            anyhow::bail!("cache update must cover at least one position");
        }
        if new_keys.shape() != new_values.shape() {
            anyhow::bail!(
                "key shape {:?} does not match value shape {:?}",
                new_keys.shape(),
                new_values.shape()
            );
        }
        if new_keys.shape()[1] != self.num_kv_heads || new_keys.shape()[3] != self.head_dim {
            anyhow::bail!(
                "cache update shape {:?} does not match layout ({} kv heads, head_dim {})",
                new_keys.shape(),
                self.num_kv_heads,
                self.head_dim
            );
        }

        let prev = self.offset;
        let needed = prev + new_len;

        if needed > self.capacity() {
            self.grow(needed)?;
        }

        let insert = s![.., .., prev..needed, ..];
        // Unwraps are safe: grow() always leaves storage allocated.
        self.keys.as_mut().unwrap().slice_mut(insert).assign(&new_keys);
        self.values.as_mut().unwrap().slice_mut(insert).assign(&new_values);
        self.offset = needed;

        let valid = s![.., .., ..self.offset, ..];
        Ok((
            self.keys.as_ref().unwrap().slice(valid),
            self.values.as_ref().unwrap().slice(valid),
        ))
    }

    /// Reallocates storage to the smallest chunk multiple that holds
    /// `needed` positions, copying only the valid prefix. The unused tail of
    /// the old buffer is discarded so trailing zeros never accumulate.
    fn grow(&mut self, needed: usize) -> Result<()> {
        let grown = needed.div_ceil(self.step) * self.step;
        let shape = (1, self.num_kv_heads, grown, self.head_dim);

        let mut keys = Array4::<f32>::zeros(shape);
        let mut values = Array4::<f32>::zeros(shape);

        if let (Some(old_k), Some(old_v)) = (self.keys.take(), self.values.take()) {
            let valid = s![.., .., ..self.offset, ..];
            keys.slice_mut(valid).assign(&old_k.slice(valid));
            values.slice_mut(valid).assign(&old_v.slice(valid));
            // old_k/old_v dropped here; no reference to the previous storage survives
        }

        self.keys = Some(keys);
        self.values = Some(values);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn filled(len: usize, start: f32) -> Array4<f32> {
        let mut a = Array4::zeros((1, 2, len, 4));
        for s_idx in 0..len {
            for h in 0..2 {
                for d in 0..4 {
                    a[[0, h, s_idx, d]] = start + s_idx as f32;
                }
            }
        }
        a
    }

    #[test]
    fn test_empty_cache() {
        let cache = KvCache::new(2, 4);
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 0);
    }

    #[test]
    fn test_first_update_allocates_one_chunk() {
        let mut cache = KvCache::with_step(2, 4, 8);
        let k = filled(3, 1.0);
        let v = filled(3, 10.0);

        let (ck, cv) = cache.update_and_fetch(k.view(), v.view()).unwrap();
        assert_eq!(ck.shape(), &[1, 2, 3, 4]);
        assert_eq!(cv.shape(), &[1, 2, 3, 4]);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.capacity(), 8);
    }

    #[test]
    fn test_monotonic_growth_capacity_is_smallest_chunk_multiple() {
        let mut cache = KvCache::with_step(1, 2, 4);
        let mut total = 0;

        for len in [3, 3, 1, 5, 1, 1] {
            let k = Array4::ones((1, 1, len, 2));
            let v = Array4::ones((1, 1, len, 2));
            cache.update_and_fetch(k.view(), v.view()).unwrap();
            total += len;

            assert_eq!(cache.len(), total);
            let expected_cap = total.div_ceil(4) * 4;
            assert_eq!(cache.capacity(), expected_cap);
        }
    }

    #[test]
    fn test_content_survives_growth() {
        let mut cache = KvCache::with_step(2, 4, 4);

        // Prompt-sized write, then single-token writes across a growth event.
        cache
            .update_and_fetch(filled(3, 1.0).view(), filled(3, 100.0).view())
            .unwrap();
        for i in 0..6 {
            let k = Array4::from_elem((1, 2, 1, 4), 50.0 + i as f32);
            let v = Array4::from_elem((1, 2, 1, 4), 150.0 + i as f32);
            cache.update_and_fetch(k.view(), v.view()).unwrap();
        }

        assert_eq!(cache.len(), 9);
        let (ck, cv) = cache
            .update_and_fetch(
                Array4::from_elem((1, 2, 1, 4), 99.0).view(),
                Array4::from_elem((1, 2, 1, 4), 199.0).view(),
            )
            .unwrap();

        // Prompt positions intact
        assert_eq!(ck[[0, 0, 0, 0]], 1.0);
        assert_eq!(ck[[0, 1, 2, 3]], 3.0);
        assert_eq!(cv[[0, 0, 1, 0]], 101.0);
        // Incremental positions in order
        assert_eq!(ck[[0, 0, 3, 0]], 50.0);
        assert_eq!(ck[[0, 1, 8, 2]], 55.0);
        assert_eq!(cv[[0, 0, 4, 1]], 151.0);
        // The latest write
        assert_eq!(ck[[0, 0, 9, 0]], 99.0);
        assert_eq!(cv[[0, 1, 9, 3]], 199.0);
    }

    #[test]
    fn test_returned_slice_excludes_padding() {
        let mut cache = KvCache::with_step(1, 2, 16);
        let k = Array4::ones((1, 1, 5, 2));
        let v = Array4::ones((1, 1, 5, 2));

        let (ck, _) = cache.update_and_fetch(k.view(), v.view()).unwrap();
        assert_eq!(ck.shape()[2], 5);
        assert_eq!(cache.capacity(), 16);
    }

    #[test]
    fn test_empty_update_rejected() {
        let mut cache = KvCache::new(2, 4);
        let k = Array4::<f32>::zeros((1, 2, 0, 4));
        let v = Array4::<f32>::zeros((1, 2, 0, 4));
        assert!(cache.update_and_fetch(k.view(), v.view()).is_err());
    }

    #[test]
    fn test_layout_mismatch_rejected() {
        let mut cache = KvCache::new(2, 4);
        let k = Array4::<f32>::zeros((1, 3, 1, 4));
        let v = Array4::<f32>::zeros((1, 3, 1, 4));
        assert!(cache.update_and_fetch(k.view(), v.view()).is_err());

        let k = Array4::<f32>::zeros((1, 2, 1, 4));
        let v = Array4::<f32>::zeros((1, 2, 2, 4));
        assert!(cache.update_and_fetch(k.view(), v.view()).is_err());
    }
}
