//! Model definitions.

use anyhow::Result;
use ndarray::Array3;

use crate::cache::KvCache;

mod llama;

pub use llama::{ConfigError, Llama, LlamaConfig, RopeScaling, TransformerBlock};

/// A decoder-only language model usable by the generation loop.
///
/// `forward` consumes a token window and one cache per layer, and returns
/// logits `[1, seq_len, vocab_size]`. On the first call the window is the
/// whole prompt; afterwards it is the single most recent token.
pub trait CausalLM: Send + Sync {
    fn forward(&self, tokens: &[u32], caches: &mut [KvCache]) -> Result<Array3<f32>>;

    fn num_layers(&self) -> usize;
    fn num_kv_heads(&self) -> usize;
    fn head_dim(&self) -> usize;
    fn vocab_size(&self) -> usize;
}
