//! CPU inference for LLaMA3-family transformer models.
//!
//! This crate provides the pieces needed to run a chat or completion loop
//! over a Hugging Face style checkpoint directory: safetensors weight
//! loading, the decoder-only model definition, a chunked KV cache,
//! temperature/top-p sampling, and a pull-driven token stream.

pub mod activations;
pub mod attention;
pub mod cache;
pub mod chat;
pub mod embeddings;
pub mod feedforward;
pub mod generation;
pub mod linear;
pub mod models;
pub mod normalization;
pub mod ops;
pub mod quantize;
pub mod rope;
pub mod sampling;
pub mod tokenizer;
pub mod weights;

// Re-export commonly used items
pub use crate::{
    attention::Attention,
    cache::KvCache,
    chat::{ChatTemplate, Conversation, Llama3Template, Message, Role},
    embeddings::Embedding,
    feedforward::SwiGluFeedForward,
    generation::{GenerationConfig, Generator},
    linear::Linear,
    models::{CausalLM, ConfigError, Llama, LlamaConfig},
    normalization::RmsNorm,
    rope::Rope,
    sampling::{SampledToken, SamplingParams},
    tokenizer::LoadedTokenizer,
    weights::ModelWeights,
};

// Prelude for easy imports
pub mod prelude {
    pub use crate::cache::KvCache;
    pub use crate::generation::{GenerationConfig, Generator};
    pub use crate::models::{CausalLM, Llama, LlamaConfig};
    pub use crate::sampling::{SampledToken, SamplingParams};
    pub use crate::tokenizer::LoadedTokenizer;
}
