//! LLaMA3-family decoder model: configuration, construction from a
//! checkpoint directory, and the forward pass.

use std::path::Path;

use anyhow::Result;
use ndarray::Array3;
use serde::Deserialize;
use thiserror::Error;

use crate::attention::Attention;
use crate::cache::KvCache;
use crate::embeddings::Embedding;
use crate::feedforward::SwiGluFeedForward;
use crate::linear::Linear;
use crate::models::CausalLM;
use crate::normalization::RmsNorm;
use crate::quantize::QuantizationConfig;
use crate::rope::Rope;
use crate::weights::ModelWeights;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("vocab_size must be positive, got {0}")]
    InvalidVocabSize(usize),
    #[error("unsupported rope_scaling type '{0}', only 'linear' is supported")]
    UnsupportedRopeScaling(String),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Linear rope scaling, the only supported kind. Any extra key is treated
/// as an unknown scheme and rejected at parse time.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RopeScaling {
    pub factor: f32,
    #[serde(rename = "type")]
    pub scaling_type: String,
}

/// Hyperparameters read from the checkpoint's `config.json`.
#[derive(Clone, Debug, Deserialize)]
pub struct LlamaConfig {
    #[serde(default)]
    pub model_type: String,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub intermediate_size: usize,
    pub num_attention_heads: usize,
    pub rms_norm_eps: f32,
    pub vocab_size: usize,
    /// Absent means full multi-head attention.
    pub num_key_value_heads: Option<usize>,
    #[serde(default = "default_rope_theta")]
    pub rope_theta: f32,
    #[serde(default)]
    pub rope_traditional: bool,
    pub rope_scaling: Option<RopeScaling>,
    pub quantization: Option<QuantizationConfig>,
}

fn default_rope_theta() -> f32 {
    10_000.0
}

impl LlamaConfig {
    /// Parses and validates a `config.json`. Validation failures surface
    /// here, before any weight is read.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vocab_size == 0 {
            return Err(ConfigError::InvalidVocabSize(self.vocab_size));
        }
        if let Some(scaling) = &self.rope_scaling {
            if scaling.scaling_type != "linear" {
                return Err(ConfigError::UnsupportedRopeScaling(
                    scaling.scaling_type.clone(),
                ));
            }
        }
        Ok(())
    }

    pub fn num_kv_heads(&self) -> usize {
        self.num_key_value_heads
            .unwrap_or(self.num_attention_heads)
    }

    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    fn rope_scale(&self) -> f32 {
        self.rope_scaling
            .as_ref()
            .map_or(1.0, |scaling| 1.0 / scaling.factor)
    }
}

/// One decoder layer: pre-norm attention and pre-norm SwiGLU, each with a
/// residual connection.
#[derive(Debug)]
pub struct TransformerBlock {
    pub self_attn: Attention,
    pub mlp: SwiGluFeedForward,
    pub input_layernorm: RmsNorm,
    pub post_attention_layernorm: RmsNorm,
}

impl TransformerBlock {
    pub fn forward(&self, x: &Array3<f32>, cache: Option<&mut KvCache>) -> Result<Array3<f32>> {
        let normed = self.input_layernorm.forward(x);
        let attn_out = self.self_attn.forward(&normed, cache)?;
        let residual = x + &attn_out;

        let normed = self.post_attention_layernorm.forward(&residual);
        let mlp_out = self.mlp.forward(&normed)?;
        Ok(residual + mlp_out)
    }
}

#[derive(Debug)]
pub struct Llama {
    embed_tokens: Embedding,
    layers: Vec<TransformerBlock>,
    norm: RmsNorm,
    lm_head: Linear,
    config: LlamaConfig,
}

impl Llama {
    /// Loads a model from a checkpoint directory containing `config.json`
    /// and safetensors weights. The config is validated before any tensor
    /// is touched.
    pub fn load(dir: &Path) -> Result<Self> {
        let config = LlamaConfig::from_file(&dir.join("config.json"))?;
        log::info!(
            "loading {} model: {} layers, hidden {}, {} heads ({} kv), vocab {}",
            if config.model_type.is_empty() {
                "llama"
            } else {
                config.model_type.as_str()
            },
            config.num_hidden_layers,
            config.hidden_size,
            config.num_attention_heads,
            config.num_kv_heads(),
            config.vocab_size
        );

        let weights = ModelWeights::load(dir, config.quantization)?;
        Self::from_weights(config, &weights)
    }

    pub fn from_weights(config: LlamaConfig, weights: &ModelWeights) -> Result<Self> {
        let embed_tokens = weights.get_embedding("model.embed_tokens")?;

        let mut layers = Vec::with_capacity(config.num_hidden_layers);
        for i in 0..config.num_hidden_layers {
            layers.push(Self::load_block(&config, weights, i)?);
        }

        let norm = RmsNorm::new(weights.get_array1("model.norm.weight")?, config.rms_norm_eps);

        // Checkpoints without a separate head tie it to the embedding table.
        let lm_head = if weights.contains("lm_head.weight") || weights.contains("lm_head.scales") {
            weights.get_linear("lm_head")?
        } else {
            log::debug!("no lm_head in checkpoint, tying to embedding weights");
            Linear::new(embed_tokens.weight.clone())
        };

        Ok(Self {
            embed_tokens,
            layers,
            norm,
            lm_head,
            config,
        })
    }

    fn load_block(
        config: &LlamaConfig,
        weights: &ModelWeights,
        index: usize,
    ) -> Result<TransformerBlock> {
        let attn = format!("model.layers.{index}.self_attn");
        let mlp = format!("model.layers.{index}.mlp");

        let rope = Rope::new(
            config.head_dim(),
            config.rope_theta,
            config.rope_traditional,
            config.rope_scale(),
        );
        let self_attn = Attention::new(
            weights.get_linear(&format!("{attn}.q_proj"))?,
            weights.get_linear(&format!("{attn}.k_proj"))?,
            weights.get_linear(&format!("{attn}.v_proj"))?,
            weights.get_linear(&format!("{attn}.o_proj"))?,
            rope,
            config.num_attention_heads,
            config.num_kv_heads(),
            config.head_dim(),
        );

        let mlp = SwiGluFeedForward::new(
            weights.get_linear(&format!("{mlp}.gate_proj"))?,
            weights.get_linear(&format!("{mlp}.up_proj"))?,
            weights.get_linear(&format!("{mlp}.down_proj"))?,
        );

        Ok(TransformerBlock {
            self_attn,
            mlp,
            input_layernorm: RmsNorm::new(
                weights.get_array1(&format!("model.layers.{index}.input_layernorm.weight"))?,
                config.rms_norm_eps,
            ),
            post_attention_layernorm: RmsNorm::new(
                weights.get_array1(&format!(
                    "model.layers.{index}.post_attention_layernorm.weight"
                ))?,
                config.rms_norm_eps,
            ),
        })
    }

    pub fn config(&self) -> &LlamaConfig {
        &self.config
    }
}

impl CausalLM for Llama {
    fn forward(&self, tokens: &[u32], caches: &mut [KvCache]) -> Result<Array3<f32>> {
        anyhow::ensure!(
            caches.len() == self.layers.len(),
            "expected {} caches, got {}",
            self.layers.len(),
            caches.len()
        );

        let mut hidden = self.embed_tokens.forward(tokens)?;
        for (layer, cache) in self.layers.iter().zip(caches.iter_mut()) {
            hidden = layer.forward(&hidden, Some(cache))?;
        }

        let hidden = self.norm.forward(&hidden);
        Ok(self.lm_head.forward_3d(&hidden))
    }

    fn num_layers(&self) -> usize {
        self.layers.len()
    }

    fn num_kv_heads(&self) -> usize {
        self.config.num_kv_heads()
    }

    fn head_dim(&self) -> usize {
        self.config.head_dim()
    }

    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }
}
