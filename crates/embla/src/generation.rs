//! Autoregressive token generation.
//!
//! The stream is pull-driven: no forward pass runs until the consumer
//! polls for the next item, so dropping the stream early costs nothing.

use std::time::Instant;

use anyhow::Result;
use async_stream::try_stream;
use futures_core::Stream;
use ndarray::s;

use crate::cache::KvCache;
use crate::models::CausalLM;
use crate::sampling::{sample, SampledToken, SamplingParams};

#[derive(Clone, Debug, Default)]
pub struct GenerationConfig {
    /// Hard cap on emitted tokens; `None` leaves the budget to the consumer.
    pub max_new_tokens: Option<usize>,
    /// Token that ends generation. It is still emitted before the stream
    /// closes so callers can see it.
    pub eos_token_id: Option<u32>,
    pub sampling: SamplingParams,
}

pub struct Generator {
    model: Box<dyn CausalLM>,
}

impl Generator {
    pub fn new(model: Box<dyn CausalLM>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &dyn CausalLM {
        self.model.as_ref()
    }

    /// Streams sampled tokens for `prompt`.
    ///
    /// The first forward pass covers the whole prompt; every later pass
    /// feeds only the previously sampled token, with history supplied by
    /// the per-layer KV caches.
    pub fn stream(
        &self,
        prompt: Vec<u32>,
        config: GenerationConfig,
    ) -> impl Stream<Item = Result<SampledToken>> + '_ {
        try_stream! {
            check_prompt(&prompt)?;

            let mut caches: Vec<KvCache> = (0..self.model.num_layers())
                .map(|_| KvCache::new(self.model.num_kv_heads(), self.model.head_dim()))
                .collect();

            let started = Instant::now();
            let prompt_len = prompt.len();
            let mut window = prompt;
            let mut generated = 0usize;

            loop {
                let step_started = Instant::now();
                let logits = self.model.forward(&window, &mut caches)?;
                let last = logits.dim().1 - 1;
                let next_logits = logits.slice(s![0, last, ..]).to_owned();
                // Free the full logits tensor before waiting on the consumer.
                drop(logits);

                let token = sample(&next_logits, &config.sampling)?;
                log::debug!(
                    "step {}: token {} (p={:.3}) in {:?}",
                    generated,
                    token.id,
                    token.prob,
                    step_started.elapsed()
                );

                yield token;
                generated += 1;

                if config.eos_token_id == Some(token.id) {
                    break;
                }
                if let Some(max) = config.max_new_tokens {
                    if generated >= max {
                        break;
                    }
                }
                window = vec![token.id];
            }

            log::info!(
                "generated {} tokens from a {}-token prompt in {:?}",
                generated,
                prompt_len,
                started.elapsed()
            );
        }
    }
}

fn check_prompt(prompt: &[u32]) -> Result<()> {
    anyhow::ensure!(!prompt.is_empty(), "prompt must contain at least one token");
    Ok(())
}
