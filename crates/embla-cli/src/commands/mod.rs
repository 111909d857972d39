pub mod chat;
pub mod generate;

use anyhow::Result;
use embla::prelude::*;
use embla::sampling::SamplingParams;
use std::path::Path;

/// Loads the model and tokenizer from a checkpoint directory and wraps the
/// model in a generator.
pub fn load_session(weights_dir: &Path) -> Result<(Generator, LoadedTokenizer)> {
    log::info!("loading checkpoint from {:?}", weights_dir);
    let model = Llama::load(weights_dir)?;
    let tokenizer = LoadedTokenizer::load(weights_dir)?;
    Ok((Generator::new(Box::new(model)), tokenizer))
}

pub fn generation_config(
    temperature: f32,
    top_p: f32,
    max_tokens: usize,
    eos_token_id: Option<u32>,
) -> GenerationConfig {
    GenerationConfig {
        max_new_tokens: Some(max_tokens),
        eos_token_id,
        sampling: SamplingParams { temperature, top_p },
    }
}
