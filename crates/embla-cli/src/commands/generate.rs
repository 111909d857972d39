//! One-shot text completion.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use futures_util::{pin_mut, StreamExt};

use super::{generation_config, load_session};

pub async fn run(
    weights_dir: &Path,
    prompt: Option<&str>,
    max_tokens: usize,
    temperature: f32,
    top_p: f32,
) -> Result<()> {
    let (generator, tokenizer) = load_session(weights_dir)?;

    let mut tokens = Vec::new();
    if let Some(bos) = tokenizer.bos_id() {
        tokens.push(bos);
    }
    if let Some(prompt) = prompt {
        tokens.extend(tokenizer.encode(prompt)?);
    }
    anyhow::ensure!(
        !tokens.is_empty(),
        "no prompt given and the tokenizer has no BOS token"
    );

    if let Some(prompt) = prompt {
        print!("{}", prompt);
    }
    let mut stdout = std::io::stdout();
    stdout.flush()?;

    let eos_token_id = tokenizer.eos_id();
    let config = generation_config(temperature, top_p, max_tokens, eos_token_id);
    let stream = generator.stream(tokens, config);
    pin_mut!(stream);

    while let Some(token) = stream.next().await {
        let token = token?;
        if Some(token.id) == eos_token_id {
            break;
        }
        print!("{}", tokenizer.decode(&[token.id])?);
        stdout.flush()?;
    }
    println!();

    Ok(())
}
