//! Interactive multi-turn chat over a local checkpoint.

use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::Result;
use futures_util::{pin_mut, StreamExt};

use embla::chat::{ChatTemplate, Conversation, Llama3Template};
use embla::tokenizer::LoadedTokenizer;

use super::{generation_config, load_session};

pub async fn run(
    weights_dir: &Path,
    temperature: f32,
    top_p: f32,
    max_tokens: usize,
    system: Option<&str>,
) -> Result<()> {
    let (generator, tokenizer) = load_session(weights_dir)?;
    let template = Llama3Template::new();

    let system = system.or(template.default_system_prompt());
    let mut conversation = match system {
        Some(system) => Conversation::with_system(system),
        None => Conversation::new(),
    };

    let eos_token_id = resolve_stop_token(&template, &tokenizer);
    if eos_token_id.is_none() {
        log::warn!("no stop token resolved; responses will run to the token limit");
    }

    println!("embla chat. Type '/help' for commands, '/quit' to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("You> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break; // EOF
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if input.starts_with('/') {
            match input {
                "/quit" | "/exit" | "/q" => break,
                "/clear" | "/reset" => {
                    conversation.clear();
                    println!("Conversation history cleared.");
                    continue;
                }
                "/help" => {
                    println!("\nCommands:\n  /quit  - Exit\n  /clear - Reset history\n");
                    continue;
                }
                _ => {
                    println!("Unknown command: {}", input);
                    continue;
                }
            }
        }

        conversation.push_user(input);

        // The whole history is re-encoded each turn; caches are rebuilt
        // inside the stream, so cleared history really is forgotten.
        let prompt = template.apply(&conversation);
        let tokens = tokenizer.encode(&prompt)?;

        print!("Assistant> ");
        stdout.flush()?;

        let config = generation_config(temperature, top_p, max_tokens, eos_token_id);
        let stream = generator.stream(tokens, config);
        pin_mut!(stream);

        let mut response = String::new();
        while let Some(token) = stream.next().await {
            let token = match token {
                Ok(token) => token,
                Err(e) => {
                    eprintln!("\n[generation error: {}]", e);
                    break;
                }
            };
            if Some(token.id) == eos_token_id {
                break;
            }
            let text = tokenizer.decode(&[token.id])?;
            print!("{}", text);
            stdout.flush()?;
            response.push_str(&text);
        }
        println!("\n");

        conversation.push_assistant(response.trim());
    }

    Ok(())
}

/// Maps the template's stop sequences onto the tokenizer, falling back to
/// the tokenizer's own EOS.
fn resolve_stop_token(template: &Llama3Template, tokenizer: &LoadedTokenizer) -> Option<u32> {
    template
        .stop_sequences()
        .iter()
        .find_map(|stop| tokenizer.token_to_id(stop))
        .or_else(|| tokenizer.eos_id())
}
