use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "embla")]
#[command(about = "Chat and text generation for LLaMA3-family checkpoints", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive multi-turn chat
    Chat {
        /// Checkpoint directory (config.json, tokenizer.json, safetensors)
        weights_dir: PathBuf,

        /// Sampling temperature (0.0 = greedy)
        #[arg(short, long, default_value_t = 1.0)]
        temperature: f32,

        /// Top-P (nucleus) sampling threshold
        #[arg(long, default_value_t = 0.8)]
        top_p: f32,

        /// Maximum tokens per response
        #[arg(short = 'n', long, default_value_t = 512)]
        max_tokens: usize,

        /// System prompt for the session
        #[arg(short, long)]
        system: Option<String>,
    },

    /// One-shot text completion
    Generate {
        /// Checkpoint directory (config.json, tokenizer.json, safetensors)
        weights_dir: PathBuf,

        /// The prompt; omit to generate from the BOS token alone
        prompt: Option<String>,

        /// Maximum tokens to generate
        #[arg(short = 'n', long, default_value_t = 256)]
        max_tokens: usize,

        /// Sampling temperature (0.0 = greedy)
        #[arg(short, long, default_value_t = 1.0)]
        temperature: f32,

        /// Top-P (nucleus) sampling threshold
        #[arg(long, default_value_t = 0.8)]
        top_p: f32,
    },
}
