mod commands;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;

use embla_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Chat {
            weights_dir,
            temperature,
            top_p,
            max_tokens,
            system,
        } => {
            commands::chat::run(&weights_dir, temperature, top_p, max_tokens, system.as_deref())
                .await
        }

        Commands::Generate {
            weights_dir,
            prompt,
            max_tokens,
            temperature,
            top_p,
        } => {
            commands::generate::run(&weights_dir, prompt.as_deref(), max_tokens, temperature, top_p)
                .await
        }
    }
}
