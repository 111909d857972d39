//! Tokenizer loading from a checkpoint directory.
//!
//! Wraps a Hugging Face `tokenizer.json`, pulling the BOS/EOS token
//! strings from `tokenizer_config.json` when present. That file stores
//! special tokens either as plain strings or as `{"content": ...}`
//! objects depending on the exporter.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tokenizers::Tokenizer;

pub struct LoadedTokenizer {
    tokenizer: Tokenizer,
    bos_token: Option<String>,
    eos_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenizerConfig {
    bos_token: Option<TokenEntry>,
    eos_token: Option<TokenEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenEntry {
    Plain(String),
    Tagged { content: String },
}

impl TokenEntry {
    fn into_content(self) -> String {
        match self {
            TokenEntry::Plain(s) => s,
            TokenEntry::Tagged { content } => content,
        }
    }
}

impl LoadedTokenizer {
    pub fn load(dir: &Path) -> Result<Self> {
        let tokenizer_path = dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("failed to load tokenizer from {:?}: {}", tokenizer_path, e))?;

        let config_path = dir.join("tokenizer_config.json");
        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read {:?}", config_path))?;
            serde_json::from_str::<TokenizerConfig>(&content)
                .with_context(|| format!("failed to parse {:?}", config_path))?
        } else {
            TokenizerConfig::default()
        };

        Ok(Self {
            tokenizer,
            bos_token: config.bos_token.map(TokenEntry::into_content),
            eos_token: config.eos_token.map(TokenEntry::into_content),
        })
    }

    /// Encodes without adding special tokens; chat templates insert their
    /// own markers as text.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| anyhow!("encoding failed: {}", e))?;
        Ok(encoding.get_ids().to_vec())
    }

    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, false)
            .map_err(|e| anyhow!("decoding failed: {}", e))
    }

    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }

    pub fn bos_token(&self) -> Option<&str> {
        self.bos_token.as_deref()
    }

    pub fn eos_token(&self) -> Option<&str> {
        self.eos_token.as_deref()
    }

    pub fn bos_id(&self) -> Option<u32> {
        self.bos_token
            .as_deref()
            .and_then(|t| self.tokenizer.token_to_id(t))
    }

    pub fn eos_id(&self) -> Option<u32> {
        self.eos_token
            .as_deref()
            .and_then(|t| self.tokenizer.token_to_id(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_with_plain_string_tokens() {
        let config: TokenizerConfig = serde_json::from_str(
            r#"{"bos_token": "<s>", "eos_token": "</s>"}"#,
        )
        .unwrap();
        assert_eq!(config.bos_token.unwrap().into_content(), "<s>");
        assert_eq!(config.eos_token.unwrap().into_content(), "</s>");
    }

    #[test]
    fn test_config_with_tagged_tokens() {
        let config: TokenizerConfig = serde_json::from_str(
            r#"{
                "bos_token": {"content": "<|begin_of_text|>", "lstrip": false},
                "eos_token": {"content": "<|end_of_text|>"}
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.bos_token.unwrap().into_content(),
            "<|begin_of_text|>"
        );
        assert_eq!(config.eos_token.unwrap().into_content(), "<|end_of_text|>");
    }

    #[test]
    fn test_config_with_missing_tokens() {
        let config: TokenizerConfig = serde_json::from_str("{}").unwrap();
        assert!(config.bos_token.is_none());
        assert!(config.eos_token.is_none());
    }

    #[test]
    fn test_load_missing_directory() {
        assert!(LoadedTokenizer::load(Path::new("/nonexistent")).is_err());
    }
}
