//! LLaMA 3 Instruct chat template.
//!
//! Format:
//! ```text
//! <|begin_of_text|><|start_header_id|>system<|end_header_id|>
//!
//! {system_message}<|eot_id|><|start_header_id|>user<|end_header_id|>
//!
//! {user_message}<|eot_id|><|start_header_id|>assistant<|end_header_id|>
//!
//! ```

use super::{ChatTemplate, Conversation, Message};

#[derive(Clone, Debug)]
pub struct Llama3Template {
    /// Whether to prepend `<|begin_of_text|>`.
    pub add_bos: bool,
}

impl Default for Llama3Template {
    fn default() -> Self {
        Self { add_bos: true }
    }
}

impl Llama3Template {
    pub fn new() -> Self {
        Self::default()
    }

    const BEGIN_OF_TEXT: &'static str = "<|begin_of_text|>";
    const END_OF_TEXT: &'static str = "<|end_of_text|>";
    const START_HEADER: &'static str = "<|start_header_id|>";
    const END_HEADER: &'static str = "<|end_header_id|>";
    const EOT: &'static str = "<|eot_id|>";

    fn format_message(&self, message: &Message) -> String {
        format!(
            "{}{}{}\n\n{}{}",
            Self::START_HEADER,
            message.role.as_str(),
            Self::END_HEADER,
            message.content,
            Self::EOT
        )
    }
}

impl ChatTemplate for Llama3Template {
    fn apply(&self, conversation: &Conversation) -> String {
        let mut prompt = String::new();
        if self.add_bos {
            prompt.push_str(Self::BEGIN_OF_TEXT);
        }
        for message in conversation.messages() {
            prompt.push_str(&self.format_message(message));
        }
        // Open the assistant turn the model is about to fill in.
        prompt.push_str(Self::START_HEADER);
        prompt.push_str("assistant");
        prompt.push_str(Self::END_HEADER);
        prompt.push_str("\n\n");
        prompt
    }

    fn stop_sequences(&self) -> Vec<String> {
        vec![Self::EOT.to_string(), Self::END_OF_TEXT.to_string()]
    }

    fn default_system_prompt(&self) -> Option<&str> {
        Some("You are a helpful assistant.")
    }
}
