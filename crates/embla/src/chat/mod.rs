//! Conversation state and chat prompt formatting.

mod llama3;

pub use llama3::Llama3Template;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered message history for a multi-turn session.
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(system: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system)],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(Message::assistant(content));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drops all messages except a leading system prompt.
    pub fn clear(&mut self) {
        self.messages
            .retain(|message| message.role == Role::System);
        self.messages.truncate(1);
    }
}

/// Renders a conversation into the text prompt a model family expects.
pub trait ChatTemplate {
    /// Formats the full history, ending with the generation prompt for the
    /// assistant's next turn.
    fn apply(&self, conversation: &Conversation) -> String;

    /// Text sequences that mark the end of an assistant turn.
    fn stop_sequences(&self) -> Vec<String>;

    fn default_system_prompt(&self) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_ordering() {
        let mut conv = Conversation::with_system("Be brief.");
        conv.push_user("Hi");
        conv.push_assistant("Hello.");
        conv.push_user("Bye");

        let roles: Vec<Role> = conv.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
    }

    #[test]
    fn test_clear_keeps_system_prompt() {
        let mut conv = Conversation::with_system("Be brief.");
        conv.push_user("Hi");
        conv.push_assistant("Hello.");

        conv.clear();
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.messages()[0].role, Role::System);

        let mut conv = Conversation::new();
        conv.push_user("Hi");
        conv.clear();
        assert!(conv.is_empty());
    }
}
