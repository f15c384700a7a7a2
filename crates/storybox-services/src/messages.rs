//! Chat message vocabulary for completion requests.

use serde::{Deserialize, Serialize};

/// Message author role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// End-user input.
    User,
    /// Model output (used for few-shot examples).
    Assistant,
}

/// One chat message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

/// Build a system message.
pub fn system(content: impl Into<String>) -> ChatMessage {
    ChatMessage {
        role: Role::System,
        content: content.into(),
    }
}

/// Build a user message.
pub fn user(content: impl Into<String>) -> ChatMessage {
    ChatMessage {
        role: Role::User,
        content: content.into(),
    }
}

/// Build an assistant message.
pub fn assistant(content: impl Into<String>) -> ChatMessage {
    ChatMessage {
        role: Role::Assistant,
        content: content.into(),
    }
}
