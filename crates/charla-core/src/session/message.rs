//! Conversation turn types.

use serde::{Deserialize, Serialize};

/// Represents the role of a turn in a conversation.
///
/// Serialized lowercase to match the backend wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-generated turn seeded at session start.
    System,
    /// Turn authored by the user.
    User,
    /// Turn authored by the AI assistant.
    Assistant,
}

/// A single turn in a conversation history.
///
/// Turns are immutable once appended; the history owns them and is the
/// sole writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// The role of the turn author.
    pub role: Role,
    /// The content of the turn.
    pub content: String,
}

impl Turn {
    /// Creates a new turn.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}
