//! Append-only conversation history.

use super::message::{Role, Turn};

/// System prompt seeded into every new conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Eres útil y conciso.";

/// Ordered, append-only conversation history for one session.
///
/// The history is created with exactly one system turn at index 0,
/// which is never removed or reordered. All later turns are appended
/// at the tail; existing turns are never edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    /// Creates a history seeded with the default system prompt.
    pub fn new() -> Self {
        Self::with_system_prompt(DEFAULT_SYSTEM_PROMPT)
    }

    /// Creates a history seeded with the given system prompt.
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::new(Role::System, prompt)],
        }
    }

    /// Appends one turn at the tail.
    ///
    /// Role and content are pre-validated by the caller; the append
    /// itself cannot fail.
    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(Turn::new(role, content));
    }

    /// Returns the current ordered sequence of turns.
    ///
    /// The snapshot is always consistent with the latest completed
    /// append; no partial state is ever visible.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    /// Returns the number of turns, including the seed system turn.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the history holds no turns. In practice this is always
    /// false, since the seed system turn is never removed.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Returns the most recently appended turn.
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}
