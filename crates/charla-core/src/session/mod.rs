//! Session-scoped conversation state.
//!
//! This module contains the conversation history owned by a session,
//! the turn types it stores, and the feature toggles read when an
//! outgoing chat request is composed.

mod history;
mod message;
mod toggles;

pub use history::{ConversationHistory, DEFAULT_SYSTEM_PROMPT};
pub use message::{Role, Turn};
pub use toggles::FeatureToggles;
