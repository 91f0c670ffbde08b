//! Conversation history accumulation and rendering.

pub mod store;

pub use store::{ConversationKey, ConversationStore, Turn};
