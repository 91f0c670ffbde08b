//! Hypebot: a promotional conversational agent with a per-channel gatekeeper.

pub mod character;
pub mod config;
pub mod conversation;
pub mod error;
pub mod gate;
pub mod handler;
pub mod llm;
pub mod marketing;
pub mod messaging;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Channel identifier type.
pub type ChannelId = Arc<str>;

/// User identifier type.
pub type UserId = Arc<str>;

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Bot,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Speaker::User => write!(f, "User"),
            Speaker::Bot => write!(f, "Bot"),
        }
    }
}

/// The verdict produced for a single inbound message.
///
/// Transient: decisions are returned to the adapter and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Stay silent.
    Deny,
    /// Send a generated reply.
    Reply(String),
    /// Send a promotional message instead of a reply.
    Promote(String),
}

/// Inbound message from any messaging platform, normalized by the adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    /// Adapter name ("discord", "telegram", ...).
    pub platform: String,
    pub channel_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    /// True when the message was authored by this bot (or another bot).
    pub from_self: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl InboundMessage {
    pub fn channel(&self) -> ChannelId {
        Arc::from(self.channel_id.as_str())
    }

    pub fn sender(&self) -> UserId {
        Arc::from(self.sender_id.as_str())
    }
}
