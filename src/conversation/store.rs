//! In-memory conversation store.
//!
//! History is append-only and lives for the process lifetime; rendering is
//! deterministic and produces the exact text handed to the LLM as context.

use crate::Speaker;
use crate::config::MemoryScope;
use std::collections::HashMap;
use std::sync::Mutex;

/// Key a conversation is filed under, derived from the configured scope.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn new(scope: MemoryScope, channel_id: &str, sender_id: &str) -> Self {
        match scope {
            MemoryScope::PerChannel => Self(format!("channel:{channel_id}")),
            MemoryScope::PerUser => Self(format!("user:{sender_id}")),
        }
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single conversation turn.
#[derive(Debug, Clone)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

/// Append-only conversation histories keyed by user or channel.
///
/// The inner mutex is never held across an await point; callers take it only
/// long enough to push a turn or render the accumulated sequence.
#[derive(Debug, Default)]
pub struct ConversationStore {
    histories: Mutex<HashMap<ConversationKey, Vec<Turn>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn. Turns are never reordered or dropped.
    pub fn append(&self, key: &ConversationKey, speaker: Speaker, text: &str) {
        let mut histories = self.histories.lock().unwrap_or_else(|e| e.into_inner());
        histories.entry(key.clone()).or_default().push(Turn {
            speaker,
            text: text.to_string(),
        });
    }

    /// Render the full history as `"User: ..."` / `"Bot: ..."` lines,
    /// oldest first, newest last. Side-effect free and deterministic.
    pub fn render(&self, key: &ConversationKey) -> String {
        let histories = self.histories.lock().unwrap_or_else(|e| e.into_inner());
        let Some(turns) = histories.get(key) else {
            return String::new();
        };

        let mut out = String::new();
        for turn in turns {
            out.push_str(&format!("{}: {}\n", turn.speaker, turn.text));
        }
        out
    }

    /// Number of turns accumulated under a key.
    pub fn len(&self, key: &ConversationKey) -> usize {
        let histories = self.histories.lock().unwrap_or_else(|e| e.into_inner());
        histories.get(key).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, key: &ConversationKey) -> bool {
        self.len(key) == 0
    }
}
