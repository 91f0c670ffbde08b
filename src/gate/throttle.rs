//! Message-count and elapsed-time reply throttle.

use crate::ChannelId;
use crate::config::GateConfig;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Per-channel throttle counters.
///
/// All mutation happens while the owning channel's lock is held; the
/// Gatekeeper hands out `Arc<tokio::sync::Mutex<ChannelState>>` guards.
#[derive(Debug, Default)]
pub struct ChannelState {
    /// When the bot last sent a reply on this channel.
    pub last_message_time: Option<DateTime<Utc>>,
    /// Messages seen since the last sent reply.
    pub message_count: u32,
}

impl ChannelState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the counter and timer gates for one inbound message.
    ///
    /// Returns true when the message is eligible for a relevance check.
    /// Denials mutate state: the warm-up gate counts the message, and the
    /// cooldown gate additionally pulls `last_message_time` backwards by
    /// `minus_time` so sustained traffic shortens the remaining wait
    /// instead of resetting it.
    pub fn should_evaluate(&mut self, config: &GateConfig, now: DateTime<Utc>) -> bool {
        if self.message_count < config.min_messages {
            self.message_count += 1;
            return false;
        }

        if let Some(last) = self.last_message_time {
            if now - last < config.min_time {
                self.last_message_time = Some(last - config.minus_time);
                self.message_count += 1;
                return false;
            }
        }

        true
    }

    /// Reset after a reply was actually generated and handed to the caller.
    ///
    /// Never invoked by the gate checks themselves: a relevance rejection or
    /// a failed generation leaves the counters as the checks left them,
    /// preserving the gradual warm-up.
    pub fn confirm_sent(&mut self, now: DateTime<Utc>) {
        self.message_count = 0;
        self.last_message_time = Some(now);
    }
}

/// Lazily-created per-channel throttle states.
///
/// The outer map lock is only ever held for the compute-if-absent lookup,
/// never across an await point; the per-channel mutex is what serializes
/// decisions.
#[derive(Debug, Default)]
pub struct ChannelThrottle {
    states: Mutex<HashMap<ChannelId, Arc<tokio::sync::Mutex<ChannelState>>>>,
}

impl ChannelThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the state for a channel. Race-free: two concurrent
    /// first messages on a channel observe the same state.
    pub fn state(&self, channel_id: &ChannelId) -> Arc<tokio::sync::Mutex<ChannelState>> {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states
            .entry(channel_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(ChannelState::new())))
            .clone()
    }
}
