//! Promotional message scheduling with an activity-adaptive cooldown.

use crate::character::Character;
use crate::config::RuntimeConfig;
use crate::llm::traits::{GenerateRequest, ReplyGeneratorDyn};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Global promotional scheduling state.
///
/// Guarded by a single lock: activity is recorded from every channel, and
/// the reset on a successful promo must cover all three trigger fields
/// atomically.
#[derive(Debug)]
struct MarketingState {
    /// Messages seen since the last promo (or process start).
    message_count: u32,
    /// Messages seen since the last cooldown-reduction check.
    activity_count: u32,
    last_marketing_time: Option<DateTime<Utc>>,
    /// Current cooldown; starts at the configured base and shrinks toward
    /// the floor as activity accrues.
    cooldown: Duration,
    /// Reset whenever a promo fires; drives the staleness trigger.
    start_time: DateTime<Utc>,
}

/// Decides when to inject a promotional message.
///
/// Two independent triggers, checked only when off cooldown: a volume
/// trigger (enough messages since the last promo) and a staleness trigger
/// (enough time since the last promo). Busier deployments see promos more
/// often: every `activity_threshold` messages the cooldown shrinks by
/// `cooldown_reduction`, floored at `min_cooldown`.
pub struct MarketingScheduler {
    config: Arc<RuntimeConfig>,
    character: Arc<Character>,
    generator: Arc<dyn ReplyGeneratorDyn>,
    state: tokio::sync::Mutex<MarketingState>,
}

impl MarketingScheduler {
    pub fn new(
        config: Arc<RuntimeConfig>,
        character: Arc<Character>,
        generator: Arc<dyn ReplyGeneratorDyn>,
    ) -> Self {
        let cooldown = config.load().marketing.cooldown;
        Self {
            config,
            character,
            generator,
            state: tokio::sync::Mutex::new(MarketingState {
                message_count: 0,
                activity_count: 0,
                last_marketing_time: None,
                cooldown,
                start_time: Utc::now(),
            }),
        }
    }

    /// Record one inbound message. Called exactly once per message,
    /// regardless of which reply path is taken.
    pub async fn record_activity(&self) {
        let config = self.config.load();
        let mut state = self.state.lock().await;

        state.message_count += 1;
        state.activity_count += 1;

        if state.activity_count >= config.marketing.activity_threshold {
            let reduced = state.cooldown - config.marketing.cooldown_reduction;
            state.cooldown = reduced.max(config.marketing.min_cooldown);
            state.activity_count = 0;
            tracing::debug!(
                cooldown_mins = state.cooldown.num_minutes(),
                "marketing cooldown reduced"
            );
        }
    }

    /// Produce a promotional message if the trigger conditions hold.
    ///
    /// State is reset only when generation succeeds; a failed generation
    /// leaves everything untouched so the next message can retry.
    pub async fn maybe_trigger(&self, platform: Option<&str>) -> Option<String> {
        let config = self.config.load();
        if !config.marketing.enabled {
            return None;
        }

        let mut state = self.state.lock().await;
        let now = Utc::now();

        if let Some(last) = state.last_marketing_time {
            if now - last < state.cooldown {
                return None;
            }
        }

        if state.message_count >= config.marketing.message_threshold {
            tracing::info!(
                message_count = state.message_count,
                "marketing trigger: message threshold reached"
            );
        } else if now - state.start_time >= config.marketing.time_threshold {
            tracing::info!(
                elapsed_mins = (now - state.start_time).num_minutes(),
                "marketing trigger: time threshold reached"
            );
        } else {
            return None;
        }

        let prompt = match self.character.marketing_prompt(platform) {
            Ok(prompt) => prompt,
            Err(error) => {
                tracing::error!(%error, "no usable marketing template");
                return None;
            }
        };

        // Lock held across generation: the reset must be atomic with the
        // trigger decision, and concurrent channels must not double-fire.
        let request = GenerateRequest::new(prompt);
        match self.generator.generate(&request).await {
            Ok(text) => {
                let text = text.trim().trim_matches(['"', '\'']).to_string();
                if text.is_empty() {
                    tracing::warn!(stage = "marketing", "empty promo, skipping");
                    return None;
                }
                state.last_marketing_time = Some(now);
                state.message_count = 0;
                state.start_time = now;
                tracing::info!("marketing message generated and timer reset");
                Some(text)
            }
            Err(error) => {
                tracing::warn!(stage = "marketing", %error, "promo generation failed, state unchanged");
                None
            }
        }
    }
}
