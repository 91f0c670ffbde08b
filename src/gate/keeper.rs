//! Gatekeeper: the serialized per-channel reply decision.

use crate::character::Character;
use crate::config::{ProviderKind, RuntimeConfig};
use crate::conversation::{ConversationKey, ConversationStore};
use crate::gate::throttle::ChannelThrottle;
use crate::llm::traits::{GenerateRequest, RelevanceOracleDyn, ReplyGeneratorDyn};
use crate::{ChannelId, Decision, Speaker, UserId};
use std::sync::Arc;

/// Per-request context carried alongside the raw text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecideContext<'a> {
    /// Originating adapter name, for platform-qualified templates.
    pub platform: Option<&'a str>,
    /// Provider override parsed from a command prefix.
    pub provider: Option<ProviderKind>,
}

/// Produces one allow/deny decision per inbound message, under the
/// channel's exclusive lock.
pub struct Gatekeeper {
    config: Arc<RuntimeConfig>,
    store: Arc<ConversationStore>,
    character: Arc<Character>,
    throttle: ChannelThrottle,
    oracle: Arc<dyn RelevanceOracleDyn>,
    generator: Arc<dyn ReplyGeneratorDyn>,
}

impl Gatekeeper {
    pub fn new(
        config: Arc<RuntimeConfig>,
        store: Arc<ConversationStore>,
        character: Arc<Character>,
        oracle: Arc<dyn RelevanceOracleDyn>,
        generator: Arc<dyn ReplyGeneratorDyn>,
    ) -> Self {
        Self {
            config,
            store,
            character,
            throttle: ChannelThrottle::new(),
            oracle,
            generator,
        }
    }

    /// Decide whether to reply to a message.
    ///
    /// The channel lock is held from the throttle check through generation
    /// and the reset: evaluation-and-reset is one atomic unit per channel,
    /// so messages on one channel are processed strictly in arrival order
    /// while other channels proceed in parallel. Backend failures degrade
    /// to `Decision::Deny` and never propagate; the lock releases on every
    /// exit path.
    pub async fn decide(
        &self,
        channel_id: &ChannelId,
        sender_id: &UserId,
        text: &str,
        context: DecideContext<'_>,
    ) -> Decision {
        let config = self.config.load();
        let key = ConversationKey::new(config.memory_scope, channel_id, sender_id);

        let gate = self.throttle.state(channel_id);
        let mut state = gate.lock().await;

        if !config.gate.enable_replies {
            return Decision::Deny;
        }

        let now = chrono::Utc::now();
        if !state.should_evaluate(&config.gate, now) {
            tracing::debug!(
                channel = %channel_id,
                message_count = state.message_count,
                "reply gate closed"
            );
            return Decision::Deny;
        }

        let history = self.store.render(&key);
        match self.oracle.is_relevant(context.platform, &history).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(channel = %channel_id, "oracle says stay silent");
                return Decision::Deny;
            }
            Err(error) => {
                tracing::warn!(channel = %channel_id, stage = "relevance", %error, "oracle failed, staying silent");
                return Decision::Deny;
            }
        }

        let prompt = match self.character.reply_prompt(context.platform, &history, text) {
            Ok(prompt) => prompt,
            Err(error) => {
                tracing::error!(channel = %channel_id, stage = "prompt", %error, "could not build reply prompt");
                return Decision::Deny;
            }
        };

        let request = GenerateRequest::new(prompt).with_provider(context.provider);
        match self.generator.generate(&request).await {
            Ok(reply) => {
                let reply = reply.trim().to_string();
                if reply.is_empty() {
                    tracing::warn!(channel = %channel_id, stage = "generation", "empty reply, staying silent");
                    return Decision::Deny;
                }
                state.confirm_sent(chrono::Utc::now());
                self.store.append(&key, Speaker::Bot, &reply);
                Decision::Reply(reply)
            }
            Err(error) => {
                tracing::warn!(channel = %channel_id, stage = "generation", %error, "generation failed, staying silent");
                Decision::Deny
            }
        }
    }

    /// Throttle state handle for a channel (used by tests and diagnostics).
    pub fn throttle(&self) -> &ChannelThrottle {
        &self.throttle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, GateConfig, LlmConfig, MarketingConfig, MemoryScope};
    use crate::error::{BackendError, Result};
    use crate::llm::traits::{RelevanceOracle, ReplyGenerator};
    use std::collections::HashMap;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

    fn test_config(gate: GateConfig) -> Arc<RuntimeConfig> {
        Arc::new(RuntimeConfig::new(Config {
            gate,
            marketing: MarketingConfig::default(),
            llm: LlmConfig {
                default_provider: ProviderKind::Ollama,
                ollama_base_url: String::new(),
                ollama_model: String::new(),
                gemini_api_key: None,
                gemini_model: String::new(),
            },
            allowed_channels: HashSet::new(),
            memory_scope: MemoryScope::PerChannel,
        }))
    }

    fn test_character() -> Arc<Character> {
        let mut templates = HashMap::new();
        templates.insert(
            "message_handler".to_string(),
            "{history}\nReply to: {message}".to_string(),
        );
        Arc::new(Character {
            name: "Tester".to_string(),
            username: "tester".to_string(),
            personality: String::new(),
            clients: Vec::new(),
            templates,
        })
    }

    /// Oracle with a fixed verdict that counts invocations.
    struct FixedOracle {
        verdict: bool,
        calls: AtomicU32,
    }

    impl FixedOracle {
        fn relevant() -> Self {
            Self {
                verdict: true,
                calls: AtomicU32::new(0),
            }
        }

        fn irrelevant() -> Self {
            Self {
                verdict: false,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl RelevanceOracle for FixedOracle {
        async fn is_relevant(&self, _platform: Option<&str>, _rendered_history: &str) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.verdict)
        }
    }

    /// Generator returning canned text, optionally slow, optionally failing,
    /// tracking how many calls are in flight at once.
    struct StubGenerator {
        reply: Option<String>,
        delay: std::time::Duration,
        in_flight: AtomicI32,
        max_in_flight: AtomicI32,
    }

    impl StubGenerator {
        fn replying(text: &str) -> Self {
            Self {
                reply: Some(text.to_string()),
                delay: std::time::Duration::ZERO,
                in_flight: AtomicI32::new(0),
                max_in_flight: AtomicI32::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                delay: std::time::Duration::ZERO,
                in_flight: AtomicI32::new(0),
                max_in_flight: AtomicI32::new(0),
            }
        }

        fn slow(text: &str, delay: std::time::Duration) -> Self {
            Self {
                reply: Some(text.to_string()),
                delay,
                in_flight: AtomicI32::new(0),
                max_in_flight: AtomicI32::new(0),
            }
        }
    }

    impl ReplyGenerator for StubGenerator {
        async fn generate(&self, _request: &GenerateRequest) -> Result<String> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            match &self.reply {
                Some(text) => Ok(text.clone()),
                None => Err(BackendError::EmptyCompletion { provider: "stub" }.into()),
            }
        }
    }

    fn keeper(
        gate: GateConfig,
        oracle: Arc<FixedOracle>,
        generator: Arc<StubGenerator>,
    ) -> Gatekeeper {
        Gatekeeper::new(
            test_config(gate),
            Arc::new(ConversationStore::new()),
            test_character(),
            oracle,
            generator,
        )
    }

    fn open_gate() -> GateConfig {
        GateConfig {
            enable_replies: true,
            min_messages: 0,
            min_time: chrono::Duration::zero(),
            minus_time: chrono::Duration::zero(),
        }
    }

    #[tokio::test]
    async fn test_warm_up_denies_even_when_oracle_would_respond() {
        let oracle = Arc::new(FixedOracle::relevant());
        let generator = Arc::new(StubGenerator::replying("hello"));
        let keeper = keeper(
            GateConfig {
                min_messages: 3,
                ..open_gate()
            },
            oracle.clone(),
            generator,
        );

        let channel: ChannelId = Arc::from("c1");
        let user: UserId = Arc::from("u1");

        for _ in 0..3 {
            let decision = keeper
                .decide(&channel, &user, "hi", DecideContext::default())
                .await;
            assert_eq!(decision, Decision::Deny);
        }
        // The oracle was never consulted during warm-up.
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);

        let decision = keeper
            .decide(&channel, &user, "hi again", DecideContext::default())
            .await;
        assert_eq!(decision, Decision::Reply("hello".to_string()));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_oracle_rejection_leaves_counters_untouched() {
        let oracle = Arc::new(FixedOracle::irrelevant());
        let generator = Arc::new(StubGenerator::replying("unused"));
        let keeper = keeper(open_gate(), oracle, generator);

        let channel: ChannelId = Arc::from("c1");
        let user: UserId = Arc::from("u1");
        let decision = keeper
            .decide(&channel, &user, "hi", DecideContext::default())
            .await;
        assert_eq!(decision, Decision::Deny);

        let state = keeper.throttle().state(&channel);
        let state = state.lock().await;
        assert_eq!(state.message_count, 0);
        assert_eq!(state.last_message_time, None);
    }

    #[tokio::test]
    async fn test_generation_failure_denies_without_reset() {
        let oracle = Arc::new(FixedOracle::relevant());
        let generator = Arc::new(StubGenerator::failing());
        let keeper = keeper(open_gate(), oracle, generator);

        let channel: ChannelId = Arc::from("c1");
        let user: UserId = Arc::from("u1");
        let decision = keeper
            .decide(&channel, &user, "hi", DecideContext::default())
            .await;
        assert_eq!(decision, Decision::Deny);

        let state = keeper.throttle().state(&channel);
        let state = state.lock().await;
        assert_eq!(state.last_message_time, None);
    }

    #[tokio::test]
    async fn test_successful_reply_resets_and_records_bot_turn() {
        let oracle = Arc::new(FixedOracle::relevant());
        let generator = Arc::new(StubGenerator::replying("sure thing"));
        let keeper = keeper(open_gate(), oracle, generator);

        let channel: ChannelId = Arc::from("c1");
        let user: UserId = Arc::from("u1");
        let decision = keeper
            .decide(&channel, &user, "hi", DecideContext::default())
            .await;
        assert_eq!(decision, Decision::Reply("sure thing".to_string()));

        let state = keeper.throttle().state(&channel);
        let state = state.lock().await;
        assert_eq!(state.message_count, 0);
        assert!(state.last_message_time.is_some());

        let key = ConversationKey::new(MemoryScope::PerChannel, "c1", "u1");
        assert_eq!(keeper.store.render(&key), "Bot: sure thing\n");
    }

    #[tokio::test]
    async fn test_replies_disabled_denies_before_counting() {
        let oracle = Arc::new(FixedOracle::relevant());
        let generator = Arc::new(StubGenerator::replying("nope"));
        let keeper = keeper(
            GateConfig {
                enable_replies: false,
                min_messages: 3,
                min_time: chrono::Duration::minutes(10),
                minus_time: chrono::Duration::seconds(60),
            },
            oracle,
            generator,
        );

        let channel: ChannelId = Arc::from("c1");
        let user: UserId = Arc::from("u1");
        let decision = keeper
            .decide(&channel, &user, "hi", DecideContext::default())
            .await;
        assert_eq!(decision, Decision::Deny);

        let state = keeper.throttle().state(&channel);
        let state = state.lock().await;
        assert_eq!(state.message_count, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_channel_decisions_never_overlap() {
        let oracle = Arc::new(FixedOracle::relevant());
        let generator = Arc::new(StubGenerator::slow(
            "reply",
            std::time::Duration::from_millis(50),
        ));
        let keeper = Arc::new(keeper(open_gate(), oracle, generator.clone()));

        let channel: ChannelId = Arc::from("c1");
        let user: UserId = Arc::from("u1");

        let mut handles = Vec::new();
        for i in 0..4 {
            let keeper = keeper.clone();
            let channel = channel.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                keeper
                    .decide(&channel, &user, &format!("msg {i}"), DecideContext::default())
                    .await
            }));
        }
        for handle in handles {
            handle.await.expect("decision task panicked");
        }

        // The channel lock serializes evaluation: generation never overlaps.
        assert_eq!(generator.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reset_is_seen_by_queued_decisions() {
        let oracle = Arc::new(FixedOracle::relevant());
        let generator = Arc::new(StubGenerator::slow(
            "first",
            std::time::Duration::from_millis(50),
        ));
        let keeper = Arc::new(keeper(
            GateConfig {
                min_time: chrono::Duration::minutes(10),
                ..open_gate()
            },
            oracle.clone(),
            generator,
        ));

        let channel: ChannelId = Arc::from("c1");
        let user: UserId = Arc::from("u1");

        let mut handles = Vec::new();
        for i in 0..4 {
            let keeper = keeper.clone();
            let channel = channel.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                keeper
                    .decide(&channel, &user, &format!("msg {i}"), DecideContext::default())
                    .await
            }));
        }
        let mut replies = 0;
        for handle in handles {
            if let Decision::Reply(_) = handle.await.expect("decision task panicked") {
                replies += 1;
            }
        }

        // Whichever decision wins the lock replies and resets the throttle.
        // Every queued decision then runs its own check against the fresh
        // state, lands in the cooldown window, and is denied.
        assert_eq!(replies, 1);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);

        let state = keeper.throttle().state(&channel);
        let state = state.lock().await;
        assert_eq!(state.message_count, 3);
        assert!(state.last_message_time.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_distinct_channels_proceed_in_parallel() {
        /// Generator that blocks until two callers are inside it at once.
        struct BarrierGenerator {
            barrier: tokio::sync::Barrier,
        }

        impl ReplyGenerator for BarrierGenerator {
            async fn generate(&self, _request: &GenerateRequest) -> Result<String> {
                // Deadlocks (and times out the test) if calls were serialized.
                self.barrier.wait().await;
                Ok("parallel".to_string())
            }
        }

        let oracle = Arc::new(FixedOracle::relevant());
        let generator = Arc::new(BarrierGenerator {
            barrier: tokio::sync::Barrier::new(2),
        });
        let keeper = Arc::new(Gatekeeper::new(
            test_config(open_gate()),
            Arc::new(ConversationStore::new()),
            test_character(),
            oracle,
            generator,
        ));

        let a = {
            let keeper = keeper.clone();
            tokio::spawn(async move {
                keeper
                    .decide(
                        &Arc::from("chan-a"),
                        &Arc::from("u1"),
                        "hi",
                        DecideContext::default(),
                    )
                    .await
            })
        };
        let b = {
            let keeper = keeper.clone();
            tokio::spawn(async move {
                keeper
                    .decide(
                        &Arc::from("chan-b"),
                        &Arc::from("u2"),
                        "hi",
                        DecideContext::default(),
                    )
                    .await
            })
        };

        let (a, b) = (a.await.expect("task a"), b.await.expect("task b"));
        assert_eq!(a, Decision::Reply("parallel".to_string()));
        assert_eq!(b, Decision::Reply("parallel".to_string()));
    }
}
