//! Per-message orchestration: suppression checks, history, marketing, gate.

use crate::config::{ProviderKind, RuntimeConfig};
use crate::conversation::{ConversationKey, ConversationStore};
use crate::gate::{DecideContext, Gatekeeper};
use crate::marketing::MarketingScheduler;
use crate::{Decision, InboundMessage, Result, Speaker};
use std::sync::Arc;

/// Terminal state for one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No outbound text: self-message, empty text, disallowed channel, or
    /// the gate stayed closed.
    Suppressed,
    /// A generated reply to send.
    Replied(String),
    /// A promotional message to send instead of a reply.
    Promoted(String),
    /// A collaborator error escaped the usual deny-on-failure handling.
    Failed,
}

impl Outcome {
    /// Outbound text, if this outcome carries any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Outcome::Replied(text) | Outcome::Promoted(text) => Some(text),
            Outcome::Suppressed | Outcome::Failed => None,
        }
    }
}

/// Runs the full decision pipeline for each inbound message.
///
/// Each message is an independent unit of work: adapters spawn a task per
/// message and call [`MessageHandler::handle`], so slow generation on one
/// channel never blocks another.
pub struct MessageHandler {
    config: Arc<RuntimeConfig>,
    store: Arc<ConversationStore>,
    marketing: Arc<MarketingScheduler>,
    gatekeeper: Arc<Gatekeeper>,
}

impl MessageHandler {
    pub fn new(
        config: Arc<RuntimeConfig>,
        store: Arc<ConversationStore>,
        marketing: Arc<MarketingScheduler>,
        gatekeeper: Arc<Gatekeeper>,
    ) -> Self {
        Self {
            config,
            store,
            marketing,
            gatekeeper,
        }
    }

    /// Process one message to a terminal outcome. Never panics the caller's
    /// task: unexpected errors are logged and collapse to [`Outcome::Failed`]
    /// with no outbound text. History already appended stays appended.
    pub async fn handle(&self, message: &InboundMessage) -> Outcome {
        match self.process(message).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(
                    channel = %message.channel_id,
                    platform = %message.platform,
                    %error,
                    "message pipeline failed"
                );
                Outcome::Failed
            }
        }
    }

    async fn process(&self, message: &InboundMessage) -> Result<Outcome> {
        if message.from_self {
            return Ok(Outcome::Suppressed);
        }

        let (provider, text) = parse_provider_command(&message.text);
        let text = text.trim();
        if text.is_empty() {
            return Ok(Outcome::Suppressed);
        }

        let config = self.config.load();
        if !config.is_allowed(&message.channel_id) {
            tracing::debug!(channel = %message.channel_id, "channel not allow-listed");
            return Ok(Outcome::Suppressed);
        }

        let channel = message.channel();
        let sender = message.sender();
        let key = ConversationKey::new(config.memory_scope, &channel, &sender);
        self.store.append(&key, Speaker::User, text);

        // Exactly once per message, on every path past the suppression checks.
        self.marketing.record_activity().await;

        // A promo preempts the reply gate for this message.
        let decision = match self.marketing.maybe_trigger(Some(&message.platform)).await {
            Some(promo) => {
                self.store.append(&key, Speaker::Bot, &promo);
                Decision::Promote(promo)
            }
            None => {
                let context = DecideContext {
                    platform: Some(&message.platform),
                    provider,
                };
                self.gatekeeper.decide(&channel, &sender, text, context).await
            }
        };
        let outcome = match decision {
            Decision::Reply(reply) => Outcome::Replied(reply),
            Decision::Promote(promo) => Outcome::Promoted(promo),
            Decision::Deny => Outcome::Suppressed,
        };
        Ok(outcome)
    }
}

/// Strip a leading `!ollama` / `!gemini` provider override from the text.
///
/// The prefix must stand alone as the first word; `!ollamafans` is ordinary
/// text. The override applies to this message only.
fn parse_provider_command(text: &str) -> (Option<ProviderKind>, &str) {
    let trimmed = text.trim_start();
    for (prefix, provider) in [
        ("!ollama", ProviderKind::Ollama),
        ("!gemini", ProviderKind::Gemini),
    ] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return (Some(provider), rest.trim_start());
            }
        }
    }
    (None, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::Character;
    use crate::config::{Config, GateConfig, LlmConfig, MarketingConfig, MemoryScope};
    use crate::llm::traits::{GenerateRequest, RelevanceOracle, ReplyGenerator};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingOracle {
        calls: AtomicU32,
        verdict: bool,
    }

    impl RelevanceOracle for CountingOracle {
        async fn is_relevant(
            &self,
            _platform: Option<&str>,
            _rendered_history: &str,
        ) -> crate::Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.verdict)
        }
    }

    struct FixedGenerator(&'static str);

    impl ReplyGenerator for FixedGenerator {
        async fn generate(&self, _request: &GenerateRequest) -> crate::Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn character() -> Arc<Character> {
        let mut templates = HashMap::new();
        templates.insert(
            "message_handler".to_string(),
            "{history}\nReply to: {message}".to_string(),
        );
        templates.insert("marketing".to_string(), "Promote away.".to_string());
        Arc::new(Character {
            name: "Tester".to_string(),
            username: "tester".to_string(),
            personality: String::new(),
            clients: Vec::new(),
            templates,
        })
    }

    struct Fixture {
        handler: MessageHandler,
        store: Arc<ConversationStore>,
        oracle: Arc<CountingOracle>,
    }

    fn fixture(config: Config, oracle_verdict: bool) -> Fixture {
        let config = Arc::new(RuntimeConfig::new(config));
        let store = Arc::new(ConversationStore::new());
        let character = character();
        let oracle = Arc::new(CountingOracle {
            calls: AtomicU32::new(0),
            verdict: oracle_verdict,
        });
        let marketing = Arc::new(MarketingScheduler::new(
            config.clone(),
            character.clone(),
            Arc::new(FixedGenerator("fresh promo")),
        ));
        let gatekeeper = Arc::new(Gatekeeper::new(
            config.clone(),
            store.clone(),
            character,
            oracle.clone(),
            Arc::new(FixedGenerator("canned reply")),
        ));
        Fixture {
            handler: MessageHandler::new(config, store.clone(), marketing, gatekeeper),
            store,
            oracle,
        }
    }

    fn base_config() -> Config {
        Config {
            gate: GateConfig {
                enable_replies: true,
                min_messages: 0,
                min_time: chrono::Duration::zero(),
                minus_time: chrono::Duration::zero(),
            },
            marketing: MarketingConfig {
                enabled: false,
                ..MarketingConfig::default()
            },
            llm: LlmConfig {
                default_provider: ProviderKind::Ollama,
                ollama_base_url: String::new(),
                ollama_model: String::new(),
                gemini_api_key: None,
                gemini_model: String::new(),
            },
            allowed_channels: HashSet::new(),
            memory_scope: MemoryScope::PerChannel,
        }
    }

    fn message(text: &str) -> InboundMessage {
        InboundMessage {
            id: "m1".to_string(),
            platform: "test".to_string(),
            channel_id: "chan".to_string(),
            sender_id: "alice".to_string(),
            sender_name: "Alice".to_string(),
            text: text.to_string(),
            from_self: false,
            timestamp: chrono::Utc::now(),
        }
    }

    fn key() -> ConversationKey {
        ConversationKey::new(MemoryScope::PerChannel, "chan", "alice")
    }

    #[tokio::test]
    async fn test_own_messages_are_suppressed_without_side_effects() {
        let fx = fixture(base_config(), true);
        let mut msg = message("hello");
        msg.from_self = true;

        assert_eq!(fx.handler.handle(&msg).await, Outcome::Suppressed);
        assert!(fx.store.is_empty(&key()));
        assert_eq!(fx.oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_text_is_suppressed() {
        let fx = fixture(base_config(), true);
        assert_eq!(fx.handler.handle(&message("   ")).await, Outcome::Suppressed);
        assert!(fx.store.is_empty(&key()));
    }

    #[tokio::test]
    async fn test_disallowed_channel_is_suppressed() {
        let mut config = base_config();
        config.allowed_channels.insert("somewhere-else".to_string());
        let fx = fixture(config, true);

        assert_eq!(fx.handler.handle(&message("hi")).await, Outcome::Suppressed);
        assert!(fx.store.is_empty(&key()));
    }

    #[tokio::test]
    async fn test_reply_flow_records_both_turns() {
        let fx = fixture(base_config(), true);
        let outcome = fx.handler.handle(&message("hi there")).await;
        assert_eq!(outcome, Outcome::Replied("canned reply".to_string()));
        assert_eq!(
            fx.store.render(&key()),
            "User: hi there\nBot: canned reply\n"
        );
    }

    #[tokio::test]
    async fn test_denied_reply_is_suppressed_but_history_kept() {
        let fx = fixture(base_config(), false);
        assert_eq!(fx.handler.handle(&message("hi")).await, Outcome::Suppressed);
        // The user turn stays even though nothing was sent.
        assert_eq!(fx.store.render(&key()), "User: hi\n");
    }

    #[tokio::test]
    async fn test_marketing_preempts_the_gatekeeper() {
        let mut config = base_config();
        config.marketing = MarketingConfig {
            enabled: true,
            message_threshold: 1,
            ..MarketingConfig::default()
        };
        let fx = fixture(config, true);

        let outcome = fx.handler.handle(&message("hi")).await;
        assert_eq!(outcome, Outcome::Promoted("fresh promo".to_string()));
        // The gatekeeper (and thus the oracle) never ran for this message.
        assert_eq!(fx.oracle.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.store.render(&key()), "User: hi\nBot: fresh promo\n");
    }

    #[tokio::test]
    async fn test_activity_recorded_exactly_once_per_message() {
        let mut config = base_config();
        config.marketing = MarketingConfig {
            enabled: true,
            message_threshold: 2,
            ..MarketingConfig::default()
        };
        let fx = fixture(config, false);

        // One record per message: the second message reaches the threshold,
        // so a double count would already fire on the first.
        assert_eq!(fx.handler.handle(&message("one")).await, Outcome::Suppressed);
        let outcome = fx.handler.handle(&message("two")).await;
        assert_eq!(outcome, Outcome::Promoted("fresh promo".to_string()));
    }

    #[tokio::test]
    async fn test_provider_prefix_is_stripped_before_history() {
        let fx = fixture(base_config(), true);
        let outcome = fx.handler.handle(&message("!gemini tell me more")).await;
        assert_eq!(outcome, Outcome::Replied("canned reply".to_string()));
        assert_eq!(
            fx.store.render(&key()),
            "User: tell me more\nBot: canned reply\n"
        );
    }

    #[tokio::test]
    async fn test_bare_provider_prefix_is_suppressed() {
        let fx = fixture(base_config(), true);
        assert_eq!(
            fx.handler.handle(&message("!ollama")).await,
            Outcome::Suppressed
        );
        assert!(fx.store.is_empty(&key()));
    }

    #[test]
    fn test_parse_provider_command() {
        assert_eq!(
            parse_provider_command("!ollama hi"),
            (Some(ProviderKind::Ollama), "hi")
        );
        assert_eq!(
            parse_provider_command("!gemini  spaced"),
            (Some(ProviderKind::Gemini), "spaced")
        );
        assert_eq!(parse_provider_command("!ollama"), (Some(ProviderKind::Ollama), ""));
        // Not a standalone word: ordinary text.
        assert_eq!(parse_provider_command("!ollamafans unite"), (None, "!ollamafans unite"));
        assert_eq!(parse_provider_command("plain text"), (None, "plain text"));
    }

    #[test]
    fn test_outcome_text() {
        assert_eq!(Outcome::Replied("a".to_string()).text(), Some("a"));
        assert_eq!(Outcome::Promoted("b".to_string()).text(), Some("b"));
        assert_eq!(Outcome::Suppressed.text(), None);
        assert_eq!(Outcome::Failed.text(), None);
    }
}
