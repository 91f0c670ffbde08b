//! Configuration loading and validation.
//!
//! All knobs are read once into an immutable [`Config`] snapshot. Hot paths
//! never touch the environment; live updates go through
//! [`RuntimeConfig::reload`], which swaps in a fresh snapshot.

use crate::error::{ConfigError, Result};
use arc_swap::ArcSwap;
use chrono::Duration;
use std::collections::HashSet;
use std::sync::Arc;

/// Hypebot configuration snapshot.
#[derive(Debug, Clone)]
pub struct Config {
    /// Per-channel reply gate settings.
    pub gate: GateConfig,

    /// Promotional message scheduling settings.
    pub marketing: MarketingConfig,

    /// Generation backend settings.
    pub llm: LlmConfig,

    /// Channel ids the bot is allowed to speak in. Empty means allow all.
    pub allowed_channels: HashSet<String>,

    /// Conversation memory keying strategy.
    pub memory_scope: MemoryScope,
}

/// How conversation history is keyed.
///
/// Direct-message style deployments want one thread of memory per user;
/// group-chat deployments want shared memory per room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryScope {
    PerUser,
    PerChannel,
}

/// Reply gate thresholds.
#[derive(Debug, Clone, Copy)]
pub struct GateConfig {
    /// Whether normal replies are enabled at all.
    pub enable_replies: bool,

    /// Messages that must accrue on a channel before the gate opens.
    pub min_messages: u32,

    /// Minimum elapsed time since the last sent reply.
    pub min_time: Duration,

    /// Wait reduction applied each time a message arrives during the
    /// cooldown window. Repeated traffic shortens the remaining wait
    /// instead of resetting it.
    pub minus_time: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enable_replies: true,
            min_messages: 3,
            min_time: Duration::minutes(10),
            minus_time: Duration::seconds(60),
        }
    }
}

/// Promotional message scheduling thresholds.
#[derive(Debug, Clone, Copy)]
pub struct MarketingConfig {
    /// Whether promotional messages are enabled.
    pub enabled: bool,

    /// Volume trigger: messages seen since the last promo.
    pub message_threshold: u32,

    /// Staleness trigger: elapsed time since the last promo.
    pub time_threshold: Duration,

    /// Initial cooldown between promos.
    pub cooldown: Duration,

    /// Messages between cooldown-reduction checks.
    pub activity_threshold: u32,

    /// How much the cooldown shrinks per activity threshold reached.
    pub cooldown_reduction: Duration,

    /// Floor the cooldown never shrinks below.
    pub min_cooldown: Duration,
}

impl Default for MarketingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            message_threshold: 5,
            time_threshold: Duration::hours(6),
            cooldown: Duration::hours(6),
            activity_threshold: 10,
            cooldown_reduction: Duration::minutes(12),
            min_cooldown: Duration::hours(1),
        }
    }
}

/// Generation backend configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Default provider when a message carries no provider command.
    pub default_provider: ProviderKind,

    /// Ollama server base URL.
    pub ollama_base_url: String,

    /// Ollama model name.
    pub ollama_model: String,

    /// Gemini API key (from env).
    pub gemini_api_key: Option<String>,

    /// Gemini model name.
    pub gemini_model: String,
}

/// Generation backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    Gemini,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Ollama => write!(f, "ollama"),
            ProviderKind::Gemini => write!(f, "gemini"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "gemini" => Ok(ProviderKind::Gemini),
            other => Err(ConfigError::Invalid(format!(
                "unsupported model provider: {other}"
            ))),
        }
    }
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let gate = GateConfig {
            enable_replies: env_bool("HYPEBOT_ENABLE_REPLIES", true)?,
            min_messages: env_parse("HYPEBOT_MIN_MESSAGES", 3)?,
            min_time: Duration::minutes(env_parse("HYPEBOT_MIN_TIME_MINUTES", 10)?),
            minus_time: Duration::seconds(env_parse("HYPEBOT_MINUS_TIME_SECONDS", 60)?),
        };

        let marketing = MarketingConfig {
            enabled: env_bool("HYPEBOT_ENABLE_MARKETING", true)?,
            message_threshold: env_parse("HYPEBOT_MESSAGE_THRESHOLD", 5)?,
            time_threshold: hours_f64(env_parse("HYPEBOT_TIME_THRESHOLD_HOURS", 6.0)?),
            cooldown: hours_f64(env_parse("HYPEBOT_COOLDOWN_HOURS", 6.0)?),
            activity_threshold: env_parse("HYPEBOT_ACTIVITY_THRESHOLD", 10)?,
            cooldown_reduction: hours_f64(env_parse("HYPEBOT_COOLDOWN_REDUCTION_HOURS", 0.2)?),
            min_cooldown: hours_f64(env_parse("HYPEBOT_MIN_COOLDOWN_HOURS", 1.0)?),
        };

        if marketing.min_cooldown > marketing.cooldown {
            return Err(ConfigError::Invalid(
                "HYPEBOT_MIN_COOLDOWN_HOURS must not exceed HYPEBOT_COOLDOWN_HOURS".into(),
            )
            .into());
        }

        let default_provider = std::env::var("HYPEBOT_MODEL_PROVIDER")
            .unwrap_or_else(|_| "ollama".into())
            .parse()?;

        let llm = LlmConfig {
            default_provider,
            ollama_base_url: std::env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".into()),
            ollama_model: std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.3:latest".into()),
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            gemini_model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-1.5-flash-002".into()),
        };

        if default_provider == ProviderKind::Gemini && llm.gemini_api_key.is_none() {
            return Err(ConfigError::MissingKey("GEMINI_API_KEY".into()).into());
        }

        let allowed_channels = std::env::var("HYPEBOT_ALLOWED_CHANNELS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        let memory_scope = match std::env::var("HYPEBOT_MEMORY_SCOPE")
            .unwrap_or_else(|_| "channel".into())
            .to_ascii_lowercase()
            .as_str()
        {
            "user" => MemoryScope::PerUser,
            "channel" => MemoryScope::PerChannel,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "HYPEBOT_MEMORY_SCOPE must be 'user' or 'channel', got '{other}'"
                ))
                .into());
            }
        };

        Ok(Self {
            gate,
            marketing,
            llm,
            allowed_channels,
            memory_scope,
        })
    }

    /// Whether the bot may speak in the given channel.
    pub fn is_allowed(&self, channel_id: &str) -> bool {
        self.allowed_channels.is_empty() || self.allowed_channels.contains(channel_id)
    }
}

/// Live configuration handle shared across the bot.
///
/// Readers take a cheap snapshot per message; `reload` swaps in a fresh one
/// so allow-list edits take effect without a restart.
pub struct RuntimeConfig {
    inner: ArcSwap<Config>,
}

impl RuntimeConfig {
    pub fn new(config: Config) -> Self {
        Self {
            inner: ArcSwap::from_pointee(config),
        }
    }

    /// Load the current snapshot.
    pub fn load(&self) -> Arc<Config> {
        self.inner.load_full()
    }

    /// Re-read the environment and swap in the fresh snapshot.
    pub fn reload(&self) -> Result<()> {
        let fresh = Config::load()?;
        self.inner.store(Arc::new(fresh));
        tracing::info!("configuration reloaded");
        Ok(())
    }
}

fn hours_f64(hours: f64) -> Duration {
    Duration::milliseconds((hours * 3_600_000.0) as i64)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("could not parse {key}='{raw}'")).into()),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => {
                Err(ConfigError::Invalid(format!("could not parse {key}='{other}' as bool")).into())
            }
        },
        Err(_) => Ok(default),
    }
}
