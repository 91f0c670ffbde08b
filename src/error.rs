//! Top-level error types for Hypebot.

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Character(#[from] CharacterError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("messaging error: {0}")]
    Messaging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors. Fatal at startup, never recovered at runtime.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing required config key: {0}")]
    MissingKey(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Character template loading and substitution errors.
#[derive(Debug, thiserror::Error)]
pub enum CharacterError {
    #[error("templates directory not found: {0}")]
    TemplatesDirMissing(String),

    #[error("character not found: {0}")]
    NotFound(String),

    #[error("no characters available in {0}")]
    Empty(String),

    #[error("character {name} has no {template} template")]
    MissingTemplate { name: String, template: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Generation backend errors (oracle and generator).
///
/// These never propagate past the Gatekeeper / MarketingScheduler boundary:
/// they are logged and degrade to a denial or a skipped promo.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("provider not configured: {0}")]
    ProviderUnavailable(String),

    #[error("missing API key for provider: {0}")]
    MissingProviderKey(String),

    #[error("could not connect to {provider} at {url}: {source}")]
    Connect {
        provider: &'static str,
        url: String,
        source: reqwest::Error,
    },

    #[error("{provider} request failed with status {status}: {body}")]
    Status {
        provider: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("model '{model}' not available; server offers: {available}")]
    ModelUnavailable { model: String, available: String },

    #[error("invalid response from {provider}: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} returned an empty completion")]
    EmptyCompletion { provider: &'static str },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
