//! Collaborator traits for relevance checking and reply generation,
//! with dynamic dispatch companions.

use crate::config::ProviderKind;
use crate::error::Result;
use std::pin::Pin;

/// A single generation request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Fully rendered prompt text.
    pub prompt: String,
    /// Per-request provider choice parsed from a command prefix.
    /// `None` uses the configured default.
    pub provider: Option<ProviderKind>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            provider: None,
        }
    }

    pub fn with_provider(mut self, provider: Option<ProviderKind>) -> Self {
        self.provider = provider;
        self
    }
}

/// Static trait for reply generation backends.
/// Use this for type-safe implementations.
pub trait ReplyGenerator: Send + Sync + 'static {
    /// Generate text for the request. A successful result is never empty;
    /// internal failures surface as errors, not sentinel strings.
    fn generate(
        &self,
        request: &GenerateRequest,
    ) -> impl std::future::Future<Output = Result<String>> + Send;
}

/// Static trait for the relevance oracle consulted before replying.
pub trait RelevanceOracle: Send + Sync + 'static {
    /// Whether the bot should respond given the rendered history.
    /// The platform selects platform-qualified prompt templates.
    /// Callers treat a failure as "not relevant".
    fn is_relevant(
        &self,
        platform: Option<&str>,
        rendered_history: &str,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
}

/// Dynamic trait for runtime polymorphism.
/// Use this when you need `Arc<dyn ReplyGeneratorDyn>`.
pub trait ReplyGeneratorDyn: Send + Sync + 'static {
    fn generate<'a>(
        &'a self,
        request: &'a GenerateRequest,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<String>> + Send + 'a>>;
}

/// Blanket implementation: any ReplyGenerator automatically implements ReplyGeneratorDyn.
impl<T: ReplyGenerator> ReplyGeneratorDyn for T {
    fn generate<'a>(
        &'a self,
        request: &'a GenerateRequest,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(ReplyGenerator::generate(self, request))
    }
}

/// Dynamic trait for runtime polymorphism.
/// Use this when you need `Arc<dyn RelevanceOracleDyn>`.
pub trait RelevanceOracleDyn: Send + Sync + 'static {
    fn is_relevant<'a>(
        &'a self,
        platform: Option<&'a str>,
        rendered_history: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<bool>> + Send + 'a>>;
}

/// Blanket implementation: any RelevanceOracle automatically implements RelevanceOracleDyn.
impl<T: RelevanceOracle> RelevanceOracleDyn for T {
    fn is_relevant<'a>(
        &'a self,
        platform: Option<&'a str>,
        rendered_history: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(RelevanceOracle::is_relevant(self, platform, rendered_history))
    }
}
