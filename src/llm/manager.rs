//! Generation manager: routes requests to the chosen backend.

use crate::config::{LlmConfig, ProviderKind};
use crate::error::{BackendError, Result};
use crate::llm::gemini::GeminiClient;
use crate::llm::ollama::OllamaClient;
use crate::llm::traits::{GenerateRequest, ReplyGenerator};
use anyhow::Context as _;
use std::sync::Arc;

/// Owns the backend clients and resolves the provider per request.
///
/// Provider selection is a per-request strategy choice: a `!ollama` or
/// `!gemini` command parsed upstream overrides the configured default.
pub struct GenerationManager {
    default_provider: ProviderKind,
    ollama: Arc<OllamaClient>,
    gemini: Option<Arc<GeminiClient>>,
}

impl GenerationManager {
    /// Build clients from the LLM configuration.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .with_context(|| "failed to build HTTP client")?;

        let ollama = Arc::new(OllamaClient::new(
            http.clone(),
            &config.ollama_base_url,
            &config.ollama_model,
        ));
        tracing::info!(base_url = %config.ollama_base_url, model = %config.ollama_model, "Ollama provider configured");

        let gemini = match &config.gemini_api_key {
            Some(key) => {
                tracing::info!(model = %config.gemini_model, "Gemini provider configured");
                Some(Arc::new(GeminiClient::new(http, key, &config.gemini_model)))
            }
            None => None,
        };

        if config.default_provider == ProviderKind::Gemini && gemini.is_none() {
            return Err(BackendError::MissingProviderKey("gemini".into()).into());
        }

        Ok(Self {
            default_provider: config.default_provider,
            ollama,
            gemini,
        })
    }

    /// Verify the default backend is reachable. Called once at startup;
    /// a failure here is fatal, a failure later degrades to silence.
    pub async fn startup_check(&self) -> Result<()> {
        match self.default_provider {
            ProviderKind::Ollama => {
                let version = self.ollama.health_check().await?;
                tracing::info!(%version, "connected to Ollama server");
                self.ollama.verify_model().await
            }
            // Gemini has no cheap probe endpoint; key presence was checked at build time.
            ProviderKind::Gemini => Ok(()),
        }
    }

    fn resolve(&self, request: &GenerateRequest) -> ProviderKind {
        request.provider.unwrap_or(self.default_provider)
    }
}

impl ReplyGenerator for GenerationManager {
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        match self.resolve(request) {
            ProviderKind::Ollama => self.ollama.generate(&request.prompt).await,
            ProviderKind::Gemini => match &self.gemini {
                Some(gemini) => gemini.generate(&request.prompt).await,
                None => Err(BackendError::ProviderUnavailable("gemini".into()).into()),
            },
        }
    }
}
