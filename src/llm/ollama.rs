//! Ollama generation backend client.

use crate::error::{BackendError, Result};
use serde::{Deserialize, Serialize};

const PROVIDER: &str = "ollama";

/// Client for a local or remote Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: SamplingOptions,
}

/// Sampling options sent with every generation request.
#[derive(Debug, Serialize)]
struct SamplingOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    num_predict: u32,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            num_predict: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaClient {
    pub fn new(http: reqwest::Client, base_url: &str, model: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Check the server is reachable. Returns the server version.
    pub async fn health_check(&self) -> Result<String> {
        let url = format!("{}/api/version", self.base_url);
        let response = self.http.get(&url).send().await.map_err(|source| {
            BackendError::Connect {
                provider: PROVIDER,
                url: self.base_url.clone(),
                source,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                provider: PROVIDER,
                status,
                body: response.text().await.unwrap_or_default(),
            }
            .into());
        }

        let version: VersionResponse =
            response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse {
                    provider: PROVIDER,
                    message: e.to_string(),
                })?;
        Ok(version.version)
    }

    /// List model names available on the server.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.http.get(&url).send().await.map_err(|source| {
            BackendError::Connect {
                provider: PROVIDER,
                url: self.base_url.clone(),
                source,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                provider: PROVIDER,
                status,
                body: response.text().await.unwrap_or_default(),
            }
            .into());
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse {
                provider: PROVIDER,
                message: e.to_string(),
            })?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Fail if the configured model is not present on the server.
    pub async fn verify_model(&self) -> Result<()> {
        let available = self.list_models().await?;
        if available.iter().any(|name| name == &self.model) {
            Ok(())
        } else {
            Err(BackendError::ModelUnavailable {
                model: self.model.clone(),
                available: available.join(", "),
            }
            .into())
        }
    }

    /// Generate a completion for the prompt.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateBody {
            model: &self.model,
            prompt,
            stream: false,
            options: SamplingOptions::default(),
        };

        tracing::debug!(model = %self.model, "generating with ollama");
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|source| BackendError::Connect {
                provider: PROVIDER,
                url: self.base_url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                provider: PROVIDER,
                status,
                body: response.text().await.unwrap_or_default(),
            }
            .into());
        }

        let parsed: GenerateResponse =
            response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse {
                    provider: PROVIDER,
                    message: e.to_string(),
                })?;

        let text = parsed
            .response
            .ok_or(BackendError::InvalidResponse {
                provider: PROVIDER,
                message: "missing 'response' field".into(),
            })?
            .trim()
            .to_string();

        if text.is_empty() {
            return Err(BackendError::EmptyCompletion { provider: PROVIDER }.into());
        }

        tracing::debug!(chars = text.len(), "ollama generation succeeded");
        Ok(text)
    }
}
