//! Gemini generation backend client (REST `generateContent`).

use crate::error::{BackendError, Result};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

const PROVIDER: &str = "gemini";
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Minimum spacing between consecutive requests.
const RATE_LIMIT_DELAY: std::time::Duration = std::time::Duration::from_secs(2);

/// Client for the Gemini `generateContent` API.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    /// Completion time of the last request, for request spacing.
    last_request: tokio::sync::Mutex<Option<Instant>>,
}

#[derive(Debug, Serialize)]
struct GenerateContentBody<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, api_key: &str, model: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            last_request: tokio::sync::Mutex::new(None),
        }
    }

    /// Sleep long enough to keep at least `RATE_LIMIT_DELAY` between requests.
    async fn apply_rate_limit(&self) {
        let last = self.last_request.lock().await;
        if let Some(last) = *last {
            let elapsed = last.elapsed();
            if elapsed < RATE_LIMIT_DELAY {
                let delay = RATE_LIMIT_DELAY - elapsed;
                tracing::debug!(?delay, "rate limiting gemini request");
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Generate a completion for the prompt.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        self.apply_rate_limit().await;

        let url = format!(
            "{BASE_URL}/models/{model}:generateContent",
            model = self.model
        );
        let body = GenerateContentBody {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        tracing::debug!(model = %self.model, "generating with gemini");
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|source| BackendError::Connect {
                provider: PROVIDER,
                url: BASE_URL.to_string(),
                source,
            })?;

        *self.last_request.lock().await = Some(Instant::now());

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                provider: PROVIDER,
                status,
                body: response.text().await.unwrap_or_default(),
            }
            .into());
        }

        let parsed: GenerateContentResponse =
            response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse {
                    provider: PROVIDER,
                    message: e.to_string(),
                })?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
            .trim()
            .to_string();

        if text.is_empty() {
            return Err(BackendError::EmptyCompletion { provider: PROVIDER }.into());
        }

        tracing::debug!(chars = text.len(), "gemini generation succeeded");
        Ok(text)
    }
}
