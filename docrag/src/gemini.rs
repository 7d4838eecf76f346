//! Gemini embedding and generation services over the Generative Language REST API.
//!
//! This module is only available when the `gemini` feature is enabled.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::compose::{GenerationService, PromptPayload};
use crate::embedding::{EmbeddingService, parse_embedding};
use crate::error::{RagError, Result};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The default model for Gemini embeddings.
const DEFAULT_EMBED_MODEL: &str = "gemini-embedding-001";

/// The default model for Gemini text generation.
const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";

const PROVIDER: &str = "Gemini";

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn api_key_from_env() -> Option<String> {
    std::env::var("GOOGLE_API_KEY").ok().filter(|key| !key.is_empty())
}

/// Shared HTTP plumbing of both Gemini services.
#[derive(Clone)]
struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    fn new(api_key: String) -> Self {
        Self { http: reqwest::Client::new(), api_key, base_url: GEMINI_BASE_URL.into() }
    }

    async fn call(
        &self,
        model: &str,
        method: &str,
        body: &Value,
    ) -> std::result::Result<Value, String> {
        let url = format!("{}/models/{model}:{method}", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.pointer("/error/message")?.as_str().map(str::to_string))
                .unwrap_or(body);
            return Err(format!("API returned {status}: {detail}"));
        }

        response.json().await.map_err(|e| format!("failed to parse response: {e}"))
    }
}

/// An [`EmbeddingService`] backed by the Gemini `embedContent` endpoint.
///
/// # Configuration
///
/// - `model` – defaults to `gemini-embedding-001`, or `GEMINI_EMBED_MODEL`
///   when built with [`from_env`](Self::from_env).
/// - `api_key` – from the constructor or the `GOOGLE_API_KEY` environment variable.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::gemini::GeminiEmbeddingService;
///
/// let service = GeminiEmbeddingService::from_env()?;
/// let embedding = service.embed("hello world").await?;
/// ```
pub struct GeminiEmbeddingService {
    client: GeminiClient,
    model: String,
}

impl GeminiEmbeddingService {
    /// Create a new service using the given API key and the default model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::EmbeddingService {
                provider: PROVIDER.into(),
                message: "API key must not be empty".into(),
            });
        }
        Ok(Self { client: GeminiClient::new(api_key), model: DEFAULT_EMBED_MODEL.into() })
    }

    /// Create a new service from `GOOGLE_API_KEY` and `GEMINI_EMBED_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = api_key_from_env().ok_or_else(|| RagError::EmbeddingService {
            provider: PROVIDER.into(),
            message: "GOOGLE_API_KEY environment variable not set".into(),
        })?;
        Ok(Self::new(api_key)?.with_model(env_or("GEMINI_EMBED_MODEL", DEFAULT_EMBED_MODEL)))
    }

    /// Set the embedding model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.client.base_url = base_url.into();
        self
    }
}

/// Pull the vector out of an `embedContent` response.
///
/// Both the single (`embedding.values`) and the list (`embeddings[0].values`)
/// response shapes are accepted.
fn embedding_from_response(body: &Value) -> Result<Vec<f32>> {
    let values =
        body.pointer("/embedding/values").or_else(|| body.pointer("/embeddings/0/values"));
    parse_embedding(0, values)
}

#[async_trait]
impl EmbeddingService for GeminiEmbeddingService {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, model = %self.model, text_len = text.len(), "embedding text");

        let request = json!({ "content": { "parts": [{ "text": text }] } });
        let body = self.client.call(&self.model, "embedContent", &request).await.map_err(
            |message| {
                error!(provider = PROVIDER, error = %message, "embedding request failed");
                RagError::EmbeddingService { provider: PROVIDER.into(), message }
            },
        )?;

        embedding_from_response(&body)
    }
}

/// A [`GenerationService`] backed by the Gemini `generateContent` endpoint.
///
/// The prompt is sent as a single user turn, system block first.
pub struct GeminiGenerationService {
    client: GeminiClient,
    model: String,
}

impl GeminiGenerationService {
    /// Create a new service using the given API key and the default model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::GenerationService {
                provider: PROVIDER.into(),
                message: "API key must not be empty".into(),
            });
        }
        Ok(Self { client: GeminiClient::new(api_key), model: DEFAULT_CHAT_MODEL.into() })
    }

    /// Create a new service from `GOOGLE_API_KEY` and `GEMINI_CHAT_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = api_key_from_env().ok_or_else(|| RagError::GenerationService {
            provider: PROVIDER.into(),
            message: "GOOGLE_API_KEY environment variable not set".into(),
        })?;
        Ok(Self::new(api_key)?.with_model(env_or("GEMINI_CHAT_MODEL", DEFAULT_CHAT_MODEL)))
    }

    /// Set the generation model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.client.base_url = base_url.into();
        self
    }
}

/// Join the text parts of the first candidate.
fn candidate_text(body: &Value) -> String {
    body.pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| parts.iter().filter_map(|p| p.get("text").and_then(Value::as_str)).collect())
        .unwrap_or_default()
}

#[async_trait]
impl GenerationService for GeminiGenerationService {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate(&self, prompt: &PromptPayload) -> Result<String> {
        debug!(provider = PROVIDER, model = %self.model, prompt_len = prompt.user.len(), "generating");

        let request = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt.combined() }] }]
        });
        let body = self.client.call(&self.model, "generateContent", &request).await.map_err(
            |message| {
                error!(provider = PROVIDER, error = %message, "generation request failed");
                RagError::GenerationService { provider: PROVIDER.into(), message }
            },
        )?;

        Ok(candidate_text(&body).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_both_embedding_shapes() {
        let single = json!({ "embedding": { "values": [1.0, 2.0] } });
        let listed = json!({ "embeddings": [{ "values": [3.0] }] });
        assert_eq!(embedding_from_response(&single).unwrap(), vec![1.0, 2.0]);
        assert_eq!(embedding_from_response(&listed).unwrap(), vec![3.0]);
    }

    #[test]
    fn non_numeric_embedding_is_malformed() {
        let body = json!({ "embedding": { "values": [1.0, "two"] } });
        assert!(matches!(
            embedding_from_response(&body),
            Err(RagError::MalformedEmbedding { .. })
        ));
    }

    #[test]
    fn joins_candidate_parts() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Refunds " }, { "text": "[#1]" }] } }]
        });
        assert_eq!(candidate_text(&body), "Refunds [#1]");
        assert_eq!(candidate_text(&json!({})), "");
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(GeminiEmbeddingService::new("").is_err());
        assert!(GeminiGenerationService::new("").is_err());
    }
}
