//! OpenAI embedding and chat completion services.
//!
//! This module is only available when the `openai` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::compose::{GenerationService, PromptPayload};
use crate::embedding::{EmbeddingService, parse_embedding};
use crate::error::{RagError, Result};

/// The default OpenAI API base URL.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";

/// The default model for OpenAI chat completions.
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

const PROVIDER: &str = "OpenAI";

fn api_key_from_env() -> Option<String> {
    std::env::var("OPENAI_API_KEY").ok().filter(|key| !key.is_empty())
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Send `body` to `url` and return the JSON response, describing failures as
/// plain messages for the caller to wrap.
async fn post_json<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &B,
) -> std::result::Result<Value, String> {
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(body)
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail =
            serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
        return Err(format!("API returned {status}: {detail}"));
    }

    response.json().await.map_err(|e| format!("failed to parse response: {e}"))
}

/// An [`EmbeddingService`] backed by the OpenAI embeddings API.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `api_key` – from the constructor or the `OPENAI_API_KEY` environment variable.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::openai::OpenAIEmbeddingService;
///
/// let service = OpenAIEmbeddingService::new("sk-...")?;
/// let embedding = service.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingService {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: Option<usize>,
}

impl OpenAIEmbeddingService {
    /// Create a new service with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::EmbeddingService {
                provider: PROVIDER.into(),
                message: "API key must not be empty".into(),
            });
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.into(),
            model: DEFAULT_EMBED_MODEL.into(),
            dimensions: None,
        })
    }

    /// Create a new service using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = api_key_from_env().ok_or_else(|| RagError::EmbeddingService {
            provider: PROVIDER.into(),
            message: "OPENAI_API_KEY environment variable not set".into(),
        })?;
        Self::new(api_key)
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Ask the API to truncate vectors to `dims` elements.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = Some(dims);
        self
    }

    /// Point the service at an OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

/// Pull the first vector out of an embeddings response.
fn embedding_from_response(body: &Value) -> Result<Vec<f32>> {
    parse_embedding(0, body.pointer("/data/0/embedding"))
}

#[async_trait]
impl EmbeddingService for OpenAIEmbeddingService {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, model = %self.model, text_len = text.len(), "embedding text");

        let request =
            EmbeddingRequest { model: &self.model, input: text, dimensions: self.dimensions };
        let url = format!("{}/embeddings", self.base_url);
        let body = post_json(&self.client, &url, &self.api_key, &request).await.map_err(|message| {
            error!(provider = PROVIDER, error = %message, "embedding request failed");
            RagError::EmbeddingService { provider: PROVIDER.into(), message }
        })?;

        embedding_from_response(&body)
    }
}

/// A [`GenerationService`] backed by the OpenAI chat completions API.
///
/// The prompt's system block is sent as the system message and its user
/// block as the single user message.
pub struct OpenAIGenerationService {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OpenAIGenerationService {
    /// Create a new service with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::GenerationService {
                provider: PROVIDER.into(),
                message: "API key must not be empty".into(),
            });
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.into(),
            model: DEFAULT_CHAT_MODEL.into(),
            temperature: 0.2,
        })
    }

    /// Create a new service using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = api_key_from_env().ok_or_else(|| RagError::GenerationService {
            provider: PROVIDER.into(),
            message: "OPENAI_API_KEY environment variable not set".into(),
        })?;
        Self::new(api_key)
    }

    /// Set the chat model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Point the service at an OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

fn completion_text(body: &Value) -> Result<String> {
    let content = body.pointer("/choices/0/message/content").and_then(Value::as_str);
    content.map(str::to_string).ok_or_else(|| RagError::GenerationService {
        provider: PROVIDER.into(),
        message: "response has no message content".into(),
    })
}

#[async_trait]
impl GenerationService for OpenAIGenerationService {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate(&self, prompt: &PromptPayload) -> Result<String> {
        debug!(provider = PROVIDER, model = %self.model, prompt_len = prompt.user.len(), "generating");

        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: &prompt.system },
                ChatMessage { role: "user", content: &prompt.user },
            ],
            temperature: self.temperature,
        };
        let url = format!("{}/chat/completions", self.base_url);
        let body = post_json(&self.client, &url, &self.api_key, &request).await.map_err(|message| {
            error!(provider = PROVIDER, error = %message, "generation request failed");
            RagError::GenerationService { provider: PROVIDER.into(), message }
        })?;

        completion_text(&body)
    }
}
