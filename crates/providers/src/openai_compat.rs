//! OpenAI-compatible oracle and embedder.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any endpoint exposing
//! `/chat/completions` and `/embeddings`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tasksmith_config::TierModels;
use tasksmith_core::error::{MemoryError, OracleError};
use tasksmith_core::memory::Embedder;
use tasksmith_core::oracle::{Oracle, OracleRequest, OracleResponse, Usage};
use tracing::{debug, warn};

/// Tier mapping used when an OpenAI-compatible provider has none configured.
pub fn openai_models() -> TierModels {
    TierModels {
        fast: "gpt-4o-mini".into(),
        balanced: "gpt-4o".into(),
        powerful: "gpt-4.1".into(),
    }
}

/// An OpenAI-compatible oracle.
pub struct OpenAiCompatOracle {
    name: String,
    base_url: String,
    api_key: String,
    models: TierModels,
    client: reqwest::Client,
}

impl OpenAiCompatOracle {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            models: openai_models(),
            client: crate::http_client(120),
        }
    }

    /// Create an OpenAI oracle (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an OpenRouter oracle (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Create an Ollama oracle (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    pub fn with_models(mut self, models: TierModels) -> Self {
        self.models = models;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.client = crate::http_client(timeout_secs);
        self
    }

    fn request_body(&self, request: &OracleRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ApiMessage {
                role: "system".into(),
                content: system.clone(),
            });
        }
        messages.push(ApiMessage {
            role: "user".into(),
            content: request.prompt.clone(),
        });
        ChatRequest {
            model: self.models.model_for(request.tier).to_string(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }

    fn into_oracle_response(resp: ChatResponse) -> Result<OracleResponse, OracleError> {
        let text = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(OracleError::EmptyResponse);
        }
        Ok(OracleResponse {
            text,
            model: resp.model,
            usage: resp.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}

#[async_trait]
impl Oracle for OpenAiCompatOracle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: OracleRequest) -> Result<OracleResponse, OracleError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request);

        debug!(oracle = %self.name, model = %body.model, tier = %request.tier, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(crate::map_transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Oracle returned error");
            return Err(crate::map_status(status, &body.model, error_body));
        }

        let api_resp: ChatResponse = response.json().await.map_err(|e| OracleError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        Self::into_oracle_response(api_resp)
    }

    async fn health_check(&self) -> Result<bool, OracleError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(crate::map_transport_error)?;
        Ok(response.status().is_success())
    }
}

/// Embeddings over an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
            client: crate::http_client(30),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: self.model.clone(),
            input: vec![text.to_string()],
            encoding_format: "float".into(),
            dimensions: Some(self.dimensions),
        };

        debug!(model = %self.model, "Sending embedding request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(MemoryError::EmbeddingFailed(format!(
                "embedding endpoint returned {status}: {error_body}"
            )));
        }

        let api_resp: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(format!("Failed to parse embedding response: {e}")))?;

        api_resp
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| MemoryError::EmbeddingFailed("embedding response had no data".into()))
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
    encoding_format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
