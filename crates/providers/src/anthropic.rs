//! Anthropic native oracle implementation.
//!
//! Uses Anthropic's Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as a top-level field
//! - Tier resolved to a model name through [`TierModels`]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tasksmith_config::TierModels;
use tasksmith_core::error::OracleError;
use tasksmith_core::oracle::{Oracle, OracleRequest, OracleResponse, Usage};
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic Messages API oracle.
pub struct AnthropicOracle {
    name: String,
    base_url: String,
    api_key: String,
    models: TierModels,
    client: reqwest::Client,
}

impl AnthropicOracle {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            models: TierModels::default(),
            client: crate::http_client(120),
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_models(mut self, models: TierModels) -> Self {
        self.models = models;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.client = crate::http_client(timeout_secs);
        self
    }

    fn request_body(&self, request: &OracleRequest) -> MessagesRequest {
        MessagesRequest {
            model: self.models.model_for(request.tier).to_string(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system.clone(),
            messages: vec![ApiMessage {
                role: "user".into(),
                content: request.prompt.clone(),
            }],
        }
    }

    fn into_oracle_response(resp: MessagesResponse) -> Result<OracleResponse, OracleError> {
        let text = resp
            .content
            .iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text.as_str()),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if text.trim().is_empty() {
            return Err(OracleError::EmptyResponse);
        }

        Ok(OracleResponse {
            text,
            model: resp.model,
            usage: Some(Usage {
                prompt_tokens: resp.usage.input_tokens,
                completion_tokens: resp.usage.output_tokens,
                total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
            }),
        })
    }
}

#[async_trait]
impl Oracle for AnthropicOracle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: OracleRequest) -> Result<OracleResponse, OracleError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.request_body(&request);

        debug!(oracle = "anthropic", model = %body.model, tier = %request.tier, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(crate::map_transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(crate::map_status(status, &body.model, error_body));
        }

        let api_resp: MessagesResponse =
            response
                .json()
                .await
                .map_err(|e| OracleError::ApiError {
                    status_code: 200,
                    message: format!("Failed to parse Anthropic response: {e}"),
                })?;

        Self::into_oracle_response(api_resp)
    }

    async fn health_check(&self) -> Result<bool, OracleError> {
        let request = OracleRequest::new("hi", tasksmith_core::Tier::Fast).with_max_tokens(1);
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.request_body(&request))
            .send()
            .await
            .map_err(crate::map_transport_error)?;

        // 401 = bad key, anything else means the endpoint is reachable
        Ok(response.status().as_u16() != 401)
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<ResponseBlock>,
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasksmith_core::Tier;

    #[test]
    fn constructor_with_base_url() {
        let oracle = AnthropicOracle::new("sk-ant-test").with_base_url("https://custom.proxy.com/");
        assert_eq!(oracle.name(), "anthropic");
        assert_eq!(oracle.base_url, "https://custom.proxy.com");
    }

    #[test]
    fn request_body_maps_tier_to_model() {
        let oracle = AnthropicOracle::new("k");
        let body = oracle.request_body(
            &OracleRequest::new("classify", Tier::Fast).with_system("Answer with one word"),
        );
        assert_eq!(body.model, "claude-haiku-4-5-20251001");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["system"], "Answer with one word");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "classify");
    }

    #[test]
    fn system_omitted_when_absent() {
        let oracle = AnthropicOracle::new("k");
        let json = serde_json::to_value(oracle.request_body(&OracleRequest::new("x", Tier::Balanced))).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["model"], "claude-sonnet-4-6");
    }

    #[test]
    fn parse_text_response() {
        let resp: MessagesResponse = serde_json::from_str(
            r#"{
                "id": "msg_01",
                "model": "claude-sonnet-4-6",
                "content": [
                    {"type": "thinking", "thinking": "hmm"},
                    {"type": "text", "text": "research"}
                ],
                "usage": {"input_tokens": 10, "output_tokens": 5},
                "stop_reason": "end_turn"
            }"#,
        )
        .unwrap();

        let out = AnthropicOracle::into_oracle_response(resp).unwrap();
        assert_eq!(out.text, "research");
        assert_eq!(out.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn empty_text_is_an_error() {
        let resp: MessagesResponse = serde_json::from_str(
            r#"{"model": "m", "content": [], "usage": {"input_tokens": 1, "output_tokens": 0}}"#,
        )
        .unwrap();
        assert!(matches!(
            AnthropicOracle::into_oracle_response(resp),
            Err(OracleError::EmptyResponse)
        ));
    }
}
