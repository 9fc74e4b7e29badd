//! Oracle trait — the abstraction over text-generating model backends.
//!
//! An Oracle turns a prompt into text. It is stateless from the caller's
//! point of view, may be slow, and may return malformed structured output,
//! so every caller treats its answer as untrusted input.
//!
//! Implementations: Anthropic Messages API, OpenAI-compatible endpoints,
//! and a fallback chain over both.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::error::OracleError;

/// Cost/quality level selected per call site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Cheap and quick: classification, evaluation.
    Fast,
    /// Planning and writing.
    #[default]
    Balanced,
    /// Reserved for call sites that need the strongest model.
    Powerful,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Fast => "fast",
            Tier::Balanced => "balanced",
            Tier::Powerful => "powerful",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleRequest {
    /// Instructions that frame the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// The prompt text
    pub prompt: String,

    /// Which tier to run on
    #[serde(default)]
    pub tier: Tier,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.2
}

impl OracleRequest {
    pub fn new(prompt: impl Into<String>, tier: Tier) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            tier,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A complete response from an oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleResponse {
    /// The generated text
    pub text: String,

    /// Which model actually responded
    pub model: String,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Oracle trait.
///
/// The core loop calls `complete()` without knowing which backend answers.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// A human-readable name for this oracle (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: OracleRequest) -> Result<OracleResponse, OracleError>;

    /// Health check — can we reach the backend?
    async fn health_check(&self) -> Result<bool, OracleError> {
        Ok(true)
    }
}
