//! Oracle construction from configuration.
//!
//! The primary provider comes from `provider`; every name listed in
//! `fallback` is appended behind it in a [`FallbackOracle`].

use std::sync::Arc;
use std::time::Duration;
use tasksmith_config::{AppConfig, ProviderConfig};
use tasksmith_core::error::OracleError;
use tasksmith_core::memory::Embedder;
use tasksmith_core::oracle::Oracle;
use crate::anthropic::AnthropicOracle;
use crate::fallback::FallbackOracle;
use crate::openai_compat::{openai_models, OpenAiCompatOracle, OpenAiEmbedder};

/// Build a single named oracle.
pub fn build_provider(name: &str, config: &AppConfig) -> Result<Arc<dyn Oracle>, OracleError> {
    let provider_config = config.providers.get(name);
    let is_primary = name == config.provider;

    let api_key = provider_config
        .and_then(|p| p.api_key.clone())
        .or_else(|| is_primary.then(|| config.api_key.clone()).flatten())
        .or_else(|| (name == "ollama").then(|| "ollama".to_string()))
        .ok_or_else(|| {
            OracleError::NotConfigured(format!(
                "no API key for provider '{name}' (set TASKSMITH_API_KEY or providers.{name}.api_key)"
            ))
        })?;

    let base_url = provider_config
        .and_then(|p| p.api_url.clone())
        .or_else(|| is_primary.then(|| config.api_url.clone()).flatten());

    let timeout = config.request_timeout_secs;

    let oracle: Arc<dyn Oracle> = if name == "anthropic" {
        let mut oracle = AnthropicOracle::new(api_key)
            .with_models(models_for(provider_config, config, true))
            .with_timeout(timeout);
        if let Some(url) = base_url {
            oracle = oracle.with_base_url(url);
        }
        Arc::new(oracle)
    } else {
        let url = base_url.unwrap_or_else(|| default_base_url(name));
        Arc::new(
            OpenAiCompatOracle::new(name, url, api_key)
                .with_models(models_for(provider_config, config, false))
                .with_timeout(timeout),
        )
    };
    Ok(oracle)
}

/// Build the oracle the core loop talks to: the primary provider alone,
/// or a fallback chain when `fallback` names more providers.
pub fn build_oracle(config: &AppConfig) -> Result<Arc<dyn Oracle>, OracleError> {
    let primary = build_provider(&config.provider, config)?;
    if config.fallback.is_empty() {
        return Ok(primary);
    }

    let timeout = Duration::from_secs(config.request_timeout_secs);
    let mut chain = FallbackOracle::new("fallback").add(primary, timeout);
    for name in &config.fallback {
        match build_provider(name, config) {
            Ok(oracle) => chain = chain.add(oracle, timeout),
            Err(e) => tracing::warn!(provider = %name, error = %e, "Skipping fallback provider"),
        }
    }
    Ok(Arc::new(chain))
}

/// Build a network embedder when configured; `None` means use the local one.
pub fn build_embedder(config: &AppConfig) -> Option<Arc<dyn Embedder>> {
    if config.memory.embedding_provider != "openai" {
        return None;
    }
    let openai = config.providers.get("openai");
    let api_key = openai
        .and_then(|p| p.api_key.clone())
        .or_else(|| (config.provider == "openai").then(|| config.api_key.clone()).flatten())?;
    let base_url = openai
        .and_then(|p| p.api_url.clone())
        .unwrap_or_else(|| default_base_url("openai"));
    Some(Arc::new(OpenAiEmbedder::new(
        base_url,
        api_key,
        config.memory.embedding_model.clone(),
        config.memory.embedding_dimensions,
    )))
}

fn models_for(
    provider_config: Option<&ProviderConfig>,
    config: &AppConfig,
    anthropic: bool,
) -> tasksmith_config::TierModels {
    if let Some(models) = provider_config.and_then(|p| p.models.clone()) {
        return models;
    }
    if anthropic {
        config.models.clone()
    } else if config.provider != "anthropic" {
        // the top-level mapping was written for this provider
        config.models.clone()
    } else {
        openai_models()
    }
}

/// Get the default base URL for well-known OpenAI-compatible providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
