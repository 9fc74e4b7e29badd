//! Oracle and embedder implementations for Tasksmith.
//!
//! All oracles implement `tasksmith_core::Oracle`; `build_oracle` picks one
//! (or a fallback chain) from configuration.

pub mod anthropic;
pub mod fallback;
pub mod openai_compat;
pub mod router;

pub use anthropic::AnthropicOracle;
pub use fallback::FallbackOracle;
pub use openai_compat::{OpenAiCompatOracle, OpenAiEmbedder};
pub use router::{build_embedder, build_oracle, build_provider};

use tasksmith_core::error::OracleError;

pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

pub(crate) fn map_transport_error(e: reqwest::Error) -> OracleError {
    if e.is_timeout() {
        OracleError::Timeout(e.to_string())
    } else {
        OracleError::Network(e.to_string())
    }
}

/// Map a non-200 HTTP status onto the oracle error taxonomy.
pub(crate) fn map_status(status: u16, model: &str, body: String) -> OracleError {
    match status {
        429 => OracleError::RateLimited { retry_after_secs: 5 },
        401 | 403 => OracleError::AuthenticationFailed("API key rejected".into()),
        404 => OracleError::ModelNotFound(model.to_string()),
        _ => OracleError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(map_status(429, "m", String::new()).is_transient());
        assert!(map_status(503, "m", String::new()).is_transient());
        assert!(!map_status(401, "m", String::new()).is_transient());
        assert!(matches!(map_status(404, "gpt-x", String::new()), OracleError::ModelNotFound(m) if m == "gpt-x"));
    }
}
