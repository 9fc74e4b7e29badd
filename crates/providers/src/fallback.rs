//! Oracle fallback — ordered retry chain with per-oracle timeouts.
//!
//! When an oracle fails transiently (timeout, rate limit, network, 5xx),
//! the request moves on to the next oracle in the chain. Permanent errors
//! such as a bad key are returned at once.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tasksmith_core::error::OracleError;
use tasksmith_core::oracle::{Oracle, OracleRequest, OracleResponse};
use tracing::{info, warn};

/// An oracle that wraps an ordered list of oracles and falls back on failure.
pub struct FallbackOracle {
    name: String,
    chain: Vec<FallbackEntry>,
}

struct FallbackEntry {
    oracle: Arc<dyn Oracle>,
    timeout: Duration,
}

impl FallbackOracle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain: Vec::new(),
        }
    }

    /// Add an oracle to the chain with a custom timeout.
    pub fn add(mut self, oracle: Arc<dyn Oracle>, timeout: Duration) -> Self {
        self.chain.push(FallbackEntry { oracle, timeout });
        self
    }

    /// Add an oracle with the default timeout (120s).
    pub fn add_default(self, oracle: Arc<dyn Oracle>) -> Self {
        self.add(oracle, Duration::from_secs(120))
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

#[async_trait]
impl Oracle for FallbackOracle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: OracleRequest) -> Result<OracleResponse, OracleError> {
        let mut last_error = OracleError::NotConfigured("No oracles in fallback chain".into());

        for (i, entry) in self.chain.iter().enumerate() {
            let oracle_name = entry.oracle.name().to_string();

            info!(
                oracle = %oracle_name,
                attempt = i + 1,
                total = self.chain.len(),
                "Fallback: trying oracle"
            );

            match tokio::time::timeout(entry.timeout, entry.oracle.complete(request.clone())).await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) if !e.is_transient() => {
                    warn!(oracle = %oracle_name, error = %e, "Fallback: permanent error, giving up");
                    return Err(e);
                }
                Ok(Err(e)) => {
                    warn!(oracle = %oracle_name, error = %e, "Fallback: oracle failed, trying next");
                    last_error = e;
                }
                Err(_) => {
                    warn!(
                        oracle = %oracle_name,
                        timeout_secs = entry.timeout.as_secs(),
                        "Fallback: oracle timed out, trying next"
                    );
                    last_error = OracleError::Timeout(format!(
                        "Oracle '{}' timed out after {}s",
                        oracle_name,
                        entry.timeout.as_secs()
                    ));
                }
            }
        }

        Err(last_error)
    }

    async fn health_check(&self) -> Result<bool, OracleError> {
        for entry in &self.chain {
            if let Ok(true) = entry.oracle.health_check().await {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
