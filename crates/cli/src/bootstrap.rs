//! Wiring: build the oracle, memory, tools and core loop from configuration.

use async_trait::async_trait;
use std::sync::Arc;
use tasksmith_agent::CoreLoop;
use tasksmith_config::{AppConfig, MemoryConfig};
use tasksmith_core::error::OracleError;
use tasksmith_core::memory::{Embedder, MemoryStore};
use tasksmith_core::oracle::{Oracle, OracleRequest, OracleResponse};
use tasksmith_core::tool::ToolRegistry;
use tasksmith_memory::{FileStore, HashEmbedder, InMemoryStore, NoopStore};
use tasksmith_providers::{build_embedder, build_oracle};
use tasksmith_tools::default_registry;

pub struct Runtime {
    pub core: Arc<CoreLoop>,
    pub memory: Arc<dyn MemoryStore>,
}

/// Build everything a task run needs. Fails when no oracle is configured.
pub fn runtime(config: &AppConfig) -> Result<Runtime, Box<dyn std::error::Error>> {
    let oracle = build_oracle(config)?;
    let tools = Arc::new(default_registry(oracle.clone(), &config.tools));
    let memory = memory_store(&config.memory);

    tracing::info!(
        oracle = oracle.name(),
        tools = tools.len(),
        memory = memory.name(),
        "Runtime ready"
    );

    let core = CoreLoop::new(oracle, tools, memory.clone(), Arc::new(config.core.clone()))
        .with_embedder(embedder(config));
    Ok(Runtime {
        core: Arc::new(core),
        memory,
    })
}

pub fn memory_store(config: &MemoryConfig) -> Arc<dyn MemoryStore> {
    match config.backend.as_str() {
        "memory" => Arc::new(InMemoryStore::new()),
        "none" => Arc::new(NoopStore),
        _ => Arc::new(FileStore::open(config.episode_path())),
    }
}

/// The network embedder when configured, else the local hashing one.
pub fn embedder(config: &AppConfig) -> Arc<dyn Embedder> {
    build_embedder(config)
        .unwrap_or_else(|| Arc::new(HashEmbedder::new(config.memory.embedding_dimensions)))
}

/// The tool registry for listing. Works without credentials: tools that
/// need the oracle are registered against one that always refuses.
pub fn registry(config: &AppConfig) -> ToolRegistry {
    default_registry(oracle(config), &config.tools)
}

/// The configured oracle, or one that refuses every call with the
/// configuration error.
pub fn oracle(config: &AppConfig) -> Arc<dyn Oracle> {
    build_oracle(config).unwrap_or_else(|e| Arc::new(Unconfigured(e.to_string())))
}

struct Unconfigured(String);

#[async_trait]
impl Oracle for Unconfigured {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn complete(&self, _request: OracleRequest) -> Result<OracleResponse, OracleError> {
        Err(OracleError::NotConfigured(self.0.clone()))
    }
}
