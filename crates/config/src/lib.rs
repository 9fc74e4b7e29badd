//! Configuration loading, validation, and management for Tasksmith.
//!
//! Loads configuration from `~/.tasksmith/config.toml` with environment
//! variable overrides. Validates all settings at startup. The `[core]`
//! section becomes an immutable [`CoreConfig`] threaded through the core
//! loop at construction time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tasksmith_core::Tier;

/// The root configuration structure.
///
/// Maps directly to `~/.tasksmith/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the primary provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Primary oracle provider ("anthropic", "openai", or any key of `providers`)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Override for the primary provider's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Providers tried in order when the primary fails transiently
    #[serde(default)]
    pub fallback: Vec<String>,

    /// Per-request timeout for oracle calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Tier → model mapping
    #[serde(default)]
    pub models: TierModels,

    /// Core loop limits and thresholds
    #[serde(default)]
    pub core: CoreConfig,

    /// Episode memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Reference tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "anthropic".into()
}
fn default_request_timeout() -> u64 {
    120
}
fn default_true() -> bool {
    true
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("fallback", &self.fallback)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("models", &self.models)
            .field("core", &self.core)
            .field("memory", &self.memory)
            .field("tools", &self.tools)
            .field("logging", &self.logging)
            .field("providers", &self.providers)
            .finish()
    }
}

/// Model names per oracle tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierModels {
    #[serde(default = "default_fast_model")]
    pub fast: String,

    #[serde(default = "default_balanced_model")]
    pub balanced: String,

    #[serde(default = "default_powerful_model")]
    pub powerful: String,
}

fn default_fast_model() -> String {
    "claude-haiku-4-5-20251001".into()
}
fn default_balanced_model() -> String {
    "claude-sonnet-4-6".into()
}
fn default_powerful_model() -> String {
    "claude-opus-4-6".into()
}

impl TierModels {
    pub fn model_for(&self, tier: Tier) -> &str {
        match tier {
            Tier::Fast => &self.fast,
            Tier::Balanced => &self.balanced,
            Tier::Powerful => &self.powerful,
        }
    }
}

impl Default for TierModels {
    fn default() -> Self {
        Self {
            fast: default_fast_model(),
            balanced: default_balanced_model(),
            powerful: default_powerful_model(),
        }
    }
}

/// Loop limits, thresholds and sub-policies for the core loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Upper bound on steps in a plan
    #[serde(default = "default_max_plan_steps")]
    pub max_plan_steps: usize,

    /// Size of the tool subset shown to the planner
    #[serde(default = "default_max_tools_per_plan")]
    pub max_tools_per_plan: usize,

    /// Re-syntheses allowed after the validator rejects a plan
    #[serde(default = "default_repair_attempts")]
    pub repair_attempts: u32,

    /// Extra oracle calls when a plan reply cannot be parsed
    #[serde(default = "default_synthesis_retries")]
    pub synthesis_retries: u32,

    /// Minimum similarity for a past episode to be replayed
    #[serde(default = "default_cache_similarity")]
    pub cache_similarity_threshold: f32,

    /// Minimum quality for a past episode to be replayed
    #[serde(default = "default_cache_quality")]
    pub cache_quality_threshold: f32,

    /// Similar episodes included as planning context
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,

    /// Minimum similarity for an episode to count as related
    #[serde(default = "default_recall_min_similarity")]
    pub recall_min_similarity: f32,

    /// Per-dispatch tool timeout
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,

    /// Re-dispatches of a step that timed out or failed while running
    #[serde(default = "default_step_retries")]
    pub step_retries: u32,

    /// Delay before the first step retry; doubles on each further retry
    #[serde(default = "default_step_retry_backoff")]
    pub step_retry_backoff_ms: u64,

    #[serde(default)]
    pub fast_path: FastPathConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

fn default_max_plan_steps() -> usize {
    5
}
fn default_max_tools_per_plan() -> usize {
    3
}
fn default_repair_attempts() -> u32 {
    1
}
fn default_synthesis_retries() -> u32 {
    1
}
fn default_cache_similarity() -> f32 {
    0.9
}
fn default_cache_quality() -> f32 {
    0.8
}
fn default_recall_limit() -> usize {
    3
}
fn default_recall_min_similarity() -> f32 {
    0.5
}
fn default_step_timeout() -> u64 {
    120
}
fn default_step_retries() -> u32 {
    1
}
fn default_step_retry_backoff() -> u64 {
    250
}

impl CoreConfig {
    /// Most planner calls one task can make. Each validation round (the
    /// first plan plus every repair) may retry an unparsable reply.
    pub fn max_plan_calls(&self) -> u32 {
        (1 + self.repair_attempts) * (1 + self.synthesis_retries)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_plan_steps: default_max_plan_steps(),
            max_tools_per_plan: default_max_tools_per_plan(),
            repair_attempts: default_repair_attempts(),
            synthesis_retries: default_synthesis_retries(),
            cache_similarity_threshold: default_cache_similarity(),
            cache_quality_threshold: default_cache_quality(),
            recall_limit: default_recall_limit(),
            recall_min_similarity: default_recall_min_similarity(),
            step_timeout_secs: default_step_timeout(),
            step_retries: default_step_retries(),
            step_retry_backoff_ms: default_step_retry_backoff(),
            fast_path: FastPathConfig::default(),
            evaluation: EvaluationConfig::default(),
        }
    }
}

/// Word lists that route pure writing requests straight to the writing tool.
///
/// Each entry matches at the start of a word, so `summar` covers
/// "summary" and "summarize".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastPathConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Tool the fast path dispatches to
    #[serde(default = "default_writing_tool")]
    pub writing_tool: String,

    #[serde(default = "default_writing_patterns")]
    pub writing_patterns: Vec<String>,

    /// Any match here disqualifies the fast path
    #[serde(default = "default_search_patterns")]
    pub search_patterns: Vec<String>,
}

fn default_writing_tool() -> String {
    "text_writer".into()
}

fn default_writing_patterns() -> Vec<String> {
    [
        "write", "writ", "draft", "compose", "summar", "essay", "article", "letter",
        "paragraph", "poem", "story", "напиши", "написать", "составь", "сочини", "перескажи",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_search_patterns() -> Vec<String> {
    [
        "find", "search", "look up", "latest", "current", "today", "price", "news", "fetch",
        "http", "найди", "найти", "поищи", "актуальн", "последн", "цен", "курс", "новост",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for FastPathConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            writing_tool: default_writing_tool(),
            writing_patterns: default_writing_patterns(),
            search_patterns: default_search_patterns(),
        }
    }
}

/// Weights of the evaluation score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Score at or above which a usable run counts as a success
    #[serde(default = "default_success_threshold")]
    pub success_threshold: f32,

    /// Credit for a step whose source refused access
    #[serde(default = "default_access_denied_credit")]
    pub access_denied_credit: f32,

    /// Weight of the final step relative to the others
    #[serde(default = "default_final_step_weight")]
    pub final_step_weight: f32,

    /// Subtracted when a plan-fatal failure or cancellation ended the run
    #[serde(default = "default_fatal_penalty")]
    pub fatal_penalty: f32,

    /// Share of the score taken from the oracle's judgement
    #[serde(default = "default_oracle_weight")]
    pub oracle_weight: f32,

    /// Ask the oracle for a judgement at all
    #[serde(default = "default_true")]
    pub use_oracle: bool,
}

fn default_success_threshold() -> f32 {
    0.5
}
fn default_access_denied_credit() -> f32 {
    0.4
}
fn default_final_step_weight() -> f32 {
    2.0
}
fn default_fatal_penalty() -> f32 {
    0.3
}
fn default_oracle_weight() -> f32 {
    0.5
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            success_threshold: default_success_threshold(),
            access_denied_credit: default_access_denied_credit(),
            final_step_weight: default_final_step_weight(),
            fatal_penalty: default_fatal_penalty(),
            oracle_weight: default_oracle_weight(),
            use_oracle: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "file", "memory" or "none"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Episode log path; defaults to `~/.tasksmith/memory/episodes.jsonl`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// "hash" (offline) or "openai"
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
}

fn default_memory_backend() -> String {
    "file".into()
}
fn default_embedding_provider() -> String {
    "hash".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_embedding_dimensions() -> usize {
    256
}

impl MemoryConfig {
    pub fn episode_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("memory").join("episodes.jsonl"))
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: None,
            embedding_provider: default_embedding_provider(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Root for file_manager and text_writer output; defaults to `~/.tasksmith/workspace`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_dir: Option<PathBuf>,

    /// Hosts web_fetch refuses to contact
    #[serde(default = "default_blocked_domains")]
    pub blocked_domains: Vec<String>,

    #[serde(default = "default_search_api_url")]
    pub search_api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_api_key: Option<String>,

    #[serde(default = "default_fetch_max_chars")]
    pub fetch_max_chars: usize,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn default_blocked_domains() -> Vec<String> {
    ["localhost", "127.0.0.1", "0.0.0.0", "169.254.169.254", "metadata.google.internal"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_search_api_url() -> String {
    "https://api.tavily.com/search".into()
}
fn default_fetch_max_chars() -> usize {
    3000
}
fn default_http_timeout() -> u64 {
    15
}

impl ToolsConfig {
    pub fn workspace(&self) -> PathBuf {
        self.workspace_dir
            .clone()
            .unwrap_or_else(AppConfig::workspace_dir)
    }
}

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("workspace_dir", &self.workspace_dir)
            .field("blocked_domains", &self.blocked_domains)
            .field("search_api_url", &self.search_api_url)
            .field("search_api_key", &redact(&self.search_api_key))
            .field("fetch_max_chars", &self.fetch_max_chars)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            workspace_dir: None,
            blocked_domains: default_blocked_domains(),
            search_api_url: default_search_api_url(),
            search_api_key: None,
            fetch_max_chars: default_fetch_max_chars(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Overrides the tier mapping for this provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<TierModels>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("models", &self.models)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.tasksmith/config.toml).
    ///
    /// Environment overrides, highest priority first:
    /// - `TASKSMITH_API_KEY`, `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`
    /// - `TASKSMITH_PROVIDER`
    /// - `TASKSMITH_SEARCH_API_KEY` (falls back to `TAVILY_API_KEY`)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = var("TASKSMITH_PROVIDER") {
            self.provider = provider;
        }

        if self.api_key.is_none() {
            self.api_key = var("TASKSMITH_API_KEY").or_else(|| match self.provider.as_str() {
                "openai" => var("OPENAI_API_KEY"),
                _ => var("ANTHROPIC_API_KEY").or_else(|| var("OPENAI_API_KEY")),
            });
        }

        if self.tools.search_api_key.is_none() {
            self.tools.search_api_key =
                var("TASKSMITH_SEARCH_API_KEY").or_else(|| var("TAVILY_API_KEY"));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tasksmith")
    }

    /// Get the workspace directory path.
    pub fn workspace_dir() -> PathBuf {
        Self::config_dir().join("workspace")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let core = &self.core;
        if core.max_plan_steps == 0 {
            return Err(ConfigError::ValidationError(
                "core.max_plan_steps must be at least 1".into(),
            ));
        }
        if core.max_tools_per_plan == 0 {
            return Err(ConfigError::ValidationError(
                "core.max_tools_per_plan must be at least 1".into(),
            ));
        }

        let unit_fields = [
            ("core.cache_similarity_threshold", core.cache_similarity_threshold),
            ("core.cache_quality_threshold", core.cache_quality_threshold),
            ("core.recall_min_similarity", core.recall_min_similarity),
            ("core.evaluation.success_threshold", core.evaluation.success_threshold),
            ("core.evaluation.access_denied_credit", core.evaluation.access_denied_credit),
            ("core.evaluation.fatal_penalty", core.evaluation.fatal_penalty),
            ("core.evaluation.oracle_weight", core.evaluation.oracle_weight),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be between 0.0 and 1.0"
                )));
            }
        }

        if core.evaluation.final_step_weight <= 0.0 {
            return Err(ConfigError::ValidationError(
                "core.evaluation.final_step_weight must be > 0".into(),
            ));
        }

        if !matches!(self.memory.backend.as_str(), "file" | "memory" | "none") {
            return Err(ConfigError::ValidationError(format!(
                "memory.backend must be one of file, memory, none (got '{}')",
                self.memory.backend
            )));
        }

        if self.memory.embedding_dimensions == 0 {
            return Err(ConfigError::ValidationError(
                "memory.embedding_dimensions must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            api_url: None,
            fallback: vec![],
            request_timeout_secs: default_request_timeout(),
            models: TierModels::default(),
            core: CoreConfig::default(),
            memory: MemoryConfig::default(),
            tools: ToolsConfig::default(),
            logging: LoggingConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
