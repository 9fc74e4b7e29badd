//! Error types for the Tasksmith domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each stage of the core loop has its own error type so callers can decide
//! locally whether to recover (fallback category, one re-synthesis, skip a
//! dependent step) or escalate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all Tasksmith operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Oracle errors ---
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Pipeline stage errors ---
    #[error("Classification error: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Validation failure: {0}")]
    Validation(#[from] ValidationFailure),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Task cancelled")]
    Cancelled,

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Oracle ---

#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Oracle not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Empty response from oracle")]
    EmptyResponse,
}

impl OracleError {
    /// Transient errors are worth retrying (possibly on another oracle);
    /// permanent ones will fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            OracleError::RateLimited { .. }
            | OracleError::Timeout(_)
            | OracleError::Network(_)
            | OracleError::EmptyResponse => true,
            OracleError::ApiError { status_code, .. } => *status_code >= 500,
            OracleError::AuthenticationFailed(_)
            | OracleError::ModelNotFound(_)
            | OracleError::NotConfigured(_) => false,
        }
    }
}

// --- Tools ---

/// What went wrong inside a tool dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// The tool is not registered.
    NotFound,
    /// Inputs did not match the declared schema.
    InvalidArguments,
    /// The remote side refused access (HTTP 401/403, robots, paywall).
    AccessDenied,
    /// The dispatch exceeded its time budget.
    Timeout,
    /// A required upstream data source is down or unconfigured.
    Unavailable,
    /// The tool ran and reported a failure.
    ExecutionFailed,
    /// The safety validator refused the inputs.
    SafetyBlocked,
    /// The task was cancelled while the step was outstanding.
    Cancelled,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorKind::NotFound => "not_found",
            ToolErrorKind::InvalidArguments => "invalid_arguments",
            ToolErrorKind::AccessDenied => "access_denied",
            ToolErrorKind::Timeout => "timeout",
            ToolErrorKind::Unavailable => "unavailable",
            ToolErrorKind::ExecutionFailed => "execution_failed",
            ToolErrorKind::SafetyBlocked => "safety_blocked",
            ToolErrorKind::Cancelled => "cancelled",
        }
    }

    /// Plan-fatal failures halt the rest of the plan; everything else only
    /// takes out the steps that need the failed output.
    pub fn is_plan_fatal(&self) -> bool {
        matches!(self, ToolErrorKind::Unavailable | ToolErrorKind::Cancelled)
    }

    /// Failures that may clear up on a second dispatch. A refusal or a
    /// missing source will not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolErrorKind::Timeout | ToolErrorKind::ExecutionFailed)
    }
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Tool '{tool_name}' failed ({kind}): {message}")]
pub struct ToolError {
    pub tool_name: String,
    pub kind: ToolErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(tool_name: impl Into<String>, kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(tool_name: impl Into<String>) -> Self {
        let tool_name = tool_name.into();
        let message = format!("no tool named '{tool_name}' is registered");
        Self::new(tool_name, ToolErrorKind::NotFound, message)
    }

    pub fn invalid_arguments(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(tool_name, ToolErrorKind::InvalidArguments, message)
    }

    pub fn access_denied(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(tool_name, ToolErrorKind::AccessDenied, message)
    }

    pub fn unavailable(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(tool_name, ToolErrorKind::Unavailable, message)
    }

    pub fn execution_failed(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(tool_name, ToolErrorKind::ExecutionFailed, message)
    }

    pub fn timeout(tool_name: impl Into<String>, timeout_secs: u64) -> Self {
        Self::new(
            tool_name,
            ToolErrorKind::Timeout,
            format!("timed out after {timeout_secs}s"),
        )
    }
}

// --- Memory ---

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
}

// --- Classification ---

#[derive(Debug, Clone, Error)]
pub enum ClassificationError {
    #[error("oracle call failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("unrecognised category in response: {0:?}")]
    Unparsable(String),
}

// --- Synthesis ---

/// Why the oracle's answer could not be turned into a plan.
#[derive(Debug, Clone, Error)]
pub enum SynthesisError {
    #[error("oracle call failed: {0}")]
    Oracle(#[from] OracleError),

    /// The payload is not well-formed JSON even after normalization.
    #[error("malformed plan payload: {0}")]
    Parse(String),

    /// Well-formed JSON with the wrong shape.
    #[error("plan payload does not match the plan schema: {0}")]
    Schema(String),

    #[error("plan uses tool '{tool}' outside the offered set {allowed:?}")]
    UnknownTool { tool: String, allowed: Vec<String> },
}

// --- Validation ---

/// A static check the plan failed. Step numbers in messages are 1-based,
/// matching the ids the oracle writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("step {} uses unregistered tool '{tool}'", .step + 1)]
    UnknownTool { step: usize, tool: String },

    #[error("step {} ({tool}) is missing required input '{input}'", .step + 1)]
    MissingInput {
        step: usize,
        tool: String,
        input: String,
    },

    #[error("plan has no steps")]
    EmptyPlan,

    #[error("plan has {count} steps, the maximum is {max}")]
    TooManySteps { count: usize, max: usize },

    #[error("step {} references its own output", .step + 1)]
    SelfReference { step: usize },

    #[error("step {} references later step {}", .step + 1, .referenced + 1)]
    ForwardReference { step: usize, referenced: usize },

    #[error("step {} references output '{output}' that step {} does not produce", .step + 1, .referenced + 1)]
    UnknownOutput {
        step: usize,
        referenced: usize,
        output: String,
    },

    #[error("dependency cycle through step {}", .step + 1)]
    Cycle { step: usize },
}

impl ValidationFailure {
    /// Short machine-readable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationFailure::UnknownTool { .. } => "unknown_tool",
            ValidationFailure::MissingInput { .. } => "missing_input",
            ValidationFailure::EmptyPlan => "empty_plan",
            ValidationFailure::TooManySteps { .. } => "too_many_steps",
            ValidationFailure::SelfReference { .. } => "self_reference",
            ValidationFailure::ForwardReference { .. } => "forward_reference",
            ValidationFailure::UnknownOutput { .. } => "unknown_output",
            ValidationFailure::Cycle { .. } => "cycle",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_error_displays_correctly() {
        let err = Error::Oracle(OracleError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn oracle_transience() {
        assert!(OracleError::Timeout("slow".into()).is_transient());
        assert!(OracleError::RateLimited { retry_after_secs: 5 }.is_transient());
        assert!(
            OracleError::ApiError {
                status_code: 503,
                message: "overloaded".into()
            }
            .is_transient()
        );
        assert!(
            !OracleError::ApiError {
                status_code: 400,
                message: "bad request".into()
            }
            .is_transient()
        );
        assert!(!OracleError::AuthenticationFailed("bad key".into()).is_transient());
    }

    #[test]
    fn only_timeouts_and_execution_failures_are_retried() {
        assert!(ToolErrorKind::Timeout.is_retryable());
        assert!(ToolErrorKind::ExecutionFailed.is_retryable());
        for kind in [
            ToolErrorKind::AccessDenied,
            ToolErrorKind::Unavailable,
            ToolErrorKind::InvalidArguments,
            ToolErrorKind::SafetyBlocked,
            ToolErrorKind::Cancelled,
        ] {
            assert!(!kind.is_retryable(), "{kind} should not be retried");
        }
    }

    #[test]
    fn tool_error_displays_kind() {
        let err = ToolError::access_denied("web_fetch", "HTTP 403");
        let text = err.to_string();
        assert!(text.contains("web_fetch"));
        assert!(text.contains("access_denied"));
        assert!(text.contains("403"));
    }

    #[test]
    fn only_unavailable_and_cancelled_are_plan_fatal() {
        assert!(ToolErrorKind::Unavailable.is_plan_fatal());
        assert!(ToolErrorKind::Cancelled.is_plan_fatal());
        assert!(!ToolErrorKind::AccessDenied.is_plan_fatal());
        assert!(!ToolErrorKind::Timeout.is_plan_fatal());
        assert!(!ToolErrorKind::ExecutionFailed.is_plan_fatal());
    }

    #[test]
    fn validation_failure_uses_one_based_steps() {
        let failure = ValidationFailure::ForwardReference {
            step: 1,
            referenced: 2,
        };
        assert_eq!(failure.to_string(), "step 2 references later step 3");
        assert_eq!(failure.reason(), "forward_reference");
    }
}
