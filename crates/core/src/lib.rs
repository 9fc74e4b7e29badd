//! # Tasksmith Core
//!
//! Domain types, traits, and error definitions for the Tasksmith autonomous
//! task executor. Nothing here talks to the network or the filesystem; the
//! other crates implement these traits and the agent crate drives them.
//!
//! ## Layout
//!
//! Every external collaborator (oracle, tool, memory store, embedder) is a
//! trait here. Implementations live in their respective crates, so they can
//! be swapped via configuration and replaced by scripted mocks in tests.

pub mod error;
pub mod task;
pub mod oracle;
pub mod tool;
pub mod plan;
pub mod execution;
pub mod evaluation;
pub mod memory;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{
    ClassificationError, Error, MemoryError, OracleError, Result, SynthesisError, ToolError,
    ToolErrorKind, ValidationFailure,
};
pub use task::{RunMode, Task, TaskCategory, TaskId};
pub use oracle::{Oracle, OracleRequest, OracleResponse, Tier, Usage};
pub use tool::{ParamType, Tool, ToolDescriptor, ToolInputs, ToolOutput, ToolParam, ToolRegistry};
pub use plan::{DependencyGraph, InputBinding, Plan, PlanStep, ValidationState};
pub use execution::{ExecutionRecord, ExecutionRecordBuilder, ExecutionStatus, StepResult, StepStatus};
pub use evaluation::EvaluationResult;
pub use memory::{Embedder, Episode, EpisodeFilter, EpisodeOutcome, EpisodeStats, MemoryStore, ScoredEpisode, Trend};
pub use event::{DomainEvent, EventBus};
