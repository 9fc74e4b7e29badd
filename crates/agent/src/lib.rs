//! The Tasksmith core loop.
//!
//! Each task follows a **Classify → Plan → Validate → Execute → Evaluate →
//! Remember** cycle:
//!
//! 1. **Fast path**: pure writing requests go straight to the writing tool
//! 2. **Recall** similar past episodes; a close, high-scoring one donates its plan
//! 3. **Classify** the task into a category (or ask the external router)
//! 4. **Synthesize** a plan from a category-relevant tool subset
//! 5. **Validate** it, re-synthesizing once with the rejection reason
//! 6. **Execute** the plan wave by wave over its dependency graph
//! 7. **Evaluate** the run on a continuous scale
//! 8. **Persist** exactly one episode, whatever happened

pub mod classifier;
pub mod episode;
pub mod evaluator;
pub mod executor;
pub mod fast_path;
pub mod insights;
pub mod loop_runner;
pub mod plan_parser;
pub mod prompts;
pub mod synthesizer;
pub mod validator;

#[cfg(test)]
mod test_helpers;

pub use classifier::{Classifier, TaskRouter, parse_category};
pub use evaluator::Evaluator;
pub use executor::{Executor, SafetyValidator};
pub use fast_path::FastPath;
pub use insights::InsightAnalyst;
pub use loop_runner::{CoreLoop, ExecutionSummary, ResolutionPath, Stage, TaskFailure, TaskOutcome};
pub use plan_parser::parse_plan;
pub use synthesizer::{PlanSynthesizer, SynthesisRequest, select_tools};
pub use validator::{PlanValidator, Rejection};
