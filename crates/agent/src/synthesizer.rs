//! Plan synthesizer — one balanced-tier oracle call per attempt.
//!
//! The planner only ever sees a small, category-relevant subset of the
//! registry. A plan naming a tool outside that subset is rejected here,
//! before the validator runs.

use std::sync::Arc;
use tasksmith_core::error::SynthesisError;
use tasksmith_core::memory::ScoredEpisode;
use tasksmith_core::oracle::{Oracle, OracleRequest, Tier};
use tasksmith_core::plan::Plan;
use tasksmith_core::task::{Task, TaskCategory};
use tasksmith_core::tool::{ToolDescriptor, ToolRegistry};
use tracing::debug;
use crate::plan_parser::parse_plan;
use crate::prompts;

const PLAN_MAX_TOKENS: u32 = 2048;

/// Everything one synthesis attempt needs to know.
#[derive(Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub task: &'a Task,
    pub category: TaskCategory,
    pub tools: &'a [ToolDescriptor],
    pub memory: &'a [ScoredEpisode],
    /// Why the previous attempt was rejected, if this is a repair
    pub repair_reason: Option<&'a str>,
    pub attempt: u32,
}

pub struct PlanSynthesizer {
    oracle: Arc<dyn Oracle>,
    max_steps: usize,
}

impl PlanSynthesizer {
    pub fn new(oracle: Arc<dyn Oracle>, max_steps: usize) -> Self {
        Self { oracle, max_steps }
    }

    pub async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<Plan, SynthesisError> {
        let prompt = prompts::plan_prompt(
            request.task.text(),
            request.category,
            request.tools,
            request.memory,
            self.max_steps,
            request.repair_reason,
        );
        let oracle_request = OracleRequest::new(prompt, Tier::Balanced)
            .with_system(prompts::PLANNER_SYSTEM)
            .with_max_tokens(PLAN_MAX_TOKENS);

        let response = self.oracle.complete(oracle_request).await?;
        let plan = parse_plan(&response.text, request.task.id.clone())?.with_attempt(request.attempt);

        let allowed: Vec<String> = request.tools.iter().map(|t| t.name.clone()).collect();
        if let Some(step) = plan.steps.iter().find(|s| !allowed.contains(&s.tool)) {
            return Err(SynthesisError::UnknownTool {
                tool: step.tool.clone(),
                allowed,
            });
        }

        debug!(
            task_id = %request.task.id,
            attempt = request.attempt,
            steps = plan.len(),
            plan = %plan.summary(),
            "Plan synthesized"
        );
        Ok(plan)
    }
}

/// Pick at most `max` descriptors relevant to `category`, in registry
/// order.
///
/// `mixed` draws round-robin from every category so one kind of tool does
/// not crowd out the rest. The writing tool is always offered for writing
/// tasks.
pub fn select_tools(
    registry: &ToolRegistry,
    category: TaskCategory,
    max: usize,
    writing_tool: &str,
) -> Vec<ToolDescriptor> {
    let max = max.max(1);
    let mut selected: Vec<ToolDescriptor> = Vec::new();
    let push = |selected: &mut Vec<ToolDescriptor>, d: &ToolDescriptor| {
        if selected.len() < max && !selected.iter().any(|s| s.name == d.name) {
            selected.push(d.clone());
        }
    };

    if category == TaskCategory::Writing
        && let Some(writer) = registry.descriptor(writing_tool)
    {
        push(&mut selected, writer);
    }

    if category == TaskCategory::Mixed {
        let per_category: Vec<Vec<&ToolDescriptor>> = TaskCategory::ALL
            .iter()
            .filter(|c| **c != TaskCategory::Mixed)
            .map(|c| registry.descriptors_for(*c))
            .collect();
        let rounds = per_category.iter().map(|v| v.len()).max().unwrap_or(0);
        for round in 0..rounds {
            for candidates in &per_category {
                if let Some(d) = candidates.get(round) {
                    push(&mut selected, d);
                }
            }
        }
    } else {
        for d in registry.descriptors_for(category) {
            push(&mut selected, d);
        }
    }

    // Nothing tagged for this category: offer the first tools registered.
    if selected.is_empty() {
        for d in registry.descriptors() {
            push(&mut selected, d);
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{MockTool, SEARCH_THEN_WRITE, SequentialOracle, standard_registry};
    use tasksmith_core::error::OracleError;

    fn names(tools: &[ToolDescriptor]) -> Vec<&str> {
        tools.iter().map(|t| t.name.as_str()).collect()
    }

    #[tokio::test]
    async fn synthesizes_with_balanced_tier_and_subset() {
        let (registry, _) = standard_registry();
        let tools = select_tools(&registry, TaskCategory::Research, 3, "text_writer");
        let oracle = Arc::new(SequentialOracle::texts(&[SEARCH_THEN_WRITE]));
        let synthesizer = PlanSynthesizer::new(oracle.clone(), 5);
        let task = Task::new("find the latest price of gold and write a paragraph about it");

        let plan = synthesizer
            .synthesize(SynthesisRequest {
                task: &task,
                category: TaskCategory::Research,
                tools: &tools,
                memory: &[],
                repair_reason: None,
                attempt: 1,
            })
            .await
            .unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.task_id, task.id);
        let request = &oracle.requests()[0];
        assert_eq!(request.tier, Tier::Balanced);
        assert!(request.prompt.contains("web_search"));
    }

    #[tokio::test]
    async fn tool_outside_subset_is_rejected() {
        let (registry, _) = standard_registry();
        // Code tasks are offered only the writer, so the search step is out of bounds.
        let tools: Vec<ToolDescriptor> = select_tools(&registry, TaskCategory::Code, 3, "text_writer");
        assert_eq!(names(&tools), vec!["text_writer"]);

        let synthesizer = PlanSynthesizer::new(Arc::new(SequentialOracle::texts(&[SEARCH_THEN_WRITE])), 5);
        let task = Task::new("write a script");
        let err = synthesizer
            .synthesize(SynthesisRequest {
                task: &task,
                category: TaskCategory::Code,
                tools: &tools,
                memory: &[],
                repair_reason: None,
                attempt: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::UnknownTool { ref tool, .. } if tool == "web_search"));
    }

    #[tokio::test]
    async fn oracle_errors_surface_as_synthesis_errors() {
        let synthesizer = PlanSynthesizer::new(
            Arc::new(SequentialOracle::new(vec![Err(OracleError::Network("down".into()))])),
            5,
        );
        let task = Task::new("x");
        let err = synthesizer
            .synthesize(SynthesisRequest {
                task: &task,
                category: TaskCategory::Mixed,
                tools: &[],
                memory: &[],
                repair_reason: Some("previous failure"),
                attempt: 2,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Oracle(_)));
    }

    #[test]
    fn subset_is_bounded_and_category_relevant() {
        let (mut registry, _) = standard_registry();
        registry.register(Box::new(
            MockTool::new("file_manager", &["action"], &["content"])
                .categories(&[TaskCategory::Code, TaskCategory::Data]),
        ));

        let research = select_tools(&registry, TaskCategory::Research, 3, "text_writer");
        assert_eq!(names(&research), vec!["text_writer", "web_search", "web_fetch"]);

        let limited = select_tools(&registry, TaskCategory::Research, 2, "text_writer");
        assert_eq!(limited.len(), 2);

        let mixed = select_tools(&registry, TaskCategory::Mixed, 3, "text_writer");
        assert_eq!(mixed.len(), 3);
        assert!(names(&mixed).contains(&"file_manager"));
    }

    #[test]
    fn writing_always_offers_the_writer() {
        let mut registry = ToolRegistry::new();
        for i in 0..4 {
            registry.register(Box::new(
                MockTool::new(&format!("helper_{i}"), &[], &["text"]).categories(&[TaskCategory::Writing]),
            ));
        }
        registry.register(Box::new(
            MockTool::new("text_writer", &["instructions"], &["text"]).categories(&[TaskCategory::Writing]),
        ));
        let tools = select_tools(&registry, TaskCategory::Writing, 3, "text_writer");
        assert_eq!(tools[0].name, "text_writer");
        assert_eq!(tools.len(), 3);
    }
}
