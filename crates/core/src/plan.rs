//! Plan types and the dependency graph derived from step bindings.
//!
//! A plan is an ordered list of tool invocations. Each input of a step is
//! either a literal or a reference to a named output of an earlier step;
//! those references are the only source of dependency edges.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;
use crate::task::TaskId;

/// How a step obtains one of its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum InputBinding {
    /// Passed through unchanged.
    Literal(Value),
    /// Substituted with `output` of the step at position `step`.
    Reference { step: usize, output: String },
}

impl InputBinding {
    pub fn literal(value: impl Into<Value>) -> Self {
        InputBinding::Literal(value.into())
    }

    pub fn reference(step: usize, output: impl Into<String>) -> Self {
        InputBinding::Reference {
            step,
            output: output.into(),
        }
    }
}

/// One tool invocation within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Zero-based position in the declared order
    pub index: usize,

    /// Tool to dispatch to
    pub tool: String,

    /// What the step is meant to achieve
    #[serde(default)]
    pub description: String,

    /// Input bindings keyed by parameter name
    #[serde(default)]
    pub inputs: BTreeMap<String, InputBinding>,

    /// Output slots later steps may reference
    #[serde(default)]
    pub produces: Vec<String>,

    /// Any failure of a critical step halts the plan
    #[serde(default)]
    pub critical: bool,
}

impl PlanStep {
    pub fn new(index: usize, tool: impl Into<String>) -> Self {
        Self {
            index,
            tool: tool.into(),
            description: String::new(),
            inputs: BTreeMap::new(),
            produces: Vec::new(),
            critical: false,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn input(mut self, name: impl Into<String>, binding: InputBinding) -> Self {
        self.inputs.insert(name.into(), binding);
        self
    }

    pub fn produce(mut self, slot: impl Into<String>) -> Self {
        self.produces.push(slot.into());
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// `(input name, referenced step, referenced output)` for every reference binding.
    pub fn references(&self) -> impl Iterator<Item = (&str, usize, &str)> {
        self.inputs.iter().filter_map(|(name, binding)| match binding {
            InputBinding::Reference { step, output } => Some((name.as_str(), *step, output.as_str())),
            InputBinding::Literal(_) => None,
        })
    }

    /// Positions of the steps this step reads from.
    pub fn depends_on(&self) -> BTreeSet<usize> {
        self.references().map(|(_, step, _)| step).collect()
    }
}

/// Where a plan stands in the validation state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ValidationState {
    #[default]
    Unvalidated,
    Valid,
    Invalid(String),
    /// Valid after one re-synthesis.
    Repaired,
}

impl ValidationState {
    pub fn is_executable(&self) -> bool {
        matches!(self, ValidationState::Valid | ValidationState::Repaired)
    }
}

/// An ordered sequence of plan steps for one task attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub task_id: TaskId,
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub state: ValidationState,
    /// Reasoning the oracle gave before the payload
    #[serde(default)]
    pub reasoning: String,
    /// 1 for the first synthesis, 2 after a repair
    #[serde(default = "default_attempt")]
    pub attempt: u32,
}

fn default_attempt() -> u32 {
    1
}

impl Plan {
    pub fn new(task_id: TaskId, steps: Vec<PlanStep>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id,
            steps,
            state: ValidationState::Unvalidated,
            reasoning: String::new(),
            attempt: 1,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Consume the plan and hand back the same steps in a new state.
    pub fn into_state(mut self, state: ValidationState) -> Self {
        self.state = state;
        self
    }

    /// A fresh, unvalidated copy of these steps owned by another task.
    pub fn reissue(&self, task_id: TaskId) -> Self {
        Plan::new(task_id, self.steps.clone()).with_reasoning(self.reasoning.clone())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Distinct tool names in first-use order.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for step in &self.steps {
            if !names.contains(&step.tool) {
                names.push(step.tool.clone());
            }
        }
        names
    }

    /// One-line summary, e.g. `1:web_search -> 2:text_writer(<-1)`.
    pub fn summary(&self) -> String {
        self.steps
            .iter()
            .map(|s| {
                let deps = s.depends_on();
                if deps.is_empty() {
                    format!("{}:{}", s.index + 1, s.tool)
                } else {
                    let deps: Vec<String> = deps.iter().map(|d| (d + 1).to_string()).collect();
                    format!("{}:{}(<-{})", s.index + 1, s.tool, deps.join(","))
                }
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::from_plan(self)
    }
}

/// Explicit DAG over step positions, derived from reference bindings.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    depends_on: Vec<BTreeSet<usize>>,
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Build the graph. References to positions outside the plan are
    /// dropped here; the validator reports them.
    pub fn from_plan(plan: &Plan) -> Self {
        let n = plan.steps.len();
        let mut depends_on = vec![BTreeSet::new(); n];
        let mut dependents = vec![Vec::new(); n];
        for (pos, step) in plan.steps.iter().enumerate() {
            for dep in step.depends_on() {
                if dep < n && depends_on[pos].insert(dep) {
                    dependents[dep].push(pos);
                }
            }
        }
        Self { depends_on, dependents }
    }

    pub fn len(&self) -> usize {
        self.depends_on.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depends_on.is_empty()
    }

    /// In-range positions `step` reads from; empty for unknown positions.
    pub fn depends_on(&self, step: usize) -> impl Iterator<Item = usize> + '_ {
        self.depends_on.get(step).into_iter().flatten().copied()
    }

    /// Topological layers (Kahn's algorithm): every step in a wave depends
    /// only on steps in earlier waves. Returns the lowest position left
    /// unscheduled if the graph has a cycle.
    pub fn waves(&self) -> Result<Vec<Vec<usize>>, usize> {
        let mut in_degree: Vec<usize> = self.depends_on.iter().map(|d| d.len()).collect();
        let mut ready: Vec<usize> = (0..self.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut scheduled = 0usize;
        let mut waves = Vec::new();

        while !ready.is_empty() {
            ready.sort_unstable();
            let mut next = Vec::new();
            for &step in &ready {
                for &dependent in &self.dependents[step] {
                    in_degree[dependent] -= 1;
                    if in_degree[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }
            scheduled += ready.len();
            waves.push(std::mem::replace(&mut ready, next));
        }

        if scheduled < self.len() {
            let stuck = (0..self.len()).find(|&i| in_degree[i] > 0).unwrap_or(0);
            return Err(stuck);
        }
        Ok(waves)
    }
}
