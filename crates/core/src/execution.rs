//! Execution records — what happened when a plan ran.

use serde::{Deserialize, Serialize};
use crate::error::ToolErrorKind;
use crate::plan::Plan;
use crate::tool::ToolOutput;

/// Outcome of a single step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failure { kind: ToolErrorKind },
    /// Never dispatched because an upstream step it reads from did not succeed.
    Skipped { upstream: usize },
}

/// Result of one plan step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub index: usize,
    pub tool: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ToolOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Dispatches made for this step, retries included; 0 if never dispatched
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

fn default_attempts() -> u32 {
    1
}

impl StepResult {
    pub fn success(index: usize, tool: impl Into<String>, output: ToolOutput, duration_ms: u64) -> Self {
        Self {
            index,
            tool: tool.into(),
            status: StepStatus::Success,
            output: Some(output),
            error: None,
            duration_ms,
            attempts: 1,
        }
    }

    pub fn failure(
        index: usize,
        tool: impl Into<String>,
        kind: ToolErrorKind,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            index,
            tool: tool.into(),
            status: StepStatus::Failure { kind },
            output: None,
            error: Some(error.into()),
            duration_ms,
            attempts: 1,
        }
    }

    pub fn skipped(index: usize, tool: impl Into<String>, upstream: usize) -> Self {
        Self {
            index,
            tool: tool.into(),
            status: StepStatus::Skipped { upstream },
            output: None,
            error: Some(format!("skipped: step {} did not succeed", upstream + 1)),
            duration_ms: 0,
            attempts: 0,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, StepStatus::Success)
    }

    pub fn failure_kind(&self) -> Option<ToolErrorKind> {
        match self.status {
            StepStatus::Failure { kind } => Some(kind),
            _ => None,
        }
    }
}

/// Overall outcome of a plan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Every step succeeded.
    Success,
    /// Some steps failed step-locally; the rest ran.
    PartialFailure,
    /// A plan-fatal failure halted execution.
    Failed,
    /// The task was cancelled mid-run.
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::PartialFailure => "partial_failure",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

/// The complete, immutable record of one plan run.
///
/// Built through [`ExecutionRecordBuilder`]; results are always ordered by
/// step index regardless of the order in which dispatches completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    plan: Plan,
    results: Vec<StepResult>,
    status: ExecutionStatus,
    /// Position of the step whose failure halted the plan, if any
    halted_at: Option<usize>,
    duration_ms: u64,
}

impl ExecutionRecord {
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn halted_at(&self) -> Option<usize> {
        self.halted_at
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, StepStatus::Failure { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, StepStatus::Skipped { .. }))
            .count()
    }

    /// Tools that actually produced output, in step order.
    pub fn tools_used(&self) -> Vec<String> {
        let mut tools: Vec<String> = Vec::new();
        for r in self.results.iter().filter(|r| r.is_success()) {
            if !tools.contains(&r.tool) {
                tools.push(r.tool.clone());
            }
        }
        tools
    }

    /// Text of the last successful step, which by plan convention carries
    /// the deliverable.
    pub fn final_output(&self) -> Option<String> {
        self.results
            .iter()
            .rev()
            .find(|r| r.is_success())
            .and_then(|r| r.output.as_ref())
            .map(|o| o.text())
    }
}

/// Incrementally assembles an [`ExecutionRecord`].
#[derive(Debug)]
pub struct ExecutionRecordBuilder {
    plan: Plan,
    slots: Vec<Option<StepResult>>,
    halted_at: Option<usize>,
    cancelled: bool,
    started: std::time::Instant,
}

impl ExecutionRecordBuilder {
    pub fn new(plan: Plan) -> Self {
        let slots = vec![None; plan.steps.len()];
        Self {
            plan,
            slots,
            halted_at: None,
            cancelled: false,
            started: std::time::Instant::now(),
        }
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Store a result in its step's slot. Results for unknown positions are
    /// ignored.
    pub fn record(&mut self, result: StepResult) {
        let index = result.index;
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(result);
        }
    }

    pub fn result(&self, index: usize) -> Option<&StepResult> {
        self.slots.get(index).and_then(|s| s.as_ref())
    }

    pub fn halt(&mut self, at: usize) {
        self.halted_at.get_or_insert(at);
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted_at.is_some() || self.cancelled
    }

    /// Freeze the record. Steps that never ran are dropped; the status is
    /// derived from what was recorded.
    pub fn finish(self) -> ExecutionRecord {
        let results: Vec<StepResult> = self.slots.into_iter().flatten().collect();
        let all_ok = results.len() == self.plan.steps.len() && results.iter().all(|r| r.is_success());
        let status = if self.cancelled {
            ExecutionStatus::Cancelled
        } else if self.halted_at.is_some() {
            ExecutionStatus::Failed
        } else if all_ok {
            ExecutionStatus::Success
        } else if results.iter().any(|r| r.is_success()) {
            ExecutionStatus::PartialFailure
        } else {
            ExecutionStatus::Failed
        };
        ExecutionRecord {
            plan: self.plan,
            results,
            status,
            halted_at: self.halted_at,
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanStep;
    use crate::task::TaskId;

    fn plan(n: usize) -> Plan {
        Plan::new(
            TaskId::new(),
            (0..n).map(|i| PlanStep::new(i, format!("tool_{i}"))).collect(),
        )
    }

    fn ok(index: usize, text: &str) -> StepResult {
        StepResult::success(index, format!("tool_{index}"), ToolOutput::new().with("text", text), 5)
    }

    #[test]
    fn results_ordered_by_index_regardless_of_recording_order() {
        let mut builder = ExecutionRecordBuilder::new(plan(3));
        builder.record(ok(2, "c"));
        builder.record(ok(0, "a"));
        builder.record(ok(1, "b"));
        let record = builder.finish();
        let order: Vec<usize> = record.results().iter().map(|r| r.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(record.status(), ExecutionStatus::Success);
        assert_eq!(record.final_output().as_deref(), Some("c"));
    }

    #[test]
    fn step_local_failure_gives_partial_failure() {
        let mut builder = ExecutionRecordBuilder::new(plan(2));
        builder.record(ok(0, "a"));
        builder.record(StepResult::failure(1, "tool_1", ToolErrorKind::AccessDenied, "403", 3));
        let record = builder.finish();
        assert_eq!(record.status(), ExecutionStatus::PartialFailure);
        assert_eq!(record.failed(), 1);
        assert_eq!(record.tools_used(), vec!["tool_0"]);
    }

    #[test]
    fn halt_marks_failed_and_keeps_executed_steps() {
        let mut builder = ExecutionRecordBuilder::new(plan(3));
        builder.record(ok(0, "a"));
        builder.record(StepResult::failure(1, "tool_1", ToolErrorKind::Unavailable, "down", 3));
        builder.halt(1);
        let record = builder.finish();
        assert_eq!(record.status(), ExecutionStatus::Failed);
        assert_eq!(record.results().len(), 2);
        assert_eq!(record.halted_at(), Some(1));
    }

    #[test]
    fn cancellation_wins_over_halt() {
        let mut builder = ExecutionRecordBuilder::new(plan(1));
        builder.halt(0);
        builder.cancel();
        assert_eq!(builder.finish().status(), ExecutionStatus::Cancelled);
    }
}
