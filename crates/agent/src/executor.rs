//! Executor — runs a validated plan against the tool registry.
//!
//! The dependency graph is split into topological waves; each wave is
//! dispatched concurrently and results land in step order no matter which
//! dispatch finishes first. A step whose input comes from a step that did
//! not succeed is skipped. A plan-fatal failure (an unavailable upstream
//! source, or any failure of a `critical` step) halts everything after the
//! current wave.
//!
//! A step that times out or fails while running is re-dispatched up to
//! `retries` times with doubling backoff. Refusals and missing sources are
//! never retried.

use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tasksmith_core::error::{ToolError, ToolErrorKind};
use tasksmith_core::event::{DomainEvent, EventBus};
use tasksmith_core::execution::{ExecutionRecord, ExecutionRecordBuilder, StepResult};
use tasksmith_core::plan::{DependencyGraph, InputBinding, Plan, PlanStep, ValidationState};
use tasksmith_core::task::TaskId;
use tasksmith_core::tool::{ToolInputs, ToolOutput, ToolRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

/// A pre-dispatch check on a step's resolved inputs.
///
/// A rejection becomes a step-local `safety_blocked` failure; the tool is
/// never invoked.
pub trait SafetyValidator: Send + Sync {
    fn check(&self, tool: &str, inputs: &ToolInputs) -> Result<(), String>;
}

pub struct Executor {
    registry: Arc<ToolRegistry>,
    step_timeout: Duration,
    retries: u32,
    backoff: Duration,
    events: Option<Arc<EventBus>>,
    safety: Option<Arc<dyn SafetyValidator>>,
}

impl Executor {
    pub fn new(registry: Arc<ToolRegistry>, step_timeout: Duration) -> Self {
        Self {
            registry,
            step_timeout,
            retries: 0,
            backoff: Duration::ZERO,
            events: None,
            safety: None,
        }
    }

    /// Re-dispatch retryable failures up to `retries` times, waiting
    /// `backoff` before the first retry and twice as long before each next.
    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_safety(mut self, safety: Arc<dyn SafetyValidator>) -> Self {
        self.safety = Some(safety);
        self
    }

    pub async fn execute(
        &self,
        plan: &Plan,
        task_id: &TaskId,
        cancel: &CancellationToken,
    ) -> ExecutionRecord {
        let mut builder = ExecutionRecordBuilder::new(plan.clone());
        if !plan.state.is_executable() {
            let reason = match &plan.state {
                ValidationState::Invalid(reason) => format!("plan was rejected by validation: {reason}"),
                _ => "plan has not been validated".to_string(),
            };
            warn!(task_id = %task_id, plan_id = %plan.id, reason = %reason, "Refusing to execute plan");
            if let Some(first) = plan.steps.first() {
                builder.record(StepResult::failure(
                    first.index,
                    first.tool.clone(),
                    ToolErrorKind::InvalidArguments,
                    reason,
                    0,
                ));
            }
            builder.halt(0);
            return builder.finish();
        }

        let graph = plan.dependency_graph();
        let waves = graph.waves().unwrap_or_else(|stuck| {
            // Unreachable for validated plans; fall back to declared order.
            warn!(task_id = %task_id, step = stuck + 1, "Plan has a dependency cycle, running in declared order");
            (0..plan.len()).map(|i| vec![i]).collect()
        });

        let mut pending = waves.into_iter();
        for wave in pending.by_ref() {
            if cancel.is_cancelled() {
                cancel_steps(&mut builder, &wave);
                break;
            }

            let mut dispatches = Vec::new();
            for &index in &wave {
                let step = &plan.steps[index];
                match prepare(&builder, &graph, index, step) {
                    Ok(inputs) => dispatches.push(self.dispatch(step, inputs, task_id, cancel)),
                    Err(result) => builder.record(result),
                }
            }

            for result in join_all(dispatches).await {
                let step = &plan.steps[result.index];
                if let Some(kind) = result.failure_kind() {
                    if kind == ToolErrorKind::Cancelled {
                        builder.cancel();
                    } else if kind.is_plan_fatal() || step.critical {
                        warn!(task_id = %task_id, step = result.index + 1, tool = %result.tool, kind = %kind, "Plan-fatal failure, halting");
                        builder.halt(result.index);
                    }
                }
                builder.record(result);
            }

            if builder.is_halted() {
                break;
            }
        }

        // Whatever never got a wave is cancelled or skipped behind the halt.
        let remaining: Vec<usize> = pending.flatten().collect();
        if cancel.is_cancelled() {
            cancel_steps(&mut builder, &remaining);
        } else if let Some(halted_at) = first_halt(&builder, plan) {
            for index in remaining {
                builder.record(StepResult::skipped(index, plan.steps[index].tool.clone(), halted_at));
            }
        }

        let record = builder.finish();
        debug!(
            task_id = %task_id,
            status = record.status().as_str(),
            succeeded = record.succeeded(),
            failed = record.failed(),
            skipped = record.skipped(),
            duration_ms = record.duration_ms(),
            "Plan executed"
        );
        record
    }

    async fn dispatch(
        &self,
        step: &PlanStep,
        inputs: ToolInputs,
        task_id: &TaskId,
        cancel: &CancellationToken,
    ) -> StepResult {
        let span = info_span!("step", task_id = %task_id, step = step.index + 1, tool = %step.tool);
        let result = self.invoke(step, inputs, cancel).instrument(span).await;

        if let Some(events) = &self.events {
            events.publish(DomainEvent::ToolDispatched {
                task_id: task_id.to_string(),
                step: step.index,
                tool_name: step.tool.clone(),
                success: result.is_success(),
                duration_ms: result.duration_ms,
                timestamp: chrono::Utc::now(),
            });
        }
        result
    }

    async fn invoke(&self, step: &PlanStep, inputs: ToolInputs, cancel: &CancellationToken) -> StepResult {
        if let Some(safety) = &self.safety
            && let Err(reason) = safety.check(&step.tool, &inputs)
        {
            warn!(reason = %reason, "Step blocked by safety validator");
            return StepResult::failure(step.index, step.tool.clone(), ToolErrorKind::SafetyBlocked, reason, 0);
        }

        let started = Instant::now();
        let mut attempts = 1;
        let outcome = loop {
            match self.dispatch_once(step, inputs.clone(), cancel).await {
                Err(e) if e.kind.is_retryable() && attempts <= self.retries => {
                    let delay = self.backoff.saturating_mul(2u32.saturating_pow(attempts - 1));
                    warn!(
                        kind = %e.kind,
                        error = %e.message,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Step failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break Err(ToolError::new(
                            step.tool.clone(),
                            ToolErrorKind::Cancelled,
                            "task cancelled while waiting to retry the step",
                        )),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempts += 1;
                }
                outcome => break outcome,
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                debug!(duration_ms, attempts, "Step succeeded");
                StepResult::success(step.index, step.tool.clone(), output, duration_ms).with_attempts(attempts)
            }
            Err(e) => {
                warn!(kind = %e.kind, error = %e.message, duration_ms, attempts, "Step failed");
                StepResult::failure(step.index, step.tool.clone(), e.kind, e.message, duration_ms)
                    .with_attempts(attempts)
            }
        }
    }

    /// One bounded dispatch of a step.
    async fn dispatch_once(
        &self,
        step: &PlanStep,
        inputs: ToolInputs,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ToolError::new(
                step.tool.clone(),
                ToolErrorKind::Cancelled,
                "task cancelled while the step was running",
            )),
            result = tokio::time::timeout(self.step_timeout, self.registry.invoke(&step.tool, inputs)) => {
                result.unwrap_or_else(|_| Err(ToolError::timeout(step.tool.clone(), self.step_timeout.as_secs())))
            }
        }
    }
}

fn cancel_steps(builder: &mut ExecutionRecordBuilder, steps: &[usize]) {
    for &index in steps {
        if builder.result(index).is_none() {
            let tool = builder.plan().steps[index].tool.clone();
            builder.record(StepResult::failure(index, tool, ToolErrorKind::Cancelled, "task cancelled", 0));
        }
    }
    builder.cancel();
}

/// Resolve a step's bindings against earlier results, or explain why it
/// cannot run.
fn prepare(
    builder: &ExecutionRecordBuilder,
    graph: &DependencyGraph,
    position: usize,
    step: &PlanStep,
) -> Result<ToolInputs, StepResult> {
    if let Some(upstream) = graph
        .depends_on(position)
        .find(|dep| !builder.result(*dep).is_some_and(|r| r.is_success()))
    {
        debug!(step = step.index + 1, upstream = upstream + 1, "Skipping step, upstream did not succeed");
        return Err(StepResult::skipped(step.index, step.tool.clone(), upstream));
    }

    let mut inputs = ToolInputs::new();
    for (name, binding) in &step.inputs {
        let value = match binding {
            InputBinding::Literal(value) => value.clone(),
            InputBinding::Reference { step: from, output } => {
                let slot = builder
                    .result(*from)
                    .and_then(|r| r.output.as_ref())
                    .and_then(|o| o.get(output));
                match slot {
                    Some(value) => value.clone(),
                    None => {
                        return Err(StepResult::failure(
                            step.index,
                            step.tool.clone(),
                            ToolErrorKind::InvalidArguments,
                            format!("step {} produced no '{output}' for input '{name}'", from + 1),
                            0,
                        ));
                    }
                }
            }
        };
        inputs.insert(name.clone(), value);
    }
    Ok(inputs)
}

/// The step that halted the plan, if a halt happened.
fn first_halt(builder: &ExecutionRecordBuilder, plan: &Plan) -> Option<usize> {
    (0..plan.len()).find(|&i| {
        builder.result(i).and_then(|r| r.failure_kind()).is_some_and(|kind| {
            kind.is_plan_fatal() || plan.steps[i].critical
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{MockTool, standard_registry};
    use serde_json::json;
    use tasksmith_core::execution::{ExecutionStatus, StepStatus};
    use tasksmith_core::tool::ToolOutput;

    fn executor(registry: ToolRegistry) -> Executor {
        Executor::new(Arc::new(registry), Duration::from_secs(5))
    }

    fn search(pos: usize) -> PlanStep {
        PlanStep::new(pos, "web_search").input("query", InputBinding::literal("gold price"))
    }

    fn fetch(pos: usize) -> PlanStep {
        PlanStep::new(pos, "web_fetch").input("url", InputBinding::literal("https://example.com"))
    }

    fn write_from(pos: usize, from: usize, slot: &str) -> PlanStep {
        PlanStep::new(pos, "text_writer")
            .input("instructions", InputBinding::literal("write it up"))
            .input("context", InputBinding::reference(from, slot))
    }

    fn registry_with(tools: Vec<MockTool>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(Box::new(tool));
        }
        registry
    }

    fn validated(steps: Vec<PlanStep>) -> Plan {
        Plan::new(TaskId::new(), steps).into_state(ValidationState::Valid)
    }

    async fn run(executor: &Executor, steps: Vec<PlanStep>) -> ExecutionRecord {
        let plan = validated(steps);
        executor.execute(&plan, &plan.task_id, &CancellationToken::new()).await
    }

    #[tokio::test]
    async fn references_are_substituted() {
        let (registry, calls) = standard_registry();
        let record = run(&executor(registry), vec![search(0), write_from(1, 0, "results")]).await;

        assert_eq!(record.status(), ExecutionStatus::Success);
        let writer_inputs = calls.writer.lock().unwrap()[0].clone();
        assert_eq!(writer_inputs["context"], json!("1. Gold price today is $2,400 per ounce"));
        assert_eq!(writer_inputs["instructions"], json!("write it up"));
        assert_eq!(record.final_output().unwrap(), "A finished paragraph about gold prices.");
    }

    #[tokio::test]
    async fn access_denied_is_step_local() {
        let registry = registry_with(vec![
            MockTool::new("web_fetch", &["url"], &["content"])
                .failing(ToolError::access_denied("web_fetch", "HTTP 403")),
            MockTool::new("web_search", &["query"], &["results"]),
            MockTool::new("text_writer", &["instructions"], &["text"]).optional("context"),
        ]);
        let record = run(&executor(registry), vec![fetch(0), search(1), write_from(2, 1, "results")]).await;

        assert_eq!(record.status(), ExecutionStatus::PartialFailure);
        assert_eq!(record.results().len(), 3);
        assert_eq!(record.results()[0].failure_kind(), Some(ToolErrorKind::AccessDenied));
        assert!(record.results()[1].is_success());
        assert!(record.results()[2].is_success());
    }

    #[tokio::test]
    async fn failed_step_skips_only_its_dependents() {
        let registry = registry_with(vec![
            MockTool::new("web_search", &["query"], &["results"])
                .failing(ToolError::execution_failed("web_search", "bad query")),
            MockTool::new("web_fetch", &["url"], &["content"]),
            MockTool::new("text_writer", &["instructions"], &["text"]).optional("context"),
        ]);
        let record = run(
            &executor(registry),
            vec![search(0), fetch(1), write_from(2, 0, "results")],
        )
        .await;

        assert_eq!(record.status(), ExecutionStatus::PartialFailure);
        assert!(record.results()[1].is_success());
        assert_eq!(record.results()[2].status, StepStatus::Skipped { upstream: 0 });
        assert_eq!(record.halted_at(), None);
    }

    #[tokio::test]
    async fn unavailable_source_halts_the_plan() {
        let registry = registry_with(vec![
            MockTool::new("web_search", &["query"], &["results"])
                .failing(ToolError::unavailable("web_search", "no API key")),
            MockTool::new("web_fetch", &["url"], &["content"]),
            MockTool::new("text_writer", &["instructions"], &["text"]).optional("context"),
        ]);
        // Step 3 only needs step 2, but the halt stops it anyway.
        let record = run(
            &executor(registry),
            vec![search(0), fetch(1), write_from(2, 1, "content")],
        )
        .await;

        assert_eq!(record.status(), ExecutionStatus::Failed);
        assert_eq!(record.halted_at(), Some(0));
        assert_eq!(record.succeeded(), 1);
        assert_eq!(record.results()[2].status, StepStatus::Skipped { upstream: 0 });
    }

    #[tokio::test]
    async fn critical_failure_halts_the_plan() {
        let registry = registry_with(vec![
            MockTool::new("web_fetch", &["url"], &["content"])
                .failing(ToolError::access_denied("web_fetch", "paywall")),
            MockTool::new("web_search", &["query"], &["results"]),
            MockTool::new("text_writer", &["instructions"], &["text"]).optional("context"),
        ]);
        let record = run(
            &executor(registry),
            vec![fetch(0).critical(), search(1), write_from(2, 1, "results")],
        )
        .await;

        assert_eq!(record.status(), ExecutionStatus::Failed);
        assert_eq!(record.halted_at(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_step_times_out_locally() {
        let registry = registry_with(vec![
            MockTool::new("web_search", &["query"], &["results"]).delayed(Duration::from_secs(30)),
            MockTool::new("web_fetch", &["url"], &["content"]),
        ]);
        let executor = Executor::new(Arc::new(registry), Duration::from_secs(2));
        let record = run(&executor, vec![search(0), fetch(1)]).await;

        assert_eq!(record.results()[0].failure_kind(), Some(ToolErrorKind::Timeout));
        assert!(record.results()[1].is_success());
        assert_eq!(record.status(), ExecutionStatus::PartialFailure);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_marks_outstanding_steps() {
        let registry = registry_with(vec![
            MockTool::new("web_search", &["query"], &["results"]).delayed(Duration::from_secs(60)),
            MockTool::new("text_writer", &["instructions"], &["text"]).optional("context"),
        ]);
        let executor = Executor::new(Arc::new(registry), Duration::from_secs(120));
        let plan = validated(vec![search(0), write_from(1, 0, "results")]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let record = executor.execute(&plan, &plan.task_id, &cancel).await;
        assert_eq!(record.status(), ExecutionStatus::Cancelled);
        assert_eq!(record.results().len(), 2);
        assert!(record
            .results()
            .iter()
            .all(|r| r.failure_kind() == Some(ToolErrorKind::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn results_are_ordered_by_index() {
        let registry = registry_with(vec![
            MockTool::new("web_search", &["query"], &["results"]).delayed(Duration::from_millis(50)),
            MockTool::new("web_fetch", &["url"], &["content"]),
        ]);
        let record = run(&executor(registry), vec![search(0), fetch(1)]).await;
        let order: Vec<usize> = record.results().iter().map(|r| r.index).collect();
        assert_eq!(order, vec![0, 1]);
    }

    #[tokio::test]
    async fn missing_output_slot_fails_the_consumer() {
        let registry = registry_with(vec![
            MockTool::new("web_search", &["query"], &["results", "answer"])
                .replying(ToolOutput::new().with("answer", "only an answer")),
            MockTool::new("text_writer", &["instructions"], &["text"]).optional("context"),
        ]);
        let record = run(&executor(registry), vec![search(0), write_from(1, 0, "results")]).await;
        assert_eq!(record.results()[1].failure_kind(), Some(ToolErrorKind::InvalidArguments));
    }

    struct DenyWrites;

    impl SafetyValidator for DenyWrites {
        fn check(&self, tool: &str, _inputs: &ToolInputs) -> Result<(), String> {
            if tool == "text_writer" {
                Err("writing disabled".into())
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn safety_validator_blocks_before_dispatch() {
        let (registry, calls) = standard_registry();
        let executor = executor(registry).with_safety(Arc::new(DenyWrites));
        let record = run(&executor, vec![search(0), write_from(1, 0, "results")]).await;

        assert_eq!(record.results()[1].failure_kind(), Some(ToolErrorKind::SafetyBlocked));
        assert!(calls.writer.lock().unwrap().is_empty());
        assert_eq!(record.status(), ExecutionStatus::PartialFailure);
    }

    #[tokio::test]
    async fn dispatches_publish_events() {
        let (registry, _) = standard_registry();
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let executor = executor(registry).with_events(bus);
        run(&executor, vec![search(0), write_from(1, 0, "results")]).await;

        let mut dispatched = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let DomainEvent::ToolDispatched { tool_name, success, .. } = event.as_ref() {
                dispatched.push((tool_name.clone(), *success));
            }
        }
        assert_eq!(
            dispatched,
            vec![("web_search".to_string(), true), ("text_writer".to_string(), true)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried_until_it_succeeds() {
        let flaky = MockTool::new("web_search", &["query"], &["results"])
            .failing_first(1, ToolError::execution_failed("web_search", "connection reset"));
        let calls = flaky.calls();
        let executor = executor(registry_with(vec![flaky])).with_retries(2, Duration::from_millis(200));

        let started = tokio::time::Instant::now();
        let record = run(&executor, vec![search(0)]).await;

        assert_eq!(record.status(), ExecutionStatus::Success);
        assert_eq!(record.results()[0].attempts, 2);
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_back_off_and_give_up() {
        let broken = MockTool::new("web_search", &["query"], &["results"])
            .failing(ToolError::execution_failed("web_search", "HTTP 502"));
        let calls = broken.calls();
        let executor = executor(registry_with(vec![broken])).with_retries(2, Duration::from_millis(100));

        let started = tokio::time::Instant::now();
        let record = run(&executor, vec![search(0)]).await;

        assert_eq!(record.status(), ExecutionStatus::Failed);
        assert_eq!(record.results()[0].failure_kind(), Some(ToolErrorKind::ExecutionFailed));
        assert_eq!(record.results()[0].attempts, 3);
        assert_eq!(calls.lock().unwrap().len(), 3);
        // 100ms then 200ms
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn refusals_and_missing_sources_are_not_retried() {
        let denied = MockTool::new("web_fetch", &["url"], &["content"])
            .failing(ToolError::access_denied("web_fetch", "HTTP 403"));
        let fetch_calls = denied.calls();
        let missing = MockTool::new("web_search", &["query"], &["results"])
            .failing(ToolError::unavailable("web_search", "no API key"));
        let search_calls = missing.calls();
        let executor = executor(registry_with(vec![denied, missing])).with_retries(3, Duration::ZERO);

        let record = run(&executor, vec![fetch(0), search(1)]).await;

        assert_eq!(fetch_calls.lock().unwrap().len(), 1);
        assert_eq!(search_calls.lock().unwrap().len(), 1);
        assert!(record.results().iter().all(|r| r.attempts == 1));
    }

    #[tokio::test]
    async fn skipped_steps_record_no_attempts() {
        let registry = registry_with(vec![
            MockTool::new("web_search", &["query"], &["results"])
                .failing(ToolError::access_denied("web_search", "blocked")),
            MockTool::new("text_writer", &["instructions"], &["text"]).optional("context"),
        ]);
        let record = run(&executor(registry), vec![search(0), write_from(1, 0, "results")]).await;
        assert_eq!(record.results()[1].attempts, 0);
    }

    #[tokio::test]
    async fn rejected_plan_is_refused() {
        let (registry, calls) = standard_registry();
        let plan = Plan::new(TaskId::new(), vec![search(0), write_from(1, 0, "results")])
            .into_state(ValidationState::Invalid("step 2 references later step 3".into()));

        let record = executor(registry)
            .execute(&plan, &plan.task_id, &CancellationToken::new())
            .await;

        assert_eq!(record.status(), ExecutionStatus::Failed);
        assert_eq!(record.halted_at(), Some(0));
        assert_eq!(record.results().len(), 1);
        assert_eq!(record.results()[0].failure_kind(), Some(ToolErrorKind::InvalidArguments));
        assert!(record.results()[0].error.as_deref().unwrap().contains("later step 3"));
        assert!(calls.search.lock().unwrap().is_empty());
        assert!(calls.writer.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unvalidated_plan_is_refused() {
        let (registry, calls) = standard_registry();
        let plan = Plan::new(TaskId::new(), vec![search(0)]);

        let record = executor(registry)
            .execute(&plan, &plan.task_id, &CancellationToken::new())
            .await;

        assert_eq!(record.status(), ExecutionStatus::Failed);
        assert!(record.results()[0].error.as_deref().unwrap().contains("not been validated"));
        assert!(calls.search.lock().unwrap().is_empty());
    }
}
