//! The core loop — one state machine per task.
//!
//! ```text
//! Received → FastPath ─────────────────────────────┐
//!          → MemoryLookup → (cached plan) Validate ─┤
//!                         → Classify → Synthesize → Validate [→ Repair → Validate]
//!                                                   └→ Execute → Evaluate → Persist → Done
//! ```
//!
//! Every run ends in exactly one persisted episode, whether it succeeded,
//! failed in planning, failed in execution or was cancelled.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tasksmith_config::CoreConfig;
use tasksmith_core::error::MemoryError;
use tasksmith_core::evaluation::EvaluationResult;
use tasksmith_core::event::{DomainEvent, EventBus};
use tasksmith_core::execution::{ExecutionRecord, ExecutionStatus};
use tasksmith_core::memory::{Embedder, Episode, EpisodeFilter, MemoryStore, ScoredEpisode};
use tasksmith_core::oracle::Oracle;
use tasksmith_core::plan::Plan;
use tasksmith_core::task::{RunMode, Task, TaskCategory};
use tasksmith_core::tool::ToolRegistry;
use tasksmith_memory::HashEmbedder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::classifier::{Classifier, TaskRouter};
use crate::episode::{self, EpisodeInput};
use crate::evaluator::Evaluator;
use crate::executor::{Executor, SafetyValidator};
use crate::fast_path::FastPath;
use crate::prompts::truncate;
use crate::synthesizer::{PlanSynthesizer, SynthesisRequest, select_tools};
use crate::validator::PlanValidator;

/// Where a task is in the core loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    FastPath,
    MemoryLookup,
    Classify,
    Synthesize,
    Validate,
    Repair,
    Execute,
    Evaluate,
    Persist,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::FastPath => "fast_path",
            Stage::MemoryLookup => "memory_lookup",
            Stage::Classify => "classify",
            Stage::Synthesize => "synthesize",
            Stage::Validate => "validate",
            Stage::Repair => "repair",
            Stage::Execute => "execute",
            Stage::Evaluate => "evaluate",
            Stage::Persist => "persist",
            Stage::Done => "done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The terminal `Failed(stage, reason)` state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskFailure {
    pub stage: Stage,
    pub reason: String,
}

/// How the executed plan was obtained.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum ResolutionPath {
    FastPath,
    CacheHit { episode_id: String, similarity: f32 },
    Planned { repaired: bool },
}

/// Compact view of an execution record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionSummary {
    pub status: Option<ExecutionStatus>,
    pub steps: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Re-dispatches beyond each step's first
    pub retries: u32,
    pub tools_used: Vec<String>,
    pub final_output: Option<String>,
    pub duration_ms: u64,
}

impl ExecutionSummary {
    pub fn from_record(record: &ExecutionRecord) -> Self {
        Self {
            status: Some(record.status()),
            steps: record.plan().len(),
            succeeded: record.succeeded(),
            failed: record.failed(),
            skipped: record.skipped(),
            retries: record.results().iter().map(|r| r.attempts.saturating_sub(1)).sum(),
            tools_used: record.tools_used(),
            final_output: record.final_output(),
            duration_ms: record.duration_ms(),
        }
    }
}

/// Everything a caller learns about one run.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub task: Task,
    pub evaluation: EvaluationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<ExecutionRecord>,
    pub summary: ExecutionSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<ResolutionPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<TaskFailure>,
    /// The most recent plan the validator rejected, marked `Invalid`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_plan: Option<Plan>,
    pub stages: Vec<Stage>,
    /// Recalled episodes similar enough to inform planning
    pub memory_hits: usize,
    /// Id of the persisted episode; `None` only if the write failed
    pub episode_id: Option<String>,
    pub cancelled: bool,
}

/// How planning ended.
enum Resolved {
    Plan(Plan, ResolutionPath),
    Failed(TaskFailure),
    Cancelled,
}

/// Per-run bookkeeping.
struct Run {
    task: Task,
    stages: Vec<Stage>,
    memory_hits: usize,
    /// Last plan the validator turned down
    rejected: Option<Plan>,
}

/// The core loop that turns a task into a plan, runs it, grades it and
/// remembers it.
///
/// Holds no per-task state, so one instance (behind an `Arc`) serves any
/// number of concurrent tasks.
pub struct CoreLoop {
    tools: Arc<ToolRegistry>,
    memory: Arc<dyn MemoryStore>,
    embedder: Arc<dyn Embedder>,
    config: Arc<CoreConfig>,
    events: Arc<EventBus>,
    router: Option<Arc<dyn TaskRouter>>,
    safety: Option<Arc<dyn SafetyValidator>>,
    fast_path: FastPath,
    classifier: Classifier,
    synthesizer: PlanSynthesizer,
    validator: PlanValidator,
    evaluator: Evaluator,
}

impl CoreLoop {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        tools: Arc<ToolRegistry>,
        memory: Arc<dyn MemoryStore>,
        config: Arc<CoreConfig>,
    ) -> Self {
        Self {
            fast_path: FastPath::new(&config.fast_path),
            classifier: Classifier::new(oracle.clone()),
            synthesizer: PlanSynthesizer::new(oracle.clone(), config.max_plan_steps),
            validator: PlanValidator::new(tools.clone(), config.max_plan_steps),
            evaluator: Evaluator::new(config.evaluation.clone()).with_oracle(oracle),
            tools,
            memory,
            embedder: Arc::new(HashEmbedder::default()),
            config,
            events: Arc::new(EventBus::default()),
            router: None,
            safety: None,
        }
    }

    /// Use a different embedder for episode lookup and persistence.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    /// Publish domain events on a shared bus.
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Attach the external router consulted in multi-agent mode.
    pub fn with_router(mut self, router: Arc<dyn TaskRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// Check every step's inputs before dispatch.
    pub fn with_safety(mut self, safety: Arc<dyn SafetyValidator>) -> Self {
        self.safety = Some(safety);
        self
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub async fn run(&self, text: &str, mode: RunMode) -> TaskOutcome {
        self.run_with_cancel(text, mode, CancellationToken::new()).await
    }

    /// Run one task to completion. Cancelling `cancel` stops work at the
    /// next suspension point; the attempt is still evaluated and persisted.
    pub async fn run_with_cancel(&self, text: &str, mode: RunMode, cancel: CancellationToken) -> TaskOutcome {
        let mut run = Run {
            task: Task::new(text),
            stages: Vec::new(),
            memory_hits: 0,
            rejected: None,
        };
        info!(task_id = %run.task.id, mode = ?mode, "Task received");
        self.events.publish(DomainEvent::TaskReceived {
            task_id: run.task.id.to_string(),
            text_preview: truncate(text, 80),
            timestamp: chrono::Utc::now(),
        });
        self.enter(&mut run, Stage::Received);

        let resolved = self.resolve(&mut run, mode, &cancel).await;
        let category = run.task.category().unwrap_or(TaskCategory::Mixed);

        let (record, path, mut failure, mut cancelled) = match resolved {
            Resolved::Plan(plan, path) => {
                self.enter(&mut run, Stage::Execute);
                let record = self.executor().execute(&plan, &run.task.id, &cancel).await;
                let cancelled = record.status() == ExecutionStatus::Cancelled;
                let failure = (record.status() == ExecutionStatus::Failed).then(|| TaskFailure {
                    stage: Stage::Execute,
                    reason: execution_failure_reason(&record),
                });
                (Some(record), Some(path), failure, cancelled)
            }
            Resolved::Failed(failure) => (None, None, Some(failure), false),
            Resolved::Cancelled => (None, None, None, true),
        };

        self.enter(&mut run, Stage::Evaluate);
        let evaluation = match &record {
            Some(record) if cancel.is_cancelled() => self.evaluator.evaluate_offline(&run.task, record),
            Some(record) => match cancellable(&cancel, self.evaluator.evaluate(&run.task, record)).await {
                Some(evaluation) => evaluation,
                None => {
                    cancelled = true;
                    self.evaluator.evaluate_offline(&run.task, record)
                }
            },
            None if cancelled => EvaluationResult::failure("cancelled before a plan was executed"),
            None => EvaluationResult::failure(
                failure
                    .as_ref()
                    .map(|f| format!("failed at {}: {}", f.stage, f.reason))
                    .unwrap_or_else(|| "no plan was executed".to_string()),
            ),
        };
        if cancelled {
            // A cancelled run is never a failure of any one stage.
            failure = None;
        }

        self.enter(&mut run, Stage::Persist);
        let failure_parts = failure.as_ref().map(|f| (f.stage.as_str(), f.reason.as_str()));
        let episode = episode::assemble(
            EpisodeInput {
                task: &run.task,
                category,
                mode,
                record: record.as_ref(),
                evaluation: &evaluation,
                failure: failure_parts,
                cancelled,
            },
            self.embedder.as_ref(),
        )
        .await;
        let episode_id = self.persist(&run, episode).await;
        self.enter(&mut run, Stage::Done);

        info!(
            task_id = %run.task.id,
            category = %category,
            score = evaluation.quality_score(),
            success = evaluation.success,
            cancelled,
            "Task finished"
        );

        TaskOutcome {
            summary: record.as_ref().map(ExecutionSummary::from_record).unwrap_or_default(),
            task: run.task,
            evaluation,
            record,
            path,
            failure,
            rejected_plan: run.rejected,
            stages: run.stages,
            memory_hits: run.memory_hits,
            episode_id,
            cancelled,
        }
    }

    /// Everything before execution: produce a validated plan or explain
    /// why there is none.
    async fn resolve(&self, run: &mut Run, mode: RunMode, cancel: &CancellationToken) -> Resolved {
        if self.fast_path.applies(run.task.text()) && self.tools.contains(self.fast_path.tool()) {
            self.enter(run, Stage::FastPath);
            run.task.infer_category(TaskCategory::Writing);
            let plan = self.fast_path.plan(&run.task);
            return Resolved::Plan(plan, ResolutionPath::FastPath);
        }

        self.enter(run, Stage::MemoryLookup);
        let recalled = match cancellable(cancel, self.recall(&run.task)).await {
            None => return Resolved::Cancelled,
            Some(Ok(recalled)) => recalled,
            Some(Err(e)) => {
                warn!(task_id = %run.task.id, error = %e, "Memory lookup failed, cache disabled");
                self.report_error("memory_lookup", &e.to_string());
                Vec::new()
            }
        };
        run.memory_hits = recalled
            .iter()
            .filter(|s| s.similarity >= self.config.recall_min_similarity)
            .count();

        if let Some(resolved) = self.cache_hit(run, &recalled) {
            return resolved;
        }

        self.enter(run, Stage::Classify);
        let category = match cancellable(cancel, self.categorize(&run.task, mode)).await {
            None => return Resolved::Cancelled,
            Some(category) => category,
        };
        run.task.infer_category(category);

        let tools = select_tools(
            &self.tools,
            category,
            self.config.max_tools_per_plan,
            self.fast_path.tool(),
        );
        let context: Vec<ScoredEpisode> = recalled
            .into_iter()
            .filter(|s| s.similarity >= self.config.recall_min_similarity)
            .take(self.config.recall_limit)
            .collect();

        let mut repair_reason: Option<String> = None;
        let mut attempt = 1;
        loop {
            self.enter(run, if attempt == 1 { Stage::Synthesize } else { Stage::Repair });
            let request = SynthesisRequest {
                task: &run.task,
                category,
                tools: &tools,
                memory: &context,
                repair_reason: repair_reason.as_deref(),
                attempt,
            };
            let plan = match self.synthesize(request, cancel).await {
                None => return Resolved::Cancelled,
                Some(Ok(plan)) => plan,
                Some(Err(failure)) => return self.planning_failed(run, failure),
            };

            self.enter(run, Stage::Validate);
            match self.validator.validate(plan) {
                Ok(plan) => {
                    info!(task_id = %run.task.id, attempt, plan = %plan.summary(), "Plan accepted");
                    return Resolved::Plan(plan, ResolutionPath::Planned { repaired: attempt > 1 });
                }
                Err(rejection) => {
                    warn!(
                        task_id = %run.task.id,
                        attempt,
                        reason = rejection.failure.reason(),
                        error = %rejection.failure,
                        "Plan rejected"
                    );
                    let reason = rejection.failure.to_string();
                    run.rejected = Some(rejection.plan);
                    if attempt > self.config.repair_attempts {
                        return self.planning_failed(
                            run,
                            TaskFailure {
                                stage: Stage::Validate,
                                reason,
                            },
                        );
                    }
                    repair_reason = Some(reason);
                    attempt += 1;
                }
            }
        }
    }

    /// One synthesis round: the planner call plus up to `synthesis_retries`
    /// further calls when the reply is unusable. `None` if the task was
    /// cancelled.
    async fn synthesize(
        &self,
        request: SynthesisRequest<'_>,
        cancel: &CancellationToken,
    ) -> Option<Result<Plan, TaskFailure>> {
        let tries = 1 + self.config.synthesis_retries;
        let mut reason = String::new();
        for try_number in 1..=tries {
            match cancellable(cancel, self.synthesizer.synthesize(request)).await? {
                Ok(plan) => return Some(Ok(plan)),
                Err(e) => {
                    warn!(
                        task_id = %request.task.id,
                        attempt = request.attempt,
                        try_number,
                        error = %e,
                        "Plan synthesis failed"
                    );
                    reason = e.to_string();
                }
            }
        }
        Some(Err(TaskFailure {
            stage: Stage::Synthesize,
            reason,
        }))
    }

    fn planning_failed(&self, run: &Run, failure: TaskFailure) -> Resolved {
        warn!(task_id = %run.task.id, stage = %failure.stage, reason = %failure.reason, "Planning failed");
        self.report_error(failure.stage.as_str(), &failure.reason);
        Resolved::Failed(failure)
    }

    /// Similar past episodes for a task-only query.
    async fn recall(&self, task: &Task) -> Result<Vec<ScoredEpisode>, MemoryError> {
        let query = Episode::embedding_text(task.text(), &[], "");
        let embedding = self.embedder.embed(&query).await?;
        self.memory
            .query_similar(&embedding, &EpisodeFilter::default(), self.config.recall_limit.max(1))
            .await
    }

    /// Reuse the plan of a close, successful, high-scoring episode if it
    /// still validates against the current registry.
    fn cache_hit(&self, run: &mut Run, recalled: &[ScoredEpisode]) -> Option<Resolved> {
        let candidate = recalled.iter().find(|s| {
            s.episode.success
                && s.episode.quality_score >= self.config.cache_quality_threshold
                && s.similarity >= self.config.cache_similarity_threshold
                && s.episode.plan.is_some()
        })?;
        let cached = candidate.episode.plan.as_ref()?.reissue(run.task.id.clone());

        self.enter(run, Stage::Validate);
        match self.validator.validate(cached) {
            Ok(plan) => {
                info!(
                    task_id = %run.task.id,
                    episode_id = %candidate.episode.id,
                    similarity = candidate.similarity,
                    "Reusing cached plan"
                );
                run.task.infer_category(candidate.episode.category);
                Some(Resolved::Plan(
                    plan,
                    ResolutionPath::CacheHit {
                        episode_id: candidate.episode.id.clone(),
                        similarity: candidate.similarity,
                    },
                ))
            }
            Err(rejection) => {
                debug!(
                    task_id = %run.task.id,
                    error = %rejection.failure,
                    "Cached plan no longer valid, planning afresh"
                );
                None
            }
        }
    }

    /// Category from the router (multi-agent mode) or the classifier.
    /// Any failure falls back to `mixed`.
    async fn categorize(&self, task: &Task, mode: RunMode) -> TaskCategory {
        let result = match (&self.router, mode) {
            (Some(router), RunMode::MultiAgent) => {
                debug!(task_id = %task.id, router = router.name(), "Routing task");
                router.route(task).await
            }
            _ => self.classifier.classify(task.text()).await,
        };
        match result {
            Ok(category) => category,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Classification failed, falling back to mixed");
                TaskCategory::Mixed
            }
        }
    }

    async fn persist(&self, run: &Run, episode: Episode) -> Option<String> {
        let episode_id = episode.id.clone();
        let quality_score = episode.quality_score;
        match self.memory.write(episode).await {
            Ok(()) => {
                debug!(task_id = %run.task.id, episode_id = %episode_id, "Episode persisted");
                self.events.publish(DomainEvent::EpisodePersisted {
                    task_id: run.task.id.to_string(),
                    episode_id: episode_id.clone(),
                    quality_score,
                    timestamp: chrono::Utc::now(),
                });
                Some(episode_id)
            }
            Err(e) => {
                warn!(task_id = %run.task.id, error = %e, "Failed to persist episode");
                self.report_error("persist", &e.to_string());
                None
            }
        }
    }

    fn executor(&self) -> Executor {
        let executor = Executor::new(
            self.tools.clone(),
            Duration::from_secs(self.config.step_timeout_secs.max(1)),
        )
        .with_retries(
            self.config.step_retries,
            Duration::from_millis(self.config.step_retry_backoff_ms),
        )
        .with_events(self.events.clone());
        match &self.safety {
            Some(safety) => executor.with_safety(safety.clone()),
            None => executor,
        }
    }

    fn enter(&self, run: &mut Run, stage: Stage) {
        debug!(task_id = %run.task.id, stage = %stage, "Entering stage");
        run.stages.push(stage);
        self.events.publish(DomainEvent::StageEntered {
            task_id: run.task.id.to_string(),
            stage: stage.as_str().to_string(),
            timestamp: chrono::Utc::now(),
        });
    }

    fn report_error(&self, context: &str, message: &str) {
        self.events.publish(DomainEvent::ErrorOccurred {
            context: context.to_string(),
            error_message: message.to_string(),
            timestamp: chrono::Utc::now(),
        });
    }
}

/// Await `future` unless the task is cancelled first.
async fn cancellable<F: Future>(cancel: &CancellationToken, future: F) -> Option<F::Output> {
    if cancel.is_cancelled() {
        return None;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = future => Some(output),
    }
}

fn execution_failure_reason(record: &ExecutionRecord) -> String {
    let failed = record
        .halted_at()
        .and_then(|at| record.results().iter().find(|r| r.index == at))
        .or_else(|| record.results().iter().find(|r| r.failure_kind().is_some()));
    match failed {
        Some(result) => format!(
            "step {} ({}) failed: {}",
            result.index + 1,
            result.tool,
            result.error.as_deref().unwrap_or("unknown error")
        ),
        None => "no step succeeded".to_string(),
    }
}
