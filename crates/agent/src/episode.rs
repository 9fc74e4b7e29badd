//! Episode assembly — the single memory record written for each run.

use chrono::Utc;
use tasksmith_core::evaluation::EvaluationResult;
use tasksmith_core::execution::{ExecutionRecord, ExecutionStatus};
use tasksmith_core::memory::{Embedder, Episode, EpisodeOutcome};
use tasksmith_core::task::{RunMode, Task, TaskCategory};
use tracing::warn;
use crate::prompts::truncate;

const OUTCOME_SUMMARY_CHARS: usize = 200;

/// What a finished run contributes to its episode.
pub struct EpisodeInput<'a> {
    pub task: &'a Task,
    pub category: TaskCategory,
    pub mode: RunMode,
    pub record: Option<&'a ExecutionRecord>,
    pub evaluation: &'a EvaluationResult,
    /// Stage and reason when the run ended in `Failed`
    pub failure: Option<(&'a str, &'a str)>,
    pub cancelled: bool,
}

/// Build the episode, embedding it with `embedder`. An embedding failure
/// leaves the vector empty; the episode is still worth keeping.
pub async fn assemble(input: EpisodeInput<'_>, embedder: &dyn Embedder) -> Episode {
    let outcome = if input.cancelled {
        EpisodeOutcome::Cancelled
    } else if input.failure.is_some()
        || input.record.is_none_or(|r| r.status() == ExecutionStatus::Failed)
    {
        EpisodeOutcome::Failed
    } else {
        EpisodeOutcome::Completed
    };

    let outcome_summary = truncate(&summarize(&input, outcome), OUTCOME_SUMMARY_CHARS);
    let tools_used = input.record.map(|r| r.tools_used()).unwrap_or_default();
    let plan = input.record.map(|r| r.plan().clone());

    let embedding_text = Episode::embedding_text(input.task.text(), &tools_used, &outcome_summary);
    let embedding = match embedder.embed(&embedding_text).await {
        Ok(vector) => vector,
        Err(e) => {
            warn!(task_id = %input.task.id, error = %e, "Episode embedding failed, storing without vector");
            Vec::new()
        }
    };

    Episode {
        id: Episode::new_id(),
        task_text: input.task.text().to_string(),
        category: input.category,
        plan_summary: plan.as_ref().map(|p| p.summary()).unwrap_or_default(),
        tools_used,
        outcome_summary,
        quality_score: input.evaluation.quality_score(),
        success: input.evaluation.success && outcome == EpisodeOutcome::Completed,
        outcome,
        mode: input.mode,
        step_count: plan.as_ref().map(|p| p.len()).unwrap_or(0),
        plan,
        embedding,
        created_at: Utc::now(),
    }
}

fn summarize(input: &EpisodeInput<'_>, outcome: EpisodeOutcome) -> String {
    if let Some((stage, reason)) = input.failure {
        return format!("failed at {stage}: {reason}");
    }
    let output = input
        .record
        .and_then(|r| r.final_output())
        .filter(|o| !o.trim().is_empty());
    match (outcome, output) {
        (EpisodeOutcome::Cancelled, Some(o)) => format!("cancelled after partial output: {o}"),
        (EpisodeOutcome::Cancelled, None) => "cancelled before any output".to_string(),
        (_, Some(o)) => o.split_whitespace().collect::<Vec<_>>().join(" "),
        (_, None) => "no output produced".to_string(),
    }
}
