//! Evaluator — grades a finished execution on a continuous scale.
//!
//! A deterministic heuristic scores every step, weights the final step
//! highest and penalizes halted or cancelled runs. When an oracle is
//! attached its judgement is blended in; if the judgement cannot be had the
//! heuristic stands alone.
//!
//! Two rules hold regardless of the oracle: a source that refused access
//! is scored on whatever else was obtained rather than failing the task,
//! and correctly dated historical data is never penalized for not being
//! the latest. There is no recency check anywhere in the heuristic.

use serde_json::Value;
use std::sync::Arc;
use tasksmith_config::EvaluationConfig;
use tasksmith_core::error::ToolErrorKind;
use tasksmith_core::evaluation::{EvaluationResult, clamp_score};
use tasksmith_core::execution::{ExecutionRecord, ExecutionStatus, StepResult, StepStatus};
use tasksmith_core::oracle::{Oracle, OracleRequest, Tier};
use tasksmith_core::task::Task;
use tracing::{debug, warn};
use crate::prompts;

/// Task words shorter than this are ignored for relevance.
const MIN_CONTENT_WORD: usize = 4;

const STEP_OUTPUT_PREVIEW: usize = 300;
const FINAL_OUTPUT_PREVIEW: usize = 2000;

pub struct Evaluator {
    config: EvaluationConfig,
    oracle: Option<Arc<dyn Oracle>>,
}

/// The oracle's opinion, already clamped.
#[derive(Debug, Clone, PartialEq)]
struct Judgement {
    score: f32,
    reason: String,
}

impl Evaluator {
    pub fn new(config: EvaluationConfig) -> Self {
        Self { config, oracle: None }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn Oracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub async fn evaluate(&self, task: &Task, record: &ExecutionRecord) -> EvaluationResult {
        let judgement = match &self.oracle {
            Some(oracle) if self.config.use_oracle && record.status() != ExecutionStatus::Cancelled => {
                self.judge(oracle.as_ref(), task, record).await
            }
            _ => None,
        };
        self.verdict(task, record, judgement)
    }

    /// Heuristic-only verdict, for when the oracle must not be consulted.
    pub fn evaluate_offline(&self, task: &Task, record: &ExecutionRecord) -> EvaluationResult {
        self.verdict(task, record, None)
    }

    fn verdict(&self, task: &Task, record: &ExecutionRecord, judgement: Option<Judgement>) -> EvaluationResult {
        let heuristic = self.heuristic_score(task.text(), record);
        let status = record.status();

        let (score, rationale) = match judgement {
            Some(j) => {
                let w = self.config.oracle_weight.clamp(0.0, 1.0);
                (
                    (1.0 - w) * heuristic + w * j.score,
                    format!(
                        "heuristic {heuristic:.2}, oracle {:.2}: {}",
                        j.score, j.reason
                    ),
                )
            }
            None => (heuristic, format!("heuristic {heuristic:.2}")),
        };
        let score = clamp_score(score);

        let usable = matches!(status, ExecutionStatus::Success | ExecutionStatus::PartialFailure)
            && record.succeeded() > 0;
        let success = usable && score >= self.config.success_threshold;

        let rationale = format!(
            "{rationale}; status {}, {} of {} step(s) succeeded",
            status.as_str(),
            record.succeeded(),
            record.plan().len()
        );
        debug!(score, success, status = status.as_str(), "Execution evaluated");
        EvaluationResult::new(score, success, rationale)
    }

    /// The deterministic part of the score, in `[0, 1]`.
    pub fn heuristic_score(&self, task: &str, record: &ExecutionRecord) -> f32 {
        let last = record.plan().len().saturating_sub(1);
        let mut weighted = 0.0f32;
        let mut total_weight = 0.0f32;
        for result in record.results() {
            let weight = if result.index == last {
                self.config.final_step_weight.max(0.0)
            } else {
                1.0
            };
            weighted += weight * self.step_score(task, result);
            total_weight += weight;
        }
        if total_weight <= 0.0 {
            return 0.0;
        }

        let mut score = weighted / total_weight;
        if record.halted_at().is_some() || record.status() == ExecutionStatus::Cancelled {
            score -= self.config.fatal_penalty;
        }
        clamp_score(score)
    }

    fn step_score(&self, task: &str, result: &StepResult) -> f32 {
        match &result.status {
            StepStatus::Success => match &result.output {
                Some(output) if !output.is_empty() => 0.6 + 0.4 * relevance(task, &output.text()),
                _ => 0.1,
            },
            StepStatus::Failure { kind: ToolErrorKind::AccessDenied } => self.config.access_denied_credit,
            StepStatus::Failure { .. } | StepStatus::Skipped { .. } => 0.0,
        }
    }

    async fn judge(&self, oracle: &dyn Oracle, task: &Task, record: &ExecutionRecord) -> Option<Judgement> {
        let steps: Vec<String> = record
            .results()
            .iter()
            .map(|r| {
                let detail = match (&r.output, &r.error) {
                    (Some(output), _) => prompts::truncate(&output.text(), STEP_OUTPUT_PREVIEW),
                    (None, Some(error)) => error.clone(),
                    (None, None) => String::new(),
                };
                let status = match &r.status {
                    StepStatus::Success => "ok".to_string(),
                    StepStatus::Failure { kind } => kind.as_str().to_string(),
                    StepStatus::Skipped { .. } => "skipped".to_string(),
                };
                format!("{}. {} [{status}] {detail}", r.index + 1, r.tool)
            })
            .collect();
        let output = record
            .final_output()
            .map(|o| prompts::truncate(&o, FINAL_OUTPUT_PREVIEW))
            .unwrap_or_default();

        let request = OracleRequest::new(
            prompts::evaluation_prompt(task.text(), record.status().as_str(), &steps.join("\n"), &output),
            Tier::Fast,
        )
        .with_system(prompts::EVALUATOR_SYSTEM)
        .with_max_tokens(300)
        .with_temperature(0.0);

        match oracle.complete(request).await {
            Ok(response) => {
                let judgement = parse_judgement(&response.text);
                if judgement.is_none() {
                    warn!(task_id = %task.id, "Unparsable evaluation judgement, using heuristic only");
                }
                judgement
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Evaluation oracle failed, using heuristic only");
                None
            }
        }
    }
}

/// Fraction of the task's content words that appear in `output`; 1.0 when
/// the task has none.
pub fn relevance(task: &str, output: &str) -> f32 {
    let mut words: Vec<String> = task
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_CONTENT_WORD)
        .map(str::to_string)
        .collect();
    words.sort();
    words.dedup();
    if words.is_empty() {
        return 1.0;
    }
    let haystack = output.to_lowercase();
    let found = words.iter().filter(|w| haystack.contains(w.as_str())).count();
    (found as f32 / words.len() as f32).min(1.0)
}

fn parse_judgement(raw: &str) -> Option<Judgement> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    let value: Value = serde_json::from_str(&raw[start..=end]).ok()?;
    let score = match value.get("quality_score")? {
        Value::Number(n) => n.as_f64()? as f32,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    let reason = value
        .get("reason")
        .and_then(|r| r.as_str())
        .unwrap_or("no reason given")
        .to_string();
    Some(Judgement {
        score: clamp_score(score),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::SequentialOracle;
    use tasksmith_core::error::OracleError;
    use tasksmith_core::execution::ExecutionRecordBuilder;
    use tasksmith_core::plan::{Plan, PlanStep};
    use tasksmith_core::tool::ToolOutput;

    const TASK: &str = "find the latest price of gold and write a paragraph about it";

    fn heuristic_only() -> Evaluator {
        Evaluator::new(EvaluationConfig {
            use_oracle: false,
            ..EvaluationConfig::default()
        })
    }

    fn record(tools: &[&str], results: Vec<StepResult>, halt: Option<usize>) -> ExecutionRecord {
        let steps = tools.iter().enumerate().map(|(i, t)| PlanStep::new(i, *t)).collect();
        let mut builder = ExecutionRecordBuilder::new(Plan::new(Task::new(TASK).id, steps));
        for r in results {
            builder.record(r);
        }
        if let Some(at) = halt {
            builder.halt(at);
        }
        builder.finish()
    }

    fn ok(index: usize, tool: &str, text: &str) -> StepResult {
        StepResult::success(index, tool, ToolOutput::new().with("text", text), 10)
    }

    fn search_then_write() -> ExecutionRecord {
        record(
            &["web_search", "text_writer"],
            vec![
                ok(0, "web_search", "Gold price today: $2,400 per ounce"),
                ok(1, "text_writer", "The latest gold price is $2,400, and this paragraph explains it."),
            ],
            None,
        )
    }

    #[test]
    fn relevance_counts_content_words() {
        assert_eq!(relevance("gold price", "the gold price rose"), 1.0);
        assert_eq!(relevance("gold price", "silver fell"), 0.0);
        assert_eq!(relevance("do it", "anything"), 1.0);
        assert!((relevance("latest gold price", "price of gold") - 2.0 / 3.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn successful_run_scores_high() {
        let result = heuristic_only().evaluate(&Task::new(TASK), &search_then_write()).await;
        assert!(result.success);
        assert!(result.quality_score() > 0.7, "{}", result.quality_score());
        assert!(result.quality_score() <= 1.0);
    }

    #[tokio::test]
    async fn access_denied_does_not_force_failure() {
        let record = record(
            &["web_fetch", "web_search", "text_writer"],
            vec![
                StepResult::failure(0, "web_fetch", ToolErrorKind::AccessDenied, "HTTP 403", 5),
                ok(1, "web_search", "Gold price today: $2,400"),
                ok(2, "text_writer", "The latest gold price paragraph."),
            ],
            None,
        );
        assert_eq!(record.status(), ExecutionStatus::PartialFailure);
        let result = heuristic_only().evaluate(&Task::new(TASK), &record).await;
        assert!(result.success, "{}", result.rationale);
    }

    #[tokio::test]
    async fn dated_historical_data_is_not_penalized() {
        let task = Task::new("the average gold price in 2019");
        let record = record(
            &["web_search", "text_writer"],
            vec![
                ok(0, "web_search", "In 2019 the average gold price was $1,393 per ounce."),
                ok(1, "text_writer", "The average gold price in 2019 was $1,393 per ounce."),
            ],
            None,
        );
        let result = heuristic_only().evaluate(&task, &record).await;
        assert!(result.success);
        assert!((result.quality_score() - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn halted_run_is_penalized_and_fails() {
        let record = record(
            &["web_search", "web_fetch", "text_writer"],
            vec![
                StepResult::failure(0, "web_search", ToolErrorKind::Unavailable, "no key", 1),
                ok(1, "web_fetch", "Gold price page"),
                StepResult::skipped(2, "text_writer", 0),
            ],
            Some(0),
        );
        let evaluator = heuristic_only();
        let score = evaluator.heuristic_score(TASK, &record);
        assert!(score < 0.2, "{score}");
        let result = evaluator.evaluate(&Task::new(TASK), &record).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn empty_output_earns_little() {
        let record = record(
            &["text_writer"],
            vec![StepResult::success(0, "text_writer", ToolOutput::new().with("text", "  "), 1)],
            None,
        );
        let result = heuristic_only().evaluate(&Task::new(TASK), &record).await;
        assert!((result.quality_score() - 0.1).abs() < 1e-6);
        assert!(!result.success);
    }

    #[tokio::test]
    async fn oracle_judgement_is_blended() {
        let oracle = Arc::new(SequentialOracle::texts(&[
            r#"{"quality_score": 0.0, "success": false, "reason": "off topic"}"#,
        ]));
        let evaluator = Evaluator::new(EvaluationConfig::default()).with_oracle(oracle.clone());
        let record = search_then_write();
        let heuristic = evaluator.heuristic_score(TASK, &record);

        let result = evaluator.evaluate(&Task::new(TASK), &record).await;
        assert!((result.quality_score() - heuristic * 0.5).abs() < 1e-6);
        assert!(result.rationale.contains("off topic"));
        assert_eq!(oracle.requests()[0].tier, Tier::Fast);
    }

    #[tokio::test]
    async fn bad_judgement_falls_back_to_heuristic() {
        for reply in [
            Ok("looks great to me".to_string()),
            Err(OracleError::RateLimited { retry_after_secs: 3 }),
        ] {
            let oracle = Arc::new(SequentialOracle::new(vec![reply]));
            let evaluator = Evaluator::new(EvaluationConfig::default()).with_oracle(oracle);
            let record = search_then_write();
            let heuristic = evaluator.heuristic_score(TASK, &record);
            let result = evaluator.evaluate(&Task::new(TASK), &record).await;
            assert!((result.quality_score() - heuristic).abs() < 1e-6);
        }
    }

    #[test]
    fn judgement_parsing_is_lenient() {
        let j = parse_judgement("Sure:\n```json\n{\"quality_score\": \"0.8\", \"success\": true}\n```").unwrap();
        assert!((j.score - 0.8).abs() < 1e-6);
        assert_eq!(parse_judgement(r#"{"quality_score": 7}"#).unwrap().score, 1.0);
        assert!(parse_judgement(r#"{"score": 0.5}"#).is_none());
    }
}
