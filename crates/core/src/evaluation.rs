//! Evaluation result — the graded verdict on one task attempt.

use serde::{Deserialize, Serialize};

/// A continuous quality score plus an independent success flag.
///
/// `quality_score` is always clamped to `[0.0, 1.0]` so scores from
/// different episodes stay comparable for ranking and caching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    quality_score: f32,
    pub success: bool,
    pub rationale: String,
}

impl EvaluationResult {
    pub fn new(quality_score: f32, success: bool, rationale: impl Into<String>) -> Self {
        Self {
            quality_score: clamp_score(quality_score),
            success,
            rationale: rationale.into(),
        }
    }

    /// Verdict for a task that never produced an execution worth scoring.
    pub fn failure(rationale: impl Into<String>) -> Self {
        Self::new(0.0, false, rationale)
    }

    pub fn quality_score(&self) -> f32 {
        self.quality_score
    }
}

/// Clamp into `[0, 1]`; NaN counts as zero.
pub fn clamp_score(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_is_clamped() {
        assert_eq!(EvaluationResult::new(1.7, true, "").quality_score(), 1.0);
        assert_eq!(EvaluationResult::new(-0.2, false, "").quality_score(), 0.0);
        assert_eq!(EvaluationResult::new(f32::NAN, false, "").quality_score(), 0.0);
    }

    #[test]
    fn failure_is_zero_and_unsuccessful() {
        let result = EvaluationResult::failure("planning failed");
        assert_eq!(result.quality_score(), 0.0);
        assert!(!result.success);
        assert_eq!(result.rationale, "planning failed");
    }
}
