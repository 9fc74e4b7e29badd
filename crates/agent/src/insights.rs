//! Insights — turns episode statistics into recommendations with one
//! balanced-tier oracle call.

use std::sync::Arc;
use tasksmith_core::error::OracleError;
use tasksmith_core::memory::EpisodeStats;
use tasksmith_core::oracle::{Oracle, OracleRequest, Tier};
use tracing::debug;
use crate::prompts;

const INSIGHTS_MAX_TOKENS: u32 = 1024;

/// Reply used when there is no history to analyse.
pub const NO_HISTORY: &str = "No episodes recorded yet. Run a few tasks first.";

pub struct InsightAnalyst {
    oracle: Arc<dyn Oracle>,
}

impl InsightAnalyst {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// Recommendations for the recorded track record. An empty store is
    /// answered without calling the oracle.
    pub async fn recommend(&self, stats: &EpisodeStats) -> Result<String, OracleError> {
        if stats.total == 0 {
            return Ok(NO_HISTORY.to_string());
        }
        let request = OracleRequest::new(prompts::insights_prompt(stats), Tier::Balanced)
            .with_system(prompts::INSIGHTS_SYSTEM)
            .with_max_tokens(INSIGHTS_MAX_TOKENS);
        let response = self.oracle.complete(request).await?;
        let text = response.text.trim();
        if text.is_empty() {
            return Err(OracleError::EmptyResponse);
        }
        debug!(episodes = stats.total, model = %response.model, "Insights generated");
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::SequentialOracle;
    use std::collections::BTreeMap;
    use tasksmith_core::memory::Trend;

    fn stats() -> EpisodeStats {
        EpisodeStats {
            total: 20,
            successes: 11,
            success_rate: 0.55,
            avg_quality: 0.62,
            avg_steps: 2.5,
            tool_usage: BTreeMap::from([("web_fetch".to_string(), 4), ("web_search".to_string(), 12)]),
            tool_success_rate: BTreeMap::from([("web_fetch".to_string(), 0.25), ("web_search".to_string(), 0.75)]),
            recent_success_rate: 0.8,
            trend: Trend::Improving,
        }
    }

    #[tokio::test]
    async fn sends_the_report_on_the_balanced_tier() {
        let oracle = Arc::new(SequentialOracle::texts(&["  1. Prefer web_search over web_fetch.\n"]));
        let analyst = InsightAnalyst::new(oracle.clone());

        let advice = analyst.recommend(&stats()).await.unwrap();

        assert_eq!(advice, "1. Prefer web_search over web_fetch.");
        let requests = oracle.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tier, Tier::Balanced);
        assert_eq!(requests[0].system.as_deref(), Some(prompts::INSIGHTS_SYSTEM));
        let prompt = &requests[0].prompt;
        assert!(prompt.contains("Episodes: 20"));
        assert!(prompt.contains("Success rate: 55%"));
        assert!(prompt.contains("Recent success rate: 80%"));
        assert!(prompt.contains("Trend: improving"));
        // Most used tool first.
        let search = prompt.find("- web_search: 12 episodes, 75% successful").unwrap();
        let fetch = prompt.find("- web_fetch: 4 episodes, 25% successful").unwrap();
        assert!(search < fetch);
    }

    #[tokio::test]
    async fn empty_history_skips_the_oracle() {
        let oracle = Arc::new(SequentialOracle::new(vec![]));
        let advice = InsightAnalyst::new(oracle.clone())
            .recommend(&EpisodeStats::default())
            .await
            .unwrap();
        assert_eq!(advice, NO_HISTORY);
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn oracle_errors_propagate() {
        let oracle = Arc::new(SequentialOracle::new(vec![Err(OracleError::RateLimited { retry_after_secs: 30 })]));
        let err = InsightAnalyst::new(oracle).recommend(&stats()).await.unwrap_err();
        assert!(matches!(err, OracleError::RateLimited { .. }));

        let blank = Arc::new(SequentialOracle::texts(&["   "]));
        let err = InsightAnalyst::new(blank).recommend(&stats()).await.unwrap_err();
        assert!(matches!(err, OracleError::EmptyResponse));
    }
}
