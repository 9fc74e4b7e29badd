//! Classifier — maps a task onto the fixed category vocabulary with one
//! fast-tier oracle call.
//!
//! In multi-agent mode an external [`TaskRouter`] takes the classifier's
//! place; either way a failure falls back to `mixed` in the core loop.

use async_trait::async_trait;
use std::sync::Arc;
use tasksmith_core::error::ClassificationError;
use tasksmith_core::oracle::{Oracle, OracleRequest, Tier};
use tasksmith_core::task::{Task, TaskCategory};
use tracing::debug;
use crate::prompts;

/// An external router that decides a task's category in multi-agent mode.
#[async_trait]
pub trait TaskRouter: Send + Sync {
    fn name(&self) -> &str;

    async fn route(&self, task: &Task) -> Result<TaskCategory, ClassificationError>;
}

pub struct Classifier {
    oracle: Arc<dyn Oracle>,
}

impl Classifier {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    pub async fn classify(&self, task: &str) -> Result<TaskCategory, ClassificationError> {
        let request = OracleRequest::new(prompts::classify_prompt(task), Tier::Fast)
            .with_system(prompts::CLASSIFIER_SYSTEM)
            .with_max_tokens(20)
            .with_temperature(0.0);
        let response = self.oracle.complete(request).await?;
        let category = parse_category(&response.text)?;
        debug!(category = %category, "Task classified");
        Ok(category)
    }
}

/// Accept a bare category word (quotes, punctuation and case ignored) or a
/// JSON object with a `category` field.
pub fn parse_category(raw: &str) -> Result<TaskCategory, ClassificationError> {
    let trimmed = raw.trim();

    if trimmed.starts_with('{')
        && let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed)
        && let Some(category) = value.get("category").and_then(|c| c.as_str())
    {
        return category
            .parse()
            .map_err(|_| ClassificationError::Unparsable(raw.to_string()));
    }

    let word: String = trimmed
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_string();
    word.parse()
        .map_err(|_| ClassificationError::Unparsable(raw.to_string()))
}
