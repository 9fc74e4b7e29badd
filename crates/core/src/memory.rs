//! Memory traits — long-term episodic storage with similarity search.
//!
//! Every task attempt is written once as an [`Episode`]. Before planning,
//! the core loop embeds the incoming task and asks the store for similar
//! past episodes, both as planning context and as candidates for reuse.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use crate::error::MemoryError;
use crate::plan::Plan;
use crate::task::{RunMode, TaskCategory};

/// How an attempt ended, independent of its score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeOutcome {
    Completed,
    Failed,
    Cancelled,
}

impl EpisodeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeOutcome::Completed => "completed",
            EpisodeOutcome::Failed => "failed",
            EpisodeOutcome::Cancelled => "cancelled",
        }
    }
}

/// One persisted record of a task attempt. Append-only; never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub task_text: String,
    pub category: TaskCategory,
    pub plan_summary: String,
    #[serde(default)]
    pub tools_used: Vec<String>,
    pub outcome_summary: String,
    pub quality_score: f32,
    pub success: bool,
    pub outcome: EpisodeOutcome,
    #[serde(default)]
    pub mode: RunMode,
    /// Executed plan, kept so a later cache hit can replay it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub step_count: usize,
    #[serde(default)]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl Episode {
    /// A fresh episode id.
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// The structured text an embedding is computed over.
    pub fn embedding_text(task: &str, tools: &[String], outcome: &str) -> String {
        format!("task: {task}\ntools: {}\noutcome: {outcome}", tools.join(", "))
    }
}

/// Metadata filters applied on top of similarity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeFilter {
    #[serde(default)]
    pub category: Option<TaskCategory>,
    #[serde(default)]
    pub success_only: bool,
    #[serde(default)]
    pub min_quality: Option<f32>,
    /// Every keyword must appear (case-insensitive) in the task text
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl EpisodeFilter {
    pub fn successful() -> Self {
        Self {
            success_only: true,
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: TaskCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_min_quality(mut self, min_quality: f32) -> Self {
        self.min_quality = Some(min_quality);
        self
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into());
        self
    }

    pub fn matches(&self, episode: &Episode) -> bool {
        if self.success_only && !episode.success {
            return false;
        }
        if let Some(category) = self.category {
            if episode.category != category {
                return false;
            }
        }
        if let Some(min) = self.min_quality {
            if episode.quality_score < min {
                return false;
            }
        }
        let text = episode.task_text.to_lowercase();
        self.keywords
            .iter()
            .all(|k| text.contains(&k.to_lowercase()))
    }
}

/// An episode paired with its similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEpisode {
    pub episode: Episode,
    pub similarity: f32,
}

/// Episodes in each window of the recent-trend comparison.
pub const RECENT_WINDOW: usize = 10;

/// Direction of the success rate over the two most recent windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    #[default]
    Stable,
    Declining,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Improving => "improving",
            Trend::Stable => "stable",
            Trend::Declining => "declining",
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate statistics over stored episodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeStats {
    pub total: usize,
    pub successes: usize,
    pub success_rate: f32,
    pub avg_quality: f32,
    pub avg_steps: f32,
    /// Number of episodes each tool was used in
    pub tool_usage: BTreeMap<String, usize>,
    /// Share of the episodes using each tool that succeeded
    #[serde(default)]
    pub tool_success_rate: BTreeMap<String, f32>,
    /// Success rate of the newest [`RECENT_WINDOW`] episodes
    #[serde(default)]
    pub recent_success_rate: f32,
    /// Newest window against the one before it; `Stable` until both exist
    #[serde(default)]
    pub trend: Trend,
}

impl EpisodeStats {
    /// Fold a set of episodes into statistics.
    pub fn from_episodes<'a>(episodes: impl IntoIterator<Item = &'a Episode>) -> Self {
        let mut stats = EpisodeStats::default();
        let mut quality_sum = 0.0f32;
        let mut steps_sum = 0usize;
        let mut tool_successes: BTreeMap<&str, usize> = BTreeMap::new();
        let mut timeline: Vec<(DateTime<Utc>, bool)> = Vec::new();
        for episode in episodes {
            stats.total += 1;
            if episode.success {
                stats.successes += 1;
            }
            quality_sum += episode.quality_score;
            steps_sum += episode.step_count;
            for tool in &episode.tools_used {
                *stats.tool_usage.entry(tool.clone()).or_default() += 1;
                if episode.success {
                    *tool_successes.entry(tool.as_str()).or_default() += 1;
                }
            }
            timeline.push((episode.created_at, episode.success));
        }
        if stats.total == 0 {
            return stats;
        }

        let n = stats.total as f32;
        stats.success_rate = stats.successes as f32 / n;
        stats.avg_quality = quality_sum / n;
        stats.avg_steps = steps_sum as f32 / n;
        stats.tool_success_rate = stats
            .tool_usage
            .iter()
            .map(|(tool, &uses)| {
                let wins = tool_successes.get(tool.as_str()).copied().unwrap_or(0);
                (tool.clone(), wins as f32 / uses as f32)
            })
            .collect();

        // Newest first; ties keep insertion order.
        timeline.sort_by(|a, b| b.0.cmp(&a.0));
        let outcomes: Vec<bool> = timeline.into_iter().map(|(_, success)| success).collect();
        let recent = &outcomes[..outcomes.len().min(RECENT_WINDOW)];
        let previous = &outcomes[recent.len()..outcomes.len().min(2 * RECENT_WINDOW)];
        stats.recent_success_rate = rate(recent);
        if !previous.is_empty() {
            let (now, before) = (rate(recent), rate(previous));
            stats.trend = if now > before {
                Trend::Improving
            } else if now < before {
                Trend::Declining
            } else {
                Trend::Stable
            };
        }
        stats
    }
}

fn rate(outcomes: &[bool]) -> f32 {
    if outcomes.is_empty() {
        return 0.0;
    }
    outcomes.iter().filter(|s| **s).count() as f32 / outcomes.len() as f32
}

/// The episode store.
///
/// Reads and appends must be safe under concurrent tasks; nothing is ever
/// updated in place.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "memory", "file", "none").
    fn name(&self) -> &str;

    /// Append an episode.
    async fn write(&self, episode: Episode) -> Result<(), MemoryError>;

    /// Up to `k` episodes passing `filter`, most similar first.
    async fn query_similar(
        &self,
        embedding: &[f32],
        filter: &EpisodeFilter,
        k: usize,
    ) -> Result<Vec<ScoredEpisode>, MemoryError>;

    /// Number of stored episodes.
    async fn count(&self) -> Result<usize, MemoryError>;

    /// Aggregate statistics.
    async fn stats(&self) -> Result<EpisodeStats, MemoryError>;
}

/// Maps text to a fixed-length vector. Must be deterministic.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;
}
