//! Task types — the unit of work the core loop executes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The fixed vocabulary the classifier maps tasks onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Writing,
    Code,
    Research,
    Data,
    Presentation,
    Mixed,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 6] = [
        TaskCategory::Writing,
        TaskCategory::Code,
        TaskCategory::Research,
        TaskCategory::Data,
        TaskCategory::Presentation,
        TaskCategory::Mixed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::Writing => "writing",
            TaskCategory::Code => "code",
            TaskCategory::Research => "research",
            TaskCategory::Data => "data",
            TaskCategory::Presentation => "presentation",
            TaskCategory::Mixed => "mixed",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        TaskCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| format!("unknown task category: {s}"))
    }
}

/// Whether the caller wants the single-agent path or the path routed by an
/// external multi-agent router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Single,
    MultiAgent,
}

/// Unique identifier for a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    /// Short ids keep log lines readable; collisions within one process are
    /// irrelevant because ids only correlate log output and episodes.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string()[..8].to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A natural-language task submitted to the executor.
///
/// The text never changes after creation. The category starts as whatever
/// the caller declared (usually nothing) and may be set once by the
/// classifier or router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    text: String,
    category: Option<TaskCategory>,
    #[serde(default)]
    category_inferred: bool,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            text: text.into(),
            category: None,
            category_inferred: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_category(mut self, category: TaskCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn category(&self) -> Option<TaskCategory> {
        self.category
    }

    /// Record the inferred category. Returns `false` (and leaves the task
    /// untouched) if a category was already inferred.
    pub fn infer_category(&mut self, category: TaskCategory) -> bool {
        if self.category_inferred {
            return false;
        }
        self.category = Some(category);
        self.category_inferred = true;
        true
    }
}
