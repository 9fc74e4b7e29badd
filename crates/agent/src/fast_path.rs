//! Fast path — pure writing requests skip classification and planning.
//!
//! A task takes the fast path when it matches a writing pattern and no
//! search pattern. Mixed intent ("find X and write about it") always goes
//! through the planner. Patterns match at the start of a word, on the
//! lowercased text, in both Latin and Cyrillic scripts.

use regex_lite::Regex;
use tasksmith_config::FastPathConfig;
use tasksmith_core::plan::{InputBinding, Plan, PlanStep, ValidationState};
use tasksmith_core::task::Task;
use tracing::warn;

/// Characters that continue a word. Anything else is a boundary.
const WORD_CHARS: &str = "0-9a-zа-яё_";

pub struct FastPath {
    enabled: bool,
    tool: String,
    writing: Option<Regex>,
    search: Option<Regex>,
}

impl FastPath {
    pub fn new(config: &FastPathConfig) -> Self {
        Self {
            enabled: config.enabled,
            tool: config.writing_tool.clone(),
            writing: compile(&config.writing_patterns),
            search: compile(&config.search_patterns),
        }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn is_writing(&self, text: &str) -> bool {
        matches(self.writing.as_ref(), text)
    }

    pub fn is_search(&self, text: &str) -> bool {
        matches(self.search.as_ref(), text)
    }

    /// Writing intent without search intent.
    pub fn applies(&self, text: &str) -> bool {
        self.enabled && self.is_writing(text) && !self.is_search(text)
    }

    /// The single-step plan the fast path dispatches: the whole task text
    /// becomes the writing tool's instructions.
    pub fn plan(&self, task: &Task) -> Plan {
        let step = PlanStep::new(0, self.tool.clone())
            .describe("Write the requested text")
            .input("instructions", InputBinding::literal(task.text()))
            .produce("text");
        Plan::new(task.id.clone(), vec![step])
            .with_reasoning("fast path: writing request without search intent")
            .into_state(ValidationState::Valid)
    }
}

fn compile(patterns: &[String]) -> Option<Regex> {
    let alternatives: Vec<String> = patterns
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .map(|p| regex_lite::escape(&p))
        .collect();
    if alternatives.is_empty() {
        return None;
    }
    let pattern = format!("(?:^|[^{WORD_CHARS}])(?:{})", alternatives.join("|"));
    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(error = %e, "Invalid fast-path pattern list, disabling it");
            None
        }
    }
}

fn matches(re: Option<&Regex>, text: &str) -> bool {
    re.is_some_and(|re| re.is_match(&text.to_lowercase()))
}
