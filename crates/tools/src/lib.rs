//! Built-in tool implementations for Tasksmith.
//!
//! Tools give a plan the ability to act: write long-form text through the
//! oracle, search the web, fetch pages, and manage files inside the
//! workspace directory.

pub mod file_manager;
pub mod text_writer;
pub mod web_fetch;
pub mod web_search;

pub use file_manager::FileManagerTool;
pub use text_writer::TextWriterTool;
pub use web_fetch::WebFetchTool;
pub use web_search::WebSearchTool;

use std::sync::Arc;
use tasksmith_config::ToolsConfig;
use tasksmith_core::error::ToolError;
use tasksmith_core::oracle::Oracle;
use tasksmith_core::tool::{ToolInputs, ToolRegistry};

/// Create the default registry with every built-in tool.
///
/// Registration order matters: it is the order tools are offered to the
/// planner when a category has more candidates than fit in one prompt.
pub fn default_registry(oracle: Arc<dyn Oracle>, config: &ToolsConfig) -> ToolRegistry {
    let workspace = config.workspace();
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(
        TextWriterTool::new(oracle).with_output_dir(workspace.clone()),
    ));
    registry.register(Box::new(WebSearchTool::from_config(config)));
    registry.register(Box::new(WebFetchTool::from_config(config)));
    registry.register(Box::new(FileManagerTool::new(workspace)));
    registry
}

/// Read an input as text. Non-string values (e.g. a referenced array) are
/// rendered as JSON.
pub(crate) fn text_input(inputs: &ToolInputs, name: &str) -> Option<String> {
    match inputs.get(name)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub(crate) fn required_text(
    tool: &str,
    inputs: &ToolInputs,
    name: &str,
) -> Result<String, ToolError> {
    text_input(inputs, name)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::invalid_arguments(tool, format!("Missing '{name}' argument")))
}

/// Accepts integers given as numbers or numeric strings.
pub(crate) fn usize_input(inputs: &ToolInputs, name: &str) -> Option<usize> {
    match inputs.get(name)? {
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tasksmith_core::error::OracleError;
    use tasksmith_core::oracle::{OracleRequest, OracleResponse};
    use tasksmith_core::task::TaskCategory;

    struct SilentOracle;

    #[async_trait]
    impl Oracle for SilentOracle {
        fn name(&self) -> &str {
            "silent"
        }
        async fn complete(&self, _request: OracleRequest) -> Result<OracleResponse, OracleError> {
            Err(OracleError::EmptyResponse)
        }
    }

    #[test]
    fn default_registry_has_all_tools() {
        let dir = tempfile::tempdir().unwrap();
        let config = ToolsConfig {
            workspace_dir: Some(dir.path().to_path_buf()),
            ..ToolsConfig::default()
        };
        let registry = default_registry(Arc::new(SilentOracle), &config);
        assert_eq!(
            registry.names(),
            vec!["text_writer", "web_search", "web_fetch", "file_manager"]
        );
        let research: Vec<&str> = registry
            .descriptors_for(TaskCategory::Research)
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert!(research.contains(&"web_search"));
        assert!(research.contains(&"text_writer"));
    }

    #[test]
    fn input_helpers() {
        let mut inputs = ToolInputs::new();
        inputs.insert("q".into(), "rust".into());
        inputs.insert("list".into(), serde_json::json!(["a", "b"]));
        inputs.insert("n".into(), "7".into());
        inputs.insert("blank".into(), "  ".into());

        assert_eq!(text_input(&inputs, "q").as_deref(), Some("rust"));
        assert_eq!(text_input(&inputs, "list").as_deref(), Some(r#"["a","b"]"#));
        assert_eq!(usize_input(&inputs, "n"), Some(7));
        assert!(required_text("t", &inputs, "blank").is_err());
        assert!(required_text("t", &inputs, "absent").is_err());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("привет мир", 6), "привет");
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
