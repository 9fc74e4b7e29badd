//! Text writer tool — long-form writing through the oracle.
//!
//! This is the tool the fast path routes to. It asks the balanced tier for
//! the finished text and, when a filename is given, saves it under the
//! output directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tasksmith_core::error::ToolError;
use tasksmith_core::oracle::{Oracle, OracleRequest, Tier};
use tasksmith_core::task::TaskCategory;
use tasksmith_core::tool::{ParamType, Tool, ToolInputs, ToolOutput, ToolParam};
use tracing::debug;
use crate::{required_text, text_input};

const NAME: &str = "text_writer";
const MAX_TOKENS: u32 = 4000;

pub struct TextWriterTool {
    oracle: Arc<dyn Oracle>,
    output_dir: Option<PathBuf>,
}

impl TextWriterTool {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            output_dir: None,
        }
    }

    /// Save files into `dir` when a `filename` input is supplied.
    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.output_dir = Some(dir);
        self
    }

    fn system_prompt(language: Option<&str>) -> String {
        let base = "You are a professional writer. Write structured, clear, \
                    well-argued content in Markdown. Reply with the text of the \
                    document only, without any preamble such as 'Here is the text:'.";
        match language {
            Some(lang) => format!("{base} Write in this language: {lang}."),
            None => format!("{base} Write in the same language as the instructions."),
        }
    }

    fn prompt(instructions: &str, context: Option<&str>) -> String {
        match context {
            Some(ctx) if !ctx.trim().is_empty() => format!(
                "{instructions}\n\nUse the following material as your source:\n<context>\n{ctx}\n</context>"
            ),
            _ => instructions.to_string(),
        }
    }

    async fn save(&self, dir: &Path, filename: &str, text: &str) -> Result<PathBuf, ToolError> {
        // Only the final component is honoured; the tool never writes outside `dir`.
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| ToolError::invalid_arguments(NAME, format!("Invalid filename: {filename}")))?;
        let path = dir.join(name);

        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            ToolError::execution_failed(NAME, format!("Failed to create output directory: {e}"))
        })?;
        tokio::fs::write(&path, text)
            .await
            .map_err(|e| ToolError::execution_failed(NAME, format!("Failed to write {}: {e}", path.display())))?;
        Ok(path)
    }
}

#[async_trait]
impl Tool for TextWriterTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Write long-form text (articles, summaries, reports, letters, poems) from instructions \
         and optional source material. Optionally saves the result to a file."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::required("instructions", ParamType::String, "What to write, with full instructions"),
            ToolParam::optional("context", ParamType::String, "Source material to base the text on"),
            ToolParam::optional("filename", ParamType::String, "File to save the text to (e.g. report.md)"),
            ToolParam::optional("language", ParamType::String, "Language to write in; defaults to the language of the instructions"),
        ]
    }

    fn outputs(&self) -> Vec<String> {
        vec!["text".into(), "path".into()]
    }

    fn categories(&self) -> Vec<TaskCategory> {
        TaskCategory::ALL.to_vec()
    }

    async fn invoke(&self, inputs: ToolInputs) -> Result<ToolOutput, ToolError> {
        let instructions = required_text(NAME, &inputs, "instructions")?;
        let context = text_input(&inputs, "context");
        let language = text_input(&inputs, "language");

        let request = OracleRequest::new(Self::prompt(&instructions, context.as_deref()), Tier::Balanced)
            .with_system(Self::system_prompt(language.as_deref()))
            .with_max_tokens(MAX_TOKENS)
            .with_temperature(0.7);

        let response = self.oracle.complete(request).await.map_err(|e| {
            if e.is_transient() {
                ToolError::execution_failed(NAME, format!("Oracle call failed: {e}"))
            } else {
                ToolError::unavailable(NAME, format!("Oracle unavailable: {e}"))
            }
        })?;

        let text = response.text.trim().to_string();
        if text.is_empty() {
            return Err(ToolError::execution_failed(NAME, "Oracle returned no text"));
        }
        debug!(chars = text.chars().count(), model = %response.model, "Text written");

        let mut output = ToolOutput::new().with("text", text.clone());
        if let Some(filename) = text_input(&inputs, "filename").filter(|f| !f.trim().is_empty())
            && let Some(dir) = &self.output_dir
        {
            let path = self.save(dir, filename.trim(), &text).await?;
            output = output.with("path", path.display().to_string());
        }
        Ok(output)
    }
}
