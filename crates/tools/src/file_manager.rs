//! File manager tool — read, write, append and list files confined to the
//! workspace directory.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tasksmith_core::error::ToolError;
use tasksmith_core::task::TaskCategory;
use tasksmith_core::tool::{ParamType, Tool, ToolInputs, ToolOutput, ToolParam};
use tracing::debug;
use crate::{required_text, text_input};

const NAME: &str = "file_manager";
const MAX_LISTED: usize = 200;

pub struct FileManagerTool {
    root: PathBuf,
}

impl FileManagerTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a workspace-relative path. Absolute paths, `..` components
    /// and symlinks leading out of the root are refused.
    fn resolve(&self, relative: &str) -> Result<PathBuf, ToolError> {
        let relative = relative.trim().replace('\\', "/");
        let candidate = Path::new(&relative);
        if candidate.is_absolute() || relative.starts_with('/') {
            return Err(ToolError::access_denied(
                NAME,
                format!("'{relative}' is outside the workspace"),
            ));
        }
        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_) | Component::RootDir))
        {
            return Err(ToolError::access_denied(
                NAME,
                format!("Path traversal detected: {relative}"),
            ));
        }

        let full = self.root.join(candidate);
        if full.exists()
            && let (Ok(canonical), Ok(root)) = (full.canonicalize(), self.root.canonicalize())
            && !canonical.starts_with(&root)
        {
            return Err(ToolError::access_denied(
                NAME,
                format!("'{relative}' resolves outside the workspace"),
            ));
        }
        Ok(full)
    }

    async fn list(&self) -> Result<Vec<String>, ToolError> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(ToolError::execution_failed(NAME, format!("Failed to list workspace: {e}")));
                }
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                match entry.file_type().await {
                    Ok(t) if t.is_dir() => pending.push(path),
                    Ok(t) if t.is_file() => {
                        if let Ok(rel) = path.strip_prefix(&self.root) {
                            files.push(rel.to_string_lossy().replace('\\', "/"));
                        }
                    }
                    _ => {}
                }
            }
        }
        files.sort();
        files.truncate(MAX_LISTED);
        Ok(files)
    }

    async fn ensure_parent(path: &Path) -> Result<(), ToolError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ToolError::execution_failed(NAME, format!("Failed to create directory: {e}"))
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl Tool for FileManagerTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Read, write, append to, or list files in the workspace. \
         Use for saving results, reading data files, and creating reports."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::required("action", ParamType::String, "One of: read, write, append, list"),
            ToolParam::optional("path", ParamType::String, "File path relative to the workspace"),
            ToolParam::optional("content", ParamType::String, "Content for write/append"),
        ]
    }

    fn outputs(&self) -> Vec<String> {
        vec!["content".into(), "path".into(), "files".into()]
    }

    fn categories(&self) -> Vec<TaskCategory> {
        vec![
            TaskCategory::Code,
            TaskCategory::Data,
            TaskCategory::Writing,
            TaskCategory::Presentation,
            TaskCategory::Mixed,
        ]
    }

    async fn invoke(&self, inputs: ToolInputs) -> Result<ToolOutput, ToolError> {
        let action = required_text(NAME, &inputs, "action")?.trim().to_lowercase();

        if action == "list" {
            let files = self.list().await?;
            let listing = if files.is_empty() {
                "(empty workspace)".to_string()
            } else {
                files.join("\n")
            };
            return Ok(ToolOutput::new().with("files", listing));
        }

        let relative = required_text(NAME, &inputs, "path")?;
        let path = self.resolve(&relative)?;

        match action.as_str() {
            "read" => {
                let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        ToolError::execution_failed(NAME, format!("File not found: {relative}"))
                    } else {
                        ToolError::execution_failed(NAME, format!("Failed to read {relative}: {e}"))
                    }
                })?;
                Ok(ToolOutput::new()
                    .with("content", content)
                    .with("path", relative))
            }
            "write" | "append" => {
                let content = text_input(&inputs, "content").unwrap_or_default();
                Self::ensure_parent(&path).await?;
                let written = if action == "write" {
                    tokio::fs::write(&path, &content).await
                } else {
                    use tokio::io::AsyncWriteExt;
                    match tokio::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&path)
                        .await
                    {
                        Ok(mut file) => file.write_all(content.as_bytes()).await,
                        Err(e) => Err(e),
                    }
                };
                written.map_err(|e| ToolError::execution_failed(NAME, format!("Failed to {action} {relative}: {e}")))?;

                debug!(path = %path.display(), bytes = content.len(), action = %action, "File updated");
                Ok(ToolOutput::new()
                    .with("path", relative)
                    .with("content", content))
            }
            other => Err(ToolError::invalid_arguments(
                NAME,
                format!("Unknown action '{other}'. Use read, write, append, or list"),
            )),
        }
    }
}
