//! Web search tool — calls a Tavily-style JSON search API.
//!
//! Request: `POST {api_url}` with `{api_key, query, max_results,
//! include_answer}`. The response's optional `answer` and ranked `results`
//! are rendered as a numbered text list for downstream steps.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tasksmith_config::ToolsConfig;
use tasksmith_core::error::ToolError;
use tasksmith_core::task::TaskCategory;
use tasksmith_core::tool::{ParamType, Tool, ToolInputs, ToolOutput, ToolParam};
use tracing::{debug, warn};
use crate::{required_text, truncate_chars, usize_input};

const NAME: &str = "web_search";
const DEFAULT_MAX_RESULTS: usize = 5;
const SNIPPET_CHARS: usize = 200;

pub struct WebSearchTool {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl WebSearchTool {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key,
            timeout_secs: 15,
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(config.search_api_url.clone(), config.search_api_key.clone())
            .with_timeout(config.http_timeout_secs)
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

fn format_results(response: &SearchResponse) -> String {
    let mut lines = Vec::new();
    if let Some(answer) = response.answer.as_deref().filter(|a| !a.trim().is_empty()) {
        lines.push(format!("Answer: {answer}\n"));
    }
    for (i, hit) in response.results.iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, hit.title));
        lines.push(format!("   URL: {}", hit.url));
        if !hit.content.is_empty() {
            lines.push(format!("   {}", truncate_chars(&hit.content, SNIPPET_CHARS)));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Search the internet for current information: news, facts, prices, events. \
         Returns relevant results with titles, URLs and content snippets."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::required("query", ParamType::String, "Search query"),
            ToolParam::optional("max_results", ParamType::Integer, "Maximum number of results (default 5)"),
        ]
    }

    fn outputs(&self) -> Vec<String> {
        vec!["results".into(), "answer".into()]
    }

    fn categories(&self) -> Vec<TaskCategory> {
        vec![TaskCategory::Research, TaskCategory::Data, TaskCategory::Mixed]
    }

    async fn invoke(&self, inputs: ToolInputs) -> Result<ToolOutput, ToolError> {
        let query = required_text(NAME, &inputs, "query")?;
        let max_results = usize_input(&inputs, "max_results")
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, 10);

        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ToolError::unavailable(NAME, "Search API key is not configured"))?;

        let body = SearchRequest {
            api_key,
            query: &query,
            max_results,
            include_answer: true,
        };

        let response = self
            .client
            .post(&self.api_url)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::timeout(NAME, self.timeout_secs)
                } else {
                    ToolError::unavailable(NAME, format!("Search API unreachable: {e}"))
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let text = response.text().await.unwrap_or_default();
            warn!(status, "Search API returned an error");
            return Err(match status {
                401 | 403 => ToolError::unavailable(NAME, "Search API key rejected"),
                429 => ToolError::execution_failed(NAME, "Search API rate limit reached"),
                s if s >= 500 => ToolError::unavailable(NAME, format!("Search API error ({s})")),
                s => ToolError::execution_failed(NAME, format!("Search API error ({s}): {text}")),
            });
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ToolError::execution_failed(NAME, format!("Failed to parse search response: {e}")))?;

        debug!(query = %query, hits = parsed.results.len(), "Search complete");

        Ok(ToolOutput::new()
            .with("results", format_results(&parsed))
            .with("answer", parsed.answer.unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasksmith_core::error::ToolErrorKind;

    fn query(q: &str) -> ToolInputs {
        let mut inputs = ToolInputs::new();
        inputs.insert("query".into(), q.into());
        inputs
    }

    #[test]
    fn formats_answer_and_numbered_hits() {
        let response: SearchResponse = serde_json::from_value(serde_json::json!({
            "answer": "Gold trades near $2,400.",
            "results": [
                {"title": "Gold price today", "url": "https://a.example", "content": "x".repeat(500)},
                {"title": "Markets", "url": "https://b.example"}
            ]
        }))
        .unwrap();

        let text = format_results(&response);
        assert!(text.starts_with("Answer: Gold trades near $2,400."));
        assert!(text.contains("1. Gold price today"));
        assert!(text.contains("   URL: https://b.example"));
        assert!(!text.contains(&"x".repeat(201)));
    }

    #[tokio::test]
    async fn missing_key_is_unavailable() {
        let tool = WebSearchTool::new("https://api.tavily.com/search", None);
        let err = tool.invoke(query("gold price")).await.unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::Unavailable);
        assert!(err.kind.is_plan_fatal());
    }

    #[tokio::test]
    async fn missing_query_is_invalid() {
        let tool = WebSearchTool::new("https://api.tavily.com/search", Some("k".into()));
        let err = tool.invoke(ToolInputs::new()).await.unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::InvalidArguments);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let tool = WebSearchTool::new("http://127.0.0.1:1/search", Some("k".into())).with_timeout(2);
        let err = tool.invoke(query("anything")).await.unwrap_err();
        assert!(matches!(err.kind, ToolErrorKind::Unavailable | ToolErrorKind::Timeout));
    }
}
