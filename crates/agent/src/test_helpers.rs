//! Shared test helpers: scripted oracles and recording mock tools.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tasksmith_core::error::{OracleError, ToolError};
use tasksmith_core::oracle::{Oracle, OracleRequest, OracleResponse};
use tasksmith_core::task::TaskCategory;
use tasksmith_core::tool::{ParamType, Tool, ToolInputs, ToolOutput, ToolParam, ToolRegistry};

fn response(text: String) -> OracleResponse {
    OracleResponse {
        text,
        model: "mock-model".into(),
        usage: None,
    }
}

/// An oracle that returns a sequence of scripted replies.
///
/// Each call to `complete` pops the next reply. Once the script is
/// exhausted every call fails with `NotConfigured`.
pub struct SequentialOracle {
    replies: Mutex<VecDeque<Result<String, OracleError>>>,
    requests: Mutex<Vec<OracleRequest>>,
}

impl SequentialOracle {
    pub fn new(replies: Vec<Result<String, OracleError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Oracle for SequentialOracle {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: OracleRequest) -> Result<OracleResponse, OracleError> {
        self.requests.lock().unwrap().push(request);
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(reply) => reply.map(response),
            None => Err(OracleError::NotConfigured("script exhausted".into())),
        }
    }
}

type Handler = dyn Fn(&OracleRequest) -> Result<String, OracleError> + Send + Sync;

/// An oracle that answers through a closure, for tests that run many
/// tasks concurrently and cannot rely on call order.
pub struct FnOracle {
    handler: Box<Handler>,
    calls: Mutex<Vec<OracleRequest>>,
}

impl FnOracle {
    pub fn new(
        handler: impl Fn(&OracleRequest) -> Result<String, OracleError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Oracle for FnOracle {
    fn name(&self) -> &str {
        "fn_mock"
    }

    async fn complete(&self, request: OracleRequest) -> Result<OracleResponse, OracleError> {
        let reply = (self.handler)(&request);
        self.calls.lock().unwrap().push(request);
        reply.map(response)
    }
}

/// Which system prompt a request was sent with.
pub fn stage_of(request: &OracleRequest) -> &'static str {
    let system = request.system.as_deref().unwrap_or_default();
    if system == crate::prompts::CLASSIFIER_SYSTEM {
        "classify"
    } else if system == crate::prompts::PLANNER_SYSTEM {
        "plan"
    } else if system == crate::prompts::EVALUATOR_SYSTEM {
        "evaluate"
    } else {
        "other"
    }
}

/// A recording mock tool with a fixed reply.
pub struct MockTool {
    name: String,
    params: Vec<ToolParam>,
    outputs: Vec<String>,
    categories: Vec<TaskCategory>,
    reply: Result<ToolOutput, ToolError>,
    /// Errors returned, in order, before the reply
    leading_failures: Mutex<VecDeque<ToolError>>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<ToolInputs>>>,
}

impl MockTool {
    pub fn new(name: &str, required: &[&str], outputs: &[&str]) -> Self {
        let slot = outputs.first().copied().unwrap_or("text");
        Self {
            name: name.to_string(),
            params: required
                .iter()
                .map(|p| ToolParam::required(*p, ParamType::String, *p))
                .collect(),
            outputs: outputs.iter().map(|o| o.to_string()).collect(),
            categories: TaskCategory::ALL.to_vec(),
            reply: Ok(ToolOutput::new().with(slot, format!("{name} output"))),
            leading_failures: Mutex::new(VecDeque::new()),
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn optional(mut self, param: &str) -> Self {
        self.params.push(ToolParam::optional(param, ParamType::String, param));
        self
    }

    pub fn categories(mut self, categories: &[TaskCategory]) -> Self {
        self.categories = categories.to_vec();
        self
    }

    pub fn replying(mut self, output: ToolOutput) -> Self {
        self.reply = Ok(output);
        self
    }

    pub fn failing(mut self, error: ToolError) -> Self {
        self.reply = Err(error);
        self
    }

    /// Fail the first `times` invocations with `error`, then reply normally.
    pub fn failing_first(self, times: usize, error: ToolError) -> Self {
        self.leading_failures.lock().unwrap().extend(std::iter::repeat_n(error, times));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Handle on the inputs of every invocation.
    pub fn calls(&self) -> Arc<Mutex<Vec<ToolInputs>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "mock tool"
    }

    fn params(&self) -> Vec<ToolParam> {
        self.params.clone()
    }

    fn outputs(&self) -> Vec<String> {
        self.outputs.clone()
    }

    fn categories(&self) -> Vec<TaskCategory> {
        self.categories.clone()
    }

    async fn invoke(&self, inputs: ToolInputs) -> Result<ToolOutput, ToolError> {
        self.calls.lock().unwrap().push(inputs);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.leading_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.reply.clone()
    }
}

/// Call logs of the tools in [`standard_registry`].
pub struct ToolCalls {
    pub writer: Arc<Mutex<Vec<ToolInputs>>>,
    pub search: Arc<Mutex<Vec<ToolInputs>>>,
    pub fetch: Arc<Mutex<Vec<ToolInputs>>>,
}

/// A registry shaped like the built-in one: a writer, a search tool and
/// a fetch tool.
pub fn standard_registry() -> (ToolRegistry, ToolCalls) {
    let writer = MockTool::new("text_writer", &["instructions"], &["text", "path"])
        .optional("context")
        .replying(ToolOutput::new().with("text", "A finished paragraph about gold prices."));
    let search = MockTool::new("web_search", &["query"], &["results", "answer"])
        .categories(&[TaskCategory::Research, TaskCategory::Data, TaskCategory::Mixed])
        .replying(ToolOutput::new().with("results", "1. Gold price today is $2,400 per ounce"));
    let fetch = MockTool::new("web_fetch", &["url"], &["content"])
        .categories(&[TaskCategory::Research, TaskCategory::Data, TaskCategory::Mixed]);

    let calls = ToolCalls {
        writer: writer.calls(),
        search: search.calls(),
        fetch: fetch.calls(),
    };
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(writer));
    registry.register(Box::new(search));
    registry.register(Box::new(fetch));
    (registry, calls)
}

/// The canonical search-then-write plan payload.
pub const SEARCH_THEN_WRITE: &str = r#"<reasoning>Look the price up first, then write about it.</reasoning>
<plan>{"steps": [
  {"id": 1, "tool": "web_search", "description": "Find the current gold price",
   "inputs": {"query": "latest gold price"}, "produces": ["results"]},
  {"id": 2, "tool": "text_writer", "description": "Write the paragraph",
   "inputs": {"instructions": "Write a paragraph about the gold price",
              "context": {"from_step": 1, "output": "results"}},
   "produces": ["text"]}
]}</plan>"#;
