//! Tool trait — the abstraction over executor capabilities.
//!
//! Tools are what let a plan act in the world: write text, search the web,
//! fetch pages, read and write files. Each tool declares a typed descriptor
//! (inputs, output slots, relevant task categories) that the planner shows
//! to the oracle and the validator checks plans against.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use crate::error::ToolError;
use crate::task::TaskCategory;

/// Named input values passed to a tool.
pub type ToolInputs = Map<String, Value>;

/// Primitive type of a declared tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }
}

/// One declared tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

impl ToolParam {
    pub fn required(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
            description: description.into(),
        }
    }

    pub fn optional(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }
}

/// The typed, read-only description of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name
    pub name: String,

    /// Short capability description (shown to the oracle)
    pub description: String,

    /// Declared input parameters
    pub params: Vec<ToolParam>,

    /// Named output slots later steps may reference
    pub outputs: Vec<String>,

    /// Task categories this tool is relevant to
    #[serde(default)]
    pub categories: Vec<TaskCategory>,
}

impl ToolDescriptor {
    pub fn required_params(&self) -> impl Iterator<Item = &ToolParam> {
        self.params.iter().filter(|p| p.required)
    }

    pub fn produces(&self, slot: &str) -> bool {
        self.outputs.iter().any(|o| o == slot)
    }

    pub fn is_relevant_to(&self, category: TaskCategory) -> bool {
        self.categories.contains(&category)
    }

    /// JSON Schema for the tool's inputs.
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    serde_json::json!({
                        "type": p.param_type.as_str(),
                        "description": p.description,
                    }),
                )
            })
            .collect();
        let required: Vec<&str> = self.required_params().map(|p| p.name.as_str()).collect();
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Values a tool produced, keyed by output slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub values: Map<String, Value>,
}

impl ToolOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style slot insert.
    pub fn with(mut self, slot: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(slot.into(), value.into());
        self
    }

    pub fn get(&self, slot: &str) -> Option<&Value> {
        self.values.get(slot)
    }

    /// True when no slot carries any content.
    pub fn is_empty(&self) -> bool {
        self.values.values().all(|v| match v {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            _ => false,
        })
    }

    /// Flattened textual content of every slot, in slot order.
    pub fn text(&self) -> String {
        self.values
            .values()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The core Tool trait.
///
/// Each capability (text writer, web search, web fetch, file manager)
/// implements this trait and is registered in the [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "web_search").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the oracle).
    fn description(&self) -> &str;

    /// Declared input parameters.
    fn params(&self) -> Vec<ToolParam>;

    /// Declared output slots.
    fn outputs(&self) -> Vec<String>;

    /// Task categories the planner should offer this tool for.
    fn categories(&self) -> Vec<TaskCategory>;

    /// Run the tool.
    async fn invoke(&self, inputs: ToolInputs) -> Result<ToolOutput, ToolError>;

    /// Snapshot this tool's typed descriptor.
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            params: self.params(),
            outputs: self.outputs(),
            categories: self.categories(),
        }
    }
}

struct Registered {
    tool: Box<dyn Tool>,
    descriptor: ToolDescriptor,
}

/// A registry of available tools.
///
/// Populated at startup, then shared read-only (behind an `Arc`) by every
/// concurrently running task. Registration order is preserved so tool
/// subsets offered to the oracle are deterministic.
pub struct ToolRegistry {
    tools: HashMap<String, Registered>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let descriptor = tool.descriptor();
        let name = descriptor.name.clone();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, Registered { tool, descriptor });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|r| r.tool.as_ref())
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name).map(|r| &r.descriptor)
    }

    /// All descriptors in registration order.
    pub fn descriptors(&self) -> Vec<&ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.descriptor(name))
            .collect()
    }

    /// Descriptors tagged with `category`, in registration order.
    pub fn descriptors_for(&self, category: TaskCategory) -> Vec<&ToolDescriptor> {
        self.descriptors()
            .into_iter()
            .filter(|d| d.is_relevant_to(category))
            .collect()
    }

    /// Dispatch to a tool after checking that it exists and that every
    /// required input is present.
    pub async fn invoke(&self, name: &str, inputs: ToolInputs) -> Result<ToolOutput, ToolError> {
        let registered = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::not_found(name))?;
        if let Some(missing) = registered
            .descriptor
            .required_params()
            .find(|p| !inputs.contains_key(&p.name))
        {
            return Err(ToolError::invalid_arguments(
                name,
                format!("missing required input '{}'", missing.name),
            ));
        }
        registered.tool.invoke(inputs).await
    }

    /// List all registered tool names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
