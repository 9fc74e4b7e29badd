//! Plan parser — turns the oracle's free-form answer into a [`Plan`].
//!
//! The answer is expected as `<reasoning>…</reasoning><plan>{json}</plan>`,
//! but a fenced ```json block or the outermost JSON value are accepted too.
//! Raw control characters inside JSON strings and trailing commas are
//! normalized before decoding; anything still malformed is a
//! [`SynthesisError::Parse`], and well-formed JSON of the wrong shape is a
//! [`SynthesisError::Schema`].

use serde_json::{Map, Value};
use std::collections::HashMap;
use tasksmith_core::error::SynthesisError;
use tasksmith_core::plan::{InputBinding, Plan, PlanStep};
use tasksmith_core::task::TaskId;

pub fn parse_plan(raw: &str, task_id: TaskId) -> Result<Plan, SynthesisError> {
    let reasoning = between(raw, "<reasoning>", "</reasoning>")
        .unwrap_or_default()
        .trim()
        .to_string();
    let payload = extract_payload(raw)
        .ok_or_else(|| SynthesisError::Parse("no plan payload found in response".into()))?;
    let normalized = normalize_json(payload);
    let value: Value = serde_json::from_str(&normalized)
        .map_err(|e| SynthesisError::Parse(e.to_string()))?;

    let steps = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("steps") {
            Some(Value::Array(items)) => items,
            _ => return Err(SynthesisError::Schema("expected a \"steps\" array".into())),
        },
        _ => return Err(SynthesisError::Schema("expected an object or array".into())),
    };

    Ok(Plan::new(task_id, build_steps(steps)?).with_reasoning(reasoning))
}

fn build_steps(items: Vec<Value>) -> Result<Vec<PlanStep>, SynthesisError> {
    let objects: Vec<Map<String, Value>> = items
        .into_iter()
        .enumerate()
        .map(|(pos, item)| match item {
            Value::Object(obj) => Ok(obj),
            _ => Err(SynthesisError::Schema(format!("step {} is not an object", pos + 1))),
        })
        .collect::<Result<_, _>>()?;

    // Oracle-facing ids are arbitrary integers; positions are what the
    // rest of the system uses.
    let mut positions: HashMap<u64, usize> = HashMap::new();
    for (pos, obj) in objects.iter().enumerate() {
        let id = step_id(obj, pos)?;
        if positions.insert(id, pos).is_some() {
            return Err(SynthesisError::Schema(format!("duplicate step id {id}")));
        }
    }

    objects
        .iter()
        .enumerate()
        .map(|(pos, obj)| build_step(pos, obj, &positions))
        .collect()
}

fn step_id(obj: &Map<String, Value>, pos: usize) -> Result<u64, SynthesisError> {
    match obj.get("id") {
        None | Some(Value::Null) => Ok(pos as u64 + 1),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| SynthesisError::Schema(format!("step {} has an invalid id", pos + 1))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| SynthesisError::Schema(format!("step {} has an invalid id", pos + 1))),
        Some(_) => Err(SynthesisError::Schema(format!("step {} has an invalid id", pos + 1))),
    }
}

fn build_step(
    pos: usize,
    obj: &Map<String, Value>,
    positions: &HashMap<u64, usize>,
) -> Result<PlanStep, SynthesisError> {
    let tool = obj
        .get("tool")
        .and_then(|t| t.as_str())
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| SynthesisError::Schema(format!("step {} has no tool", pos + 1)))?;

    let mut step = PlanStep::new(pos, tool.trim());
    if let Some(description) = obj.get("description").and_then(|d| d.as_str()) {
        step = step.describe(description);
    }
    if obj.get("critical").and_then(|c| c.as_bool()).unwrap_or(false) {
        step = step.critical();
    }
    if let Some(produces) = obj.get("produces").and_then(|p| p.as_array()) {
        for slot in produces.iter().filter_map(|s| s.as_str()) {
            step = step.produce(slot);
        }
    }

    let inputs = match obj.get("inputs").or_else(|| obj.get("input")) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(SynthesisError::Schema(format!(
                "step {} inputs must be an object",
                pos + 1
            )));
        }
    };
    for (name, value) in inputs {
        let binding = binding(pos, &name, value, positions)?;
        step = step.input(name, binding);
    }
    Ok(step)
}

fn binding(
    pos: usize,
    name: &str,
    value: Value,
    positions: &HashMap<u64, usize>,
) -> Result<InputBinding, SynthesisError> {
    let Value::Object(obj) = &value else {
        return Ok(InputBinding::Literal(value));
    };
    let Some(from) = obj.get("from_step") else {
        return Ok(InputBinding::Literal(value));
    };

    let id = match from {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| {
        SynthesisError::Schema(format!("step {} input '{name}' has an invalid from_step", pos + 1))
    })?;
    let referenced = *positions.get(&id).ok_or_else(|| {
        SynthesisError::Schema(format!(
            "step {} input '{name}' references unknown step id {id}",
            pos + 1
        ))
    })?;
    let output = obj
        .get("output")
        .and_then(|o| o.as_str())
        .filter(|o| !o.is_empty())
        .ok_or_else(|| {
            SynthesisError::Schema(format!("step {} input '{name}' names no output", pos + 1))
        })?;
    Ok(InputBinding::reference(referenced, output))
}

fn between<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let end = text[start..].find(close)? + start;
    Some(&text[start..end])
}

/// Locate the JSON payload: `<plan>` tags, then a fenced block, then the
/// outermost object or array.
pub fn extract_payload(raw: &str) -> Option<&str> {
    if let Some(inner) = between(raw, "<plan>", "</plan>") {
        return Some(inner.trim());
    }
    if let Some(fenced) = between(raw, "```json", "```").or_else(|| between(raw, "```", "```")) {
        let fenced = fenced.trim();
        if fenced.starts_with('{') || fenced.starts_with('[') {
            return Some(fenced);
        }
    }

    let start = raw.find(['{', '['])?;
    let close = if raw[start..].starts_with('{') { '}' } else { ']' };
    let end = raw.rfind(close)?;
    (end > start).then(|| &raw[start..=end])
}

/// Escape raw control characters inside string literals and drop trailing
/// commas before a closing bracket.
pub fn normalize_json(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
                c => out.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            c => out.push(c),
        }
    }
    out
}
