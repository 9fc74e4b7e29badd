//! Prompt templates for every oracle call the core loop makes.
//!
//! Each stage treats the oracle's answer as untrusted input, so the
//! prompts pin the answer format as tightly as possible and the parsers
//! stay lenient about everything around it.

use tasksmith_core::memory::{EpisodeStats, ScoredEpisode};
use tasksmith_core::task::TaskCategory;
use tasksmith_core::tool::ToolDescriptor;

pub const CLASSIFIER_SYSTEM: &str = "You classify tasks for an autonomous task executor. \
Answer with exactly one word from this list: writing, code, research, data, presentation, mixed.\n\
- writing: produce prose (articles, letters, summaries, poems)\n\
- code: write or change programs and scripts\n\
- research: find information that must be looked up\n\
- data: gather, transform or analyse structured data\n\
- presentation: slides or visual documents\n\
- mixed: several of the above, or unclear";

pub const PLANNER_SYSTEM: &str = "You are the planner of an autonomous task executor. \
You turn a task into a short, ordered plan of tool calls.\n\n\
Rules:\n\
- Use only the tools listed in the request, with their exact names.\n\
- Supply every required input of a tool.\n\
- To pass the output of an earlier step into a later one, use an input value of the form \
{\"from_step\": <id>, \"output\": \"<output name>\"}. A step may only read from steps with a smaller id.\n\
- Keep the plan as short as the task allows.\n\n\
Answer format: first your reasoning inside <reasoning>...</reasoning>, then the plan as JSON \
inside <plan>...</plan>:\n\
<plan>{\"steps\": [{\"id\": 1, \"tool\": \"...\", \"description\": \"...\", \
\"inputs\": {\"name\": \"value\"}, \"produces\": [\"output name\"]}]}</plan>";

pub const EVALUATOR_SYSTEM: &str = "You grade the result of an autonomous task execution. \
Judge how useful the obtained output is for the task on a scale from 0.0 to 1.0.\n\
Rules:\n\
- A page that refused access (HTTP 401/403, paywall) is not a failure by itself: \
grade the usefulness of whatever the other steps obtained.\n\
- Historical data that is correctly dated is acceptable; do not penalise it for not \
being the most recent.\n\
Reply with JSON only: {\"quality_score\": <0.0-1.0>, \"success\": <true|false>, \"reason\": \"<one sentence>\"}";

pub const INSIGHTS_SYSTEM: &str = "You analyse the track record of an autonomous task executor. \
Give specific, actionable recommendations that would raise its success rate. \
Be concise and focus on the most impactful changes.";

pub fn classify_prompt(task: &str) -> String {
    format!("Task: {task}\n\nCategory:")
}

/// Render tool descriptors with their input schemas and output names.
pub fn render_tools(tools: &[ToolDescriptor]) -> String {
    tools
        .iter()
        .map(|t| {
            let inputs = t
                .params
                .iter()
                .map(|p| {
                    format!(
                        "    - {} ({}{}): {}",
                        p.name,
                        p.param_type.as_str(),
                        if p.required { ", required" } else { "" },
                        p.description
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "- {}: {}\n  inputs:\n{}\n  outputs: {}",
                t.name,
                t.description,
                inputs,
                t.outputs.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Summaries of similar past episodes, most similar first.
pub fn render_memory(episodes: &[ScoredEpisode]) -> String {
    if episodes.is_empty() {
        return String::new();
    }
    let mut out = String::from("Similar tasks from memory:\n");
    for scored in episodes {
        let ep = &scored.episode;
        out.push_str(&format!(
            "- Task: {}\n  Plan: {}\n  Score: {:.2} ({})\n  Result: {}\n",
            truncate(&ep.task_text, 100),
            ep.plan_summary,
            ep.quality_score,
            if ep.success { "success" } else { "failure" },
            truncate(&ep.outcome_summary, 150),
        ));
    }
    out
}

pub fn plan_prompt(
    task: &str,
    category: TaskCategory,
    tools: &[ToolDescriptor],
    memory: &[ScoredEpisode],
    max_steps: usize,
    repair_reason: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Task: {task}\nCategory: {category}\nMaximum steps: {max_steps}\n\nAvailable tools:\n{}\n",
        render_tools(tools)
    );
    let recalled = render_memory(memory);
    if !recalled.is_empty() {
        prompt.push('\n');
        prompt.push_str(&recalled);
    }
    if let Some(reason) = repair_reason {
        prompt.push_str(&format!(
            "\nYour previous plan was rejected: {reason}\nProduce a corrected plan that avoids this problem.\n"
        ));
    }
    prompt
}

pub fn evaluation_prompt(task: &str, status: &str, steps: &str, output: &str) -> String {
    format!(
        "Task: {task}\nExecution status: {status}\nSteps:\n{steps}\nFinal output:\n{}",
        if output.trim().is_empty() { "(empty)" } else { output }
    )
}

/// The episode statistics as a report, with 3-5 recommendations requested.
pub fn insights_prompt(stats: &EpisodeStats) -> String {
    let mut tools: Vec<(&String, &usize)> = stats.tool_usage.iter().collect();
    tools.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    let tool_lines = tools
        .into_iter()
        .map(|(tool, uses)| {
            let rate = stats.tool_success_rate.get(tool).copied().unwrap_or(0.0);
            format!("- {tool}: {uses} episodes, {:.0}% successful", rate * 100.0)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Analyse this performance report and give 3-5 specific recommendations.\n\n\
         Episodes: {}\n\
         Success rate: {:.0}%\n\
         Average quality: {:.2}\n\
         Average steps per plan: {:.1}\n\
         Recent success rate: {:.0}%\n\
         Trend: {}\n\n\
         Tool usage:\n{}\n\n\
         Focus on patterns in tool usage and task outcomes.",
        stats.total,
        stats.success_rate * 100.0,
        stats.avg_quality,
        stats.avg_steps,
        stats.recent_success_rate * 100.0,
        stats.trend,
        if tool_lines.is_empty() { "(none)".to_string() } else { tool_lines },
    )
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
