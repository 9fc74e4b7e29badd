//! `tasksmith run`: one task, or an interactive session.

use std::io::Write;
use tasksmith_agent::{CoreLoop, ResolutionPath, TaskOutcome};
use tasksmith_config::AppConfig;
use tasksmith_core::memory::MemoryStore;
use tasksmith_core::task::RunMode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use crate::bootstrap::{self, Runtime};

pub async fn run(
    config: &AppConfig,
    task: Option<String>,
    multi_agent: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !config.has_api_key() && config.provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    TASKSMITH_API_KEY=...   (generic)");
        eprintln!("    ANTHROPIC_API_KEY=...   (provider = \"anthropic\")");
        eprintln!("    OPENAI_API_KEY=...      (provider = \"openai\")");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let runtime = bootstrap::runtime(config)?;
    let mode = if multi_agent { RunMode::MultiAgent } else { RunMode::Single };

    match task {
        Some(text) => {
            if !json {
                eprint!("  Working...");
            }
            let outcome = run_cancellable(&runtime.core, &text, mode).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                eprint!("\r            \r");
                print_outcome(&outcome);
            }
            if outcome.failure.is_some() {
                return Err(format!("Task failed: {}", outcome.evaluation.rationale).into());
            }
        }
        None => interactive(config, &runtime, mode, json).await?,
    }

    Ok(())
}

/// Run one task; Ctrl-C cancels it and the partial result is still graded
/// and remembered.
async fn run_cancellable(core: &CoreLoop, text: &str, mode: RunMode) -> TaskOutcome {
    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    let guard = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            watcher.cancel();
        }
    });
    let outcome = core.run_with_cancel(text, mode, cancel).await;
    guard.abort();
    outcome
}

async fn interactive(
    config: &AppConfig,
    runtime: &Runtime,
    mode: RunMode,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let core = runtime.core.as_ref();
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║         Tasksmith — Interactive Mode         ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Provider:  {}", config.provider);
    println!("  Planner:   {}", config.models.balanced);
    println!("  Tools:     {}", core.tools().names().join(", "));
    println!("  Memory:    {}", runtime.memory.name());
    println!();
    println!("  Describe a task and press Enter.");
    println!("  Ctrl+C cancels the running task; type 'exit' to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  Task > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "exit" | "quit") {
            break;
        }

        eprint!("  ...");
        let outcome = run_cancellable(core, text, mode).await;
        eprint!("\r     \r");
        if json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        } else {
            print_outcome(&outcome);
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn print_outcome(outcome: &TaskOutcome) {
    let summary = &outcome.summary;
    let verdict = if outcome.evaluation.success { "success" } else { "not successful" };

    println!();
    println!("  Task:      {}", outcome.task.id);
    if let Some(category) = outcome.task.category() {
        println!("  Category:  {category}");
    }
    if let Some(path) = &outcome.path {
        println!("  Path:      {}", describe_path(path));
    }
    if let Some(status) = summary.status {
        println!(
            "  Steps:     {} of {} succeeded ({}, {} ms)",
            summary.succeeded,
            summary.steps,
            status.as_str(),
            summary.duration_ms
        );
    }
    if summary.retries > 0 {
        println!("  Retries:   {}", summary.retries);
    }
    if let (Some(rejected), None) = (&outcome.rejected_plan, &outcome.record) {
        println!("  Rejected:  {}", rejected.summary());
    }
    if outcome.memory_hits > 0 {
        println!("  Memory:    {} similar episode(s)", outcome.memory_hits);
    }
    println!(
        "  Score:     {:.2} ({verdict})",
        outcome.evaluation.quality_score()
    );
    println!("  Rationale: {}", outcome.evaluation.rationale);
    if let Some(failure) = &outcome.failure {
        println!("  Failed at: {} ({})", failure.stage, failure.reason);
    }
    if outcome.cancelled {
        println!("  Cancelled: yes");
    }

    if let Some(output) = &summary.final_output {
        println!();
        for line in output.lines() {
            println!("  {line}");
        }
    }
    println!();
}

fn describe_path(path: &ResolutionPath) -> String {
    match path {
        ResolutionPath::FastPath => "fast path".to_string(),
        ResolutionPath::CacheHit { episode_id, similarity } => {
            format!("reused plan from episode {episode_id} (similarity {similarity:.2})")
        }
        ResolutionPath::Planned { repaired: true } => "planned (repaired once)".to_string(),
        ResolutionPath::Planned { repaired: false } => "planned".to_string(),
    }
}
