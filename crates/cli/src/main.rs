//! Tasksmith CLI: the main entry point.
//!
//! Commands:
//! - `run`     Run one task, or start an interactive session
//! - `memory`  Inspect the episode store
//! - `tools`   List the registered tools
//! - `config`  Write or print the configuration

use clap::{Parser, Subcommand};
use tasksmith_config::{AppConfig, LoggingConfig};

mod bootstrap;
mod commands;

#[derive(Parser)]
#[command(
    name = "tasksmith",
    about = "Tasksmith: plan, run, grade and remember tasks",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task, or start an interactive session when no task is given
    Run {
        /// The task to run
        #[arg(short, long)]
        task: Option<String>,

        /// Run in multi-agent mode
        #[arg(long)]
        multi_agent: bool,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect episode memory
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// List the registered tools
    Tools,

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Show aggregate statistics
    Stats,

    /// Find the episodes most similar to a query
    Search {
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value_t = 5)]
        limit: usize,

        /// Only show successful episodes
        #[arg(long)]
        successful: bool,
    },

    /// Ask the oracle for recommendations based on the statistics
    Insights,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration (secrets redacted)
    Show,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // `config init` must work even when the existing file is broken.
    let config = AppConfig::load();
    let logging = config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    init_tracing(cli.verbose, &logging);

    if let Commands::Config { action: ConfigAction::Init { force } } = cli.command {
        return commands::config_cmd::init(force).await;
    }

    let config = config.map_err(|e| format!("Failed to load config: {e}"))?;

    match cli.command {
        Commands::Run { task, multi_agent, json } => {
            commands::run::run(&config, task, multi_agent, json).await?
        }
        Commands::Memory { action } => match action {
            MemoryAction::Stats => commands::memory::stats(&config).await?,
            MemoryAction::Insights => commands::memory::insights(&config).await?,
            MemoryAction::Search { query, limit, successful } => {
                commands::memory::search(&config, &query, limit, successful).await?
            }
        },
        Commands::Tools => commands::tools::list(&config).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(&config).await?,
            ConfigAction::Init { .. } => {}
        },
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `debug` with `--verbose`, else the configured level.
fn init_tracing(verbose: bool, logging: &LoggingConfig) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
