//! Agent Grid
//!
//! Runs the grid simulation from the command line and inspects the stored
//! conversations.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use grid_core::config::{ModelConfig, ModelProvider, DEFAULT_CONFIG_PATH};
use grid_core::runner::{self, RunOptions};
use grid_core::{
    populate, sim_rng, Config, ConfigError, ConversationCoordinator, ConversationStore,
    GenerationError, GridError, LanguageModel, OpenAiChat, PersistenceError, RegistryError,
    ReportLog, ScriptedModel, TickEngine,
};
use grid_events::{AgentId, ConversationKey, PairError};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "agent_grid")]
#[command(about = "Agents wandering a grid and talking when they meet")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the simulation
    Run {
        /// Stop after this many ticks (0 runs until Ctrl-C)
        #[arg(long)]
        ticks: Option<u64>,

        /// Random seed for reproducible movement
        #[arg(long)]
        seed: Option<u64>,

        /// Use scripted replies instead of the language model
        #[arg(long)]
        offline: bool,

        /// Write one JSON line per tick report to this file
        #[arg(long)]
        report_log: Option<PathBuf>,
    },

    /// Print the transcript between two agents as JSON
    Show { a: String, b: String },

    /// List stored conversations
    List,
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Pair(#[from] PairError),

    #[error("report log: {0}")]
    ReportLog(std::io::Error),

    #[error("JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("agent_grid=info,grid_core=info")),
        )
        .init();

    let args = Args::parse();
    match execute(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(args: Args) -> Result<(), CliError> {
    let config = Config::load_or_default(&args.config)?;
    match args.command {
        Command::Run {
            ticks,
            seed,
            offline,
            report_log,
        } => run(config, ticks, seed, offline, report_log).await,
        Command::Show { a, b } => show(&config, a, b),
        Command::List => list(&config),
    }
}

async fn run(
    mut config: Config,
    ticks: Option<u64>,
    seed: Option<u64>,
    offline: bool,
    report_log: Option<PathBuf>,
) -> Result<(), CliError> {
    if let Some(ticks) = ticks {
        config.tick.max_ticks = ticks;
    }
    if seed.is_some() {
        config.tick.seed = seed;
    }
    if offline {
        config.model.provider = ModelProvider::Scripted;
    }
    config.validate()?;

    let bounds = config.grid.bounds();
    let mut rng = sim_rng(config.tick.seed);
    let mut registry = populate(&config.agents, &bounds, &mut rng)?;

    let model = build_model(&config.model)?;
    let store = ConversationStore::in_dir(config.conversation.transcript_dir.clone());
    let coordinator =
        ConversationCoordinator::new(model, store, config.conversation.coordinator_settings());
    let engine = TickEngine::new(
        config.engine_settings(),
        config.mover()?,
        config.detector()?,
        coordinator,
    )?;

    let mut log = match &report_log {
        Some(path) => ReportLog::new(path).map_err(CliError::ReportLog)?,
        None => ReportLog::null(),
    };

    println!("Agent Grid");
    println!("==========");
    println!("Run: {}", engine.run_id());
    println!("Grid: {}", bounds);
    println!("Agents: {}", registry.len());
    for agent in registry.all() {
        println!("  {} at {}", agent.id, agent.position);
    }
    if let Some(seed) = config.tick.seed {
        println!("Seed: {}", seed);
    }
    println!("Model: {}", engine.coordinator().model().model());
    println!();

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => {
                warn!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    let options = RunOptions {
        interval: config.tick.interval(),
        max_ticks: config.tick.max_ticks,
    };
    let summary = runner::run(
        &engine,
        &mut registry,
        &mut rng,
        &mut log,
        options,
        shutdown,
    )
    .await;

    println!();
    println!("Ticks: {}", summary.ticks);
    println!("Conversations: {}", summary.conversations);
    println!("Failed conversations: {}", summary.failed_conversations);
    if let Some(path) = report_log {
        println!("Reports written to {}", path.display());
    }
    Ok(())
}

/// Picks the configured model, falling back to scripted replies when no API
/// key is available.
fn build_model(config: &ModelConfig) -> Result<Box<dyn LanguageModel>, CliError> {
    if config.provider == ModelProvider::Scripted {
        info!("Using scripted replies");
        return Ok(Box::new(ScriptedModel::new()));
    }

    match std::env::var(&config.api_key_env) {
        Ok(key) if !key.trim().is_empty() => {
            let chat = OpenAiChat::new(
                key.trim(),
                config.model.as_str(),
                Duration::from_secs(config.timeout_secs),
            )?
            .with_base_url(config.base_url.as_str())
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens);
            Ok(Box::new(chat))
        }
        _ => {
            warn!(
                "{} is not set, falling back to scripted replies",
                config.api_key_env
            );
            Ok(Box::new(ScriptedModel::new()))
        }
    }
}

fn show(config: &Config, a: String, b: String) -> Result<(), CliError> {
    let key = ConversationKey::new(AgentId::new(a), AgentId::new(b))?;
    let store = ConversationStore::in_dir(config.conversation.transcript_dir.clone());
    let transcript = store.load(&key)?;
    println!("{}", serde_json::to_string_pretty(&transcript)?);
    Ok(())
}

fn list(config: &Config) -> Result<(), CliError> {
    let store = ConversationStore::in_dir(config.conversation.transcript_dir.clone());
    let keys = store.keys()?;
    if keys.is_empty() {
        println!(
            "No conversations in {}",
            config.conversation.transcript_dir.display()
        );
    }
    for key in keys {
        let turns = store.load(&key).map(|t| t.len()).unwrap_or(0);
        println!("{}  {} turns", key, turns);
    }
    Ok(())
}
