//! CLI entrypoint for Conclave
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result, bail};
use clap::Parser;
use conclave_application::ports::event_sink::{EventSink, NullSink};
use conclave_application::{EngineDeps, PhaseController, TimeoutWatchdog, run_supervised};
use conclave_domain::{ExecutionPhase, ExecutionState, Problem, SessionId};
use conclave_infrastructure::{
    ConfigLoader, FileContextStore, HashEmbedder, HttpModelGateway, InMemoryCheckpointStore,
    InMemoryResearchCache, InMemorySessionStore, JsonlEventSink, StaticPersonaCatalog,
    gateway::HttpGatewayConfig,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "conclave", about = "Multi-expert deliberation for strategic decisions")]
struct Cli {
    /// Problem file (TOML or JSON with title, description, context)
    problem_file: Option<PathBuf>,

    /// Problem statement given inline instead of a file
    #[arg(short = 'p', long)]
    problem: Option<String>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ignore all config files, use built-in defaults
    #[arg(long)]
    no_config: bool,

    /// Owner identity for context loading and permission checks
    #[arg(long, default_value = "local")]
    owner: String,

    /// Fix the expert panel size, bypassing complexity estimation
    #[arg(long)]
    experts: Option<usize>,

    /// Suppress the final report header
    #[arg(short, long)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Problem file structure (TOML or JSON).
#[derive(Debug, Deserialize)]
struct ProblemFile {
    title: String,
    description: String,
    #[serde(default)]
    context: String,
}

fn load_problem(cli: &Cli) -> Result<Problem> {
    if let Some(statement) = &cli.problem {
        return Ok(Problem::new("Ad-hoc decision", statement.clone()));
    }
    let Some(path) = &cli.problem_file else {
        bail!("A problem file or --problem statement is required.");
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading problem file {}", path.display()))?;
    let file: ProblemFile = if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&text).context("parsing problem file as JSON")?
    } else {
        toml::from_str(&text).context("parsing problem file as TOML")?
    };
    let mut problem = Problem::new(file.title, file.description);
    if !file.context.is_empty() {
        problem.append_context(&file.context);
    }
    Ok(problem)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity level
    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"), // -vvv or more
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let file_config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_ref()).map_err(|e| anyhow::anyhow!("config: {e}"))?
    };

    let mut engine_config = file_config.engine.to_engine_config();
    if cli.experts.is_some() {
        engine_config.expert_override = cli.experts;
    }

    let problem = load_problem(&cli)?;

    let api_key = std::env::var(&file_config.provider.api_key_env).with_context(|| {
        format!(
            "API key environment variable {} is not set",
            file_config.provider.api_key_env
        )
    })?;

    // === Dependency Injection ===
    let sink: Arc<dyn EventSink> = if file_config.log.events_path.is_empty() {
        Arc::new(NullSink)
    } else {
        match JsonlEventSink::new(&file_config.log.events_path) {
            Some(sink) => Arc::new(sink),
            None => Arc::new(NullSink),
        }
    };

    let deps = EngineDeps {
        gateway: Arc::new(HttpModelGateway::new(HttpGatewayConfig {
            endpoint: file_config.provider.endpoint.clone(),
            api_key,
            model: file_config.provider.model.clone(),
            cost_per_1k_tokens: file_config.provider.cost_per_1k_tokens,
        })),
        personas: Arc::new(StaticPersonaCatalog::builtin()),
        context: Arc::new(FileContextStore::new(&file_config.log.context_root)),
        embeddings: Arc::new(HashEmbedder::new()),
        research: Arc::new(InMemoryResearchCache::new()),
        state_store: Arc::new(InMemorySessionStore::default()),
        checkpoints: Arc::new(InMemoryCheckpointStore::new()),
        sink,
    };

    let session_id = SessionId::new(format!(
        "conclave-{}",
        chrono::Utc::now().format("%Y%m%d-%H%M%S")
    ));
    info!("Starting session {}", session_id);

    let mut state = ExecutionState::new(session_id.clone(), cli.owner.clone(), problem);
    deps.state_store.save(&state).await?;

    let watchdog = TimeoutWatchdog::new(engine_config.hard_ceiling, engine_config.liveness_window);
    let controller = PhaseController::new(deps.clone(), engine_config, session_id.clone());

    run_supervised(&controller, &mut state, &watchdog).await?;

    // Suspended for clarification: surface the questions and stop. Answers
    // arrive through the control surface on a later invocation.
    if state.phase == ExecutionPhase::Clarifying {
        println!("The session is waiting on clarification:");
        if let Some(pending) = &state.pending_clarification {
            for question in &pending.questions {
                println!("  - {} ({})", question.question, question.reason);
            }
        }
        return Ok(());
    }

    if !cli.quiet {
        println!();
        println!("Session: {}", session_id);
        println!(
            "Sub-problems: {} | Cost: ${:.4} | Tokens: {}",
            state.results.len(),
            state.metrics.total_cost,
            state.metrics.total_tokens
        );
        println!();
    }

    match &state.final_plan {
        Some(plan) => println!("{plan}"),
        None => {
            if let Some(reason) = &state.stop_reason {
                bail!("Session ended without a plan: {reason}");
            }
            bail!("Session ended without a plan.");
        }
    }

    Ok(())
}
