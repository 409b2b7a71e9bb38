use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use deep_research::{
    config::{Config, LogFormat},
    error::PipelineResult,
    persistence,
    ChatClient, CompletionOptions, Orchestrator, ResearchSession, SqliteStorage, Storage,
    TavilyClient,
};

#[derive(Parser)]
#[command(name = "deep-research", version, about = "Generate research reports from web search")]
struct Cli {
    /// Read configuration from this env file instead of `.env`
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Research a query and write the report
    Research {
        query: String,
        /// Print the report instead of writing it to the output directory
        #[arg(long)]
        no_save: bool,
    },
    /// Continue an unfinished session
    Resume(ResumeArgs),
    /// Show the progress recorded in a state file
    Progress {
        #[arg(long)]
        state_file: PathBuf,
    },
    /// List checkpointed sessions
    Sessions,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ResumeArgs {
    /// State file written by an earlier run
    #[arg(long)]
    state_file: Option<PathBuf>,
    /// Session id in the checkpoint database
    #[arg(long)]
    session: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let loaded = match &cli.env_file {
        Some(path) => Config::from_env_file(path),
        None => Config::from_env(),
    };
    let config = match loaded {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "Deep research starting...");

    match cli.command {
        Command::Research { query, no_save } => research(&config, &query, no_save).await,
        Command::Resume(args) => resume(&config, args).await,
        Command::Progress { state_file } => progress(&state_file),
        Command::Sessions => sessions(&config).await,
    }
}

async fn research(config: &Config, query: &str, no_save: bool) -> anyhow::Result<()> {
    let storage = open_storage(config).await;
    let mut orchestrator = build_orchestrator(config, storage)?;

    let result = orchestrator.research(query).await;
    finish(config, orchestrator, result, no_save)
}

async fn resume(config: &Config, args: ResumeArgs) -> anyhow::Result<()> {
    let storage = open_storage(config).await;

    let session = match (args.state_file, args.session) {
        (Some(path), _) => persistence::load_from_file(&path)
            .with_context(|| format!("Failed to load state file {}", path.display()))?,
        (None, Some(id)) => {
            let storage = storage
                .as_ref()
                .context("Resuming by session id requires the checkpoint database")?;
            storage
                .load_snapshot(&id)
                .await?
                .with_context(|| format!("Session not found: {}", id))?
        }
        (None, None) => anyhow::bail!("Either --state-file or --session is required"),
    };

    let mut orchestrator = build_orchestrator(config, storage)?;
    let result = orchestrator.resume(session).await;
    finish(config, orchestrator, result, false)
}

fn progress(state_file: &Path) -> anyhow::Result<()> {
    let session = persistence::load_from_file(state_file)
        .with_context(|| format!("Failed to load state file {}", state_file.display()))?;
    let summary = session.progress();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn sessions(config: &Config) -> anyhow::Result<()> {
    if !config.database.enabled {
        anyhow::bail!("Checkpoint database is disabled (DATABASE_ENABLED=false)");
    }
    let storage = SqliteStorage::new(&config.database).await?;
    for session in storage.list_sessions().await? {
        println!(
            "{}  {:<11}  {}  {}",
            session.id,
            session.status.as_str(),
            session.updated_at.format("%Y-%m-%d %H:%M:%S"),
            session.query
        );
    }
    Ok(())
}

fn build_orchestrator(
    config: &Config,
    storage: Option<Arc<dyn Storage>>,
) -> anyhow::Result<Orchestrator> {
    let llm = match ChatClient::new(&config.llm, config.request.clone()) {
        Ok(c) => {
            info!(
                provider = %config.llm.provider,
                model = %config.llm.model,
                base_url = %config.llm.base_url,
                "LLM client initialized"
            );
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize LLM client");
            return Err(e.into());
        }
    };
    let search = TavilyClient::new(&config.search)?;

    let options = CompletionOptions::default()
        .with_temperature(config.llm.temperature)
        .with_max_tokens(config.llm.max_tokens);

    let orchestrator = Orchestrator::new(
        Arc::new(llm),
        Arc::new(search),
        config.research.clone(),
        options,
    );
    Ok(match storage {
        Some(storage) => orchestrator.with_storage(storage),
        None => orchestrator,
    })
}

/// Open the checkpoint database; research continues without it on failure.
async fn open_storage(config: &Config) -> Option<Arc<dyn Storage>> {
    if !config.database.enabled {
        return None;
    }
    match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            Some(Arc::new(s))
        }
        Err(e) => {
            warn!(error = %e, "Failed to initialize database, continuing without checkpoints");
            None
        }
    }
}

fn finish(
    config: &Config,
    mut orchestrator: Orchestrator,
    result: PipelineResult<String>,
    no_save: bool,
) -> anyhow::Result<()> {
    let session = orchestrator.take_session();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            error!(
                error = %e,
                stage = ?e.stage(),
                section_index = ?e.section_index(),
                "Research aborted"
            );
            if let Some(session) = &session {
                save_partial_state(config, session);
            }
            return Err(e.into());
        }
    };

    match session {
        Some(session) if !no_save => {
            let artifacts = persistence::write_report(&session, &config.output)?;
            println!("{}", artifacts.report_path.display());
        }
        _ => println!("{}", report),
    }
    Ok(())
}

/// Write the unfinished session so it can be resumed with `--state-file`.
fn save_partial_state(config: &Config, session: &ResearchSession) {
    if !config.output.save_intermediate_states {
        return;
    }
    let timestamp = persistence::timestamp_label(chrono::Local::now());
    let path = config
        .output
        .output_dir
        .join(persistence::state_file_name(session.query(), &timestamp));
    match persistence::save_to_file(session, &path) {
        Ok(()) => info!(
            path = %path.display(),
            session_id = %session.id(),
            "Partial state saved for resume"
        ),
        Err(e) => warn!(error = %e, "Failed to save partial state"),
    }
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
