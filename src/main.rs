mod cli;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hindsight::config::HindsightConfig;

#[derive(Parser)]
#[command(
    name = "hindsight",
    version,
    about = "Institutional memory: searchable past fixes, task outcomes and code changes"
)]
struct Cli {
    /// Config file (default: ~/.hindsight/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a chunk of knowledge
    Ingest(cli::ingest::IngestArgs),
    /// Search stored knowledge
    Search(cli::search::SearchArgs),
    /// Look for a proven fix for an error
    Debug(cli::debug::DebugArgs),
    /// Show chunk counts per type
    Status {
        #[arg(long, short, conflicts_with = "all_projects")]
        project: Option<String>,
        #[arg(long)]
        all_projects: bool,
        #[arg(long)]
        json: bool,
    },
    /// Delete chunks past their retention window
    Prune {
        #[arg(long)]
        json: bool,
    },
    /// Delete one chunk, or every chunk in a project
    Forget {
        source_id: Option<String>,
        #[arg(long, conflicts_with = "source_id")]
        project: Option<String>,
    },
    /// Check database integrity and embedding health
    Doctor,
    /// Recompute stored vectors with the best available embedding tier
    ReEmbed,
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Query a remote knowledge service
    Remote(cli::remote::RemoteArgs),
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.hindsight/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => HindsightConfig::load_from(path)?,
        None => HindsightConfig::load()?,
    };

    // Log to stderr so stdout stays clean for --json output.
    let filter = EnvFilter::try_new(&config.logging.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Ingest(args) => cli::ingest::ingest(&config, args)?,
        Command::Search(args) => cli::search::search(&config, args)?,
        Command::Debug(args) => return Ok(cli::debug::run(&config, args)),
        Command::Status {
            project,
            all_projects,
            json,
        } => {
            let project = match (all_projects, project) {
                (true, _) => None,
                (false, Some(p)) => Some(p),
                (false, None) => Some(config.storage.default_project.clone()),
            };
            cli::status::status(&config, project.as_deref(), json)?
        }
        Command::Prune { json } => cli::maintenance::prune(&config, json)?,
        Command::Forget { source_id, project } => {
            cli::maintenance::forget(&config, source_id.as_deref(), project.as_deref())?
        }
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::ReEmbed => cli::re_embed::re_embed(&config)?,
        Command::Model { action } => match action {
            ModelAction::Download => cli::model_download(&config.embedding).await?,
        },
        Command::Remote(args) => cli::remote::remote(&config, args).await?,
    }

    Ok(ExitCode::SUCCESS)
}
