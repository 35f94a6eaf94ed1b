mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{checkpoint::CheckpointSubcommand, config::ConfigSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "phaserun",
    about = "Run plan phases concurrently against a streaming backend, with pause, resume and checkpoints",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .phaserun/ or .git/)
    #[arg(long, global = true, env = "PHASERUN_ROOT")]
    root: Option<PathBuf>,

    /// Execute-phase endpoint, overriding backend.endpoint for this invocation
    #[arg(long, global = true, env = "PHASERUN_ENDPOINT")]
    endpoint: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize phaserun in the current project
    Init {
        /// Project name (default: the root directory's name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Run every phase of a plan and checkpoint the result
    Run {
        /// Plan document: JSON with a `phases` array
        #[arg(long)]
        plan: PathBuf,

        /// Name for the checkpoint saved when the run settles
        #[arg(long, default_value = "run")]
        checkpoint: String,
    },

    /// Restore a checkpoint and re-run every phase that is not complete
    Resume {
        /// Checkpoint id
        id: String,

        /// Name for the checkpoint saved when the run settles
        #[arg(long, default_value = "resume")]
        checkpoint: String,
    },

    /// Inspect saved checkpoints
    Checkpoint {
        #[command(subcommand)]
        subcommand: CheckpointSubcommand,
    },

    /// Serve the phase API and SSE feed
    Serve {
        /// Port to listen on (0 = OS-assigned)
        #[arg(long, default_value = "3141")]
        port: u16,

        /// Load this plan on startup
        #[arg(long, conflicts_with = "checkpoint")]
        plan: Option<PathBuf>,

        /// Restore this checkpoint id on startup
        #[arg(long)]
        checkpoint: Option<String>,
    },

    /// Validate or show the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } | Commands::Resume { .. } | Commands::Serve { .. } => {
            tracing::Level::INFO
        }
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let endpoint = cli.endpoint.as_deref();

    let result = match cli.command {
        Commands::Init { name } => cmd::init::run(&root, name.as_deref(), endpoint),
        Commands::Run { plan, checkpoint } => {
            cmd::run::run(&root, &plan, &checkpoint, endpoint, cli.json)
        }
        Commands::Resume { id, checkpoint } => {
            cmd::resume::run(&root, &id, &checkpoint, endpoint, cli.json)
        }
        Commands::Checkpoint { subcommand } => cmd::checkpoint::run(&root, subcommand, cli.json),
        Commands::Serve {
            port,
            plan,
            checkpoint,
        } => cmd::serve::run(&root, port, plan.as_deref(), checkpoint.as_deref(), endpoint),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
