//! quickpoll - poll vote aggregation CLI
//!
//! Operations front end for the quickpoll engine: create polls, cast
//! ballots, inspect or follow tallies, run reconciliation, and report
//! database statistics. All commands operate directly on an engine
//! database; there is no daemon.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quickpoll_core::EngineConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;

/// quickpoll - vote aggregation engine
#[derive(Parser, Debug)]
#[command(name = "quickpoll")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to engine configuration file
    #[arg(short, long, default_value = "quickpoll.toml")]
    config: PathBuf,

    /// Path to the engine database (overrides the configured path)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a poll
    Create(commands::create::CreateArgs),

    /// Cast a ballot on a poll
    Vote(commands::vote::VoteArgs),

    /// Show a poll's tally, optionally following updates
    Tally(commands::tally::TallyArgs),

    /// Recount a poll (or every poll) from its vote records
    Reconcile(commands::reconcile::ReconcileArgs),

    /// Show database statistics
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = if cli.config.exists() {
        EngineConfig::from_file(&cli.config).with_context(|| {
            format!("failed to load configuration from {}", cli.config.display())
        })?
    } else {
        EngineConfig::default()
    };
    let db_path = cli.db.unwrap_or_else(|| config.store.path.clone());

    match cli.command {
        Commands::Create(args) => commands::create::run(&db_path, args),
        Commands::Vote(args) => commands::vote::run(&db_path, config.aggregator_config(), args),
        Commands::Tally(args) => commands::tally::run(&db_path, args),
        Commands::Reconcile(args) => {
            commands::reconcile::run(&db_path, config.sweep_interval(), args)
        }
        Commands::Status => commands::status::run(&db_path),
    }
}
