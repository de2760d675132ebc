//! Circus Progression CLI
//!
//! Scheduler and operator entry point for the progression engine. Every
//! command prints JSON on stdout; logs go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! # Create the database and default config
//! circus-progression init
//!
//! # Scheduler hooks
//! circus-progression refresh --all
//! circus-progression refresh --learner alice
//! circus-progression refresh --group g1
//! circus-progression expire
//!
//! # Inspection
//! circus-progression score --learner alice --figure rondade
//! circus-progression suggest --learner alice --threshold 40
//! circus-progression suggest --group g1
//! circus-progression progress --learner alice --figure rondade
//! circus-progression history --learner alice --step rondade-1 --limit 10
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use circus_progression::services::spawn_logging_listener;
use circus_progression::{Config, Database, RankOptions, Services, SuggestionTarget};

#[derive(Parser, Debug)]
#[command(name = "circus-progression")]
#[command(about = "Readiness and progression engine for circus figures")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "CIRCUS_PROGRESSION_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory (database and default config location)
    #[arg(long, env = "CIRCUS_PROGRESSION_DIR")]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database schema and write the default config
    Init,

    /// Recompute cached suggestions
    #[command(group(ArgGroup::new("target").required(true).args(["learner", "group", "all"])))]
    Refresh {
        #[arg(long)]
        learner: Option<String>,
        #[arg(long)]
        group: Option<String>,
        /// Every enrolled learner and every non-empty group
        #[arg(long)]
        all: bool,
    },

    /// Mark pending suggestions past their expiry as expired
    Expire,

    /// Readiness of a learner for one figure
    Score {
        #[arg(long)]
        learner: String,
        #[arg(long)]
        figure: String,
    },

    /// Live (uncached) suggestions for a learner or a group
    #[command(group(ArgGroup::new("target").required(true).args(["learner", "group"])))]
    Suggest {
        #[arg(long)]
        learner: Option<String>,
        #[arg(long)]
        group: Option<String>,
        /// Minimum score or percentage (defaults from config)
        #[arg(long)]
        threshold: Option<u8>,
        /// Maximum entries (defaults from config)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// A learner's step statuses on one figure
    Progress {
        #[arg(long)]
        learner: String,
        #[arg(long)]
        figure: String,
    },

    /// Attempts on a learner's step, newest first
    History {
        #[arg(long)]
        learner: String,
        #[arg(long)]
        step: String,
        #[arg(long)]
        limit: Option<i64>,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("circus_progression=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }

    info!(storage_dir = %config.storage_dir.display(), "Starting circus-progression");

    let db = Arc::new(Database::open(&config).context("Failed to open database")?);
    let services = Services::new(db.clone(), config.suggestions.clone());
    let _listener = spawn_logging_listener(services.events.clone());

    match args.command {
        Command::Init => {
            let config_path = config.config_path();
            if !config_path.exists() {
                config.save(&config_path)?;
                info!(path = %config_path.display(), "Created default config");
            }
            print_json(&db.stats()?)?;
        }

        Command::Refresh { learner, group, all } => {
            if all {
                print_json(&services.suggestions.refresh_all()?)?;
            } else {
                let target = match (learner, group) {
                    (Some(id), _) => SuggestionTarget::Learner(id),
                    (None, Some(id)) => SuggestionTarget::Group(id),
                    (None, None) => anyhow::bail!("refresh needs --learner, --group or --all"),
                };
                print_json(&services.suggestions.refresh(&target)?)?;
            }
        }

        Command::Expire => {
            let count = services.suggestions.expire()?;
            print_json(&serde_json::json!({ "expired": count }))?;
        }

        Command::Score { learner, figure } => {
            print_json(&services.readiness.score(&learner, &figure)?)?;
        }

        Command::Suggest { learner, group, threshold, limit } => {
            let settings = &config.suggestions;
            match (learner, group) {
                (Some(learner), _) => {
                    let options = RankOptions::new(
                        threshold.unwrap_or(settings.individual_threshold),
                        limit.unwrap_or(settings.individual_limit),
                    );
                    print_json(&services.readiness.suggest_for_learner(&learner, Some(options))?)?;
                }
                (None, Some(group)) => {
                    let options = RankOptions::new(
                        threshold.unwrap_or(settings.group_threshold),
                        limit.unwrap_or(settings.group_limit),
                    );
                    print_json(&services.readiness.suggest_for_group(&group, Some(options))?)?;
                }
                (None, None) => anyhow::bail!("suggest needs --learner or --group"),
            }
        }

        Command::Progress { learner, figure } => {
            print_json(&services.attempts.progress_on_figure(&learner, &figure)?)?;
        }

        Command::History { learner, step, limit } => {
            print_json(&services.attempts.history(&learner, &step, limit)?)?;
        }
    }

    Ok(())
}
