//! Wayfarer CLI: the main entry point.
//!
//! Commands:
//! - `run`     Run the tasks file, or a single `--task`
//! - `replay`  Print the trajectory recorded in a run log
//! - `config`  Show, locate or validate the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "wayfarer",
    about = "Wayfarer: an autonomous web task agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.wayfarer/config.toml)
    #[arg(short, long, global = true, env = "WAYFARER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run tasks against the configured site
    Run {
        /// Run one ad-hoc task instead of the tasks file
        #[arg(short, long)]
        task: Option<String>,

        /// Tasks file with one `name: instruction` per line
        #[arg(short = 'f', long)]
        tasks_file: Option<PathBuf>,

        /// Override agent.max_steps
        #[arg(long)]
        max_steps: Option<u32>,
    },

    /// Replay a JSONL run log
    Replay {
        /// Path to the run log
        log: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (keys redacted)
    Show,
    /// Print the default config file path
    Path,
    /// Validate the configuration and credentials
    Validate,
    /// Print a default config file
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Run {
            task,
            tasks_file,
            max_steps,
        } => commands::run::run(config, task, tasks_file, max_steps).await?,
        Commands::Replay { log } => commands::replay::run(&log)?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config)?,
            ConfigAction::Path => commands::config_cmd::path(),
            ConfigAction::Validate => commands::config_cmd::validate(config)?,
            ConfigAction::Init => commands::config_cmd::init(),
        },
    }

    Ok(())
}
