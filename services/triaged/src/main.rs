mod app;
mod commands;
mod config;
mod signals;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "triaged", about = "Issue-tracker triage backbone: watch, scan, check, apply, status")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "triage.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the configured (or named) repos and run the pipeline forever.
    Watch {
        /// `owner/repo` pairs to watch; defaults to every repo in the config file.
        repos: Vec<String>,
        #[arg(long, default_value = "5m")]
        interval: String,
        /// Notification channel: "", "slack", "discord", or "both".
        #[arg(long, default_value = "")]
        notify: String,
        /// Run the pipeline without sending any notifications.
        #[arg(long)]
        dry_run: bool,
    },
    /// Backfill every open issue in a repo through the pipeline once.
    Scan {
        repo: String,
        #[arg(long, default_value_t = 5)]
        workers: usize,
    },
    /// Run a single issue through dedup/classify without notifying.
    Check { issue_ref: String },
    /// Add labels to an issue and log the human decision as approved.
    Apply {
        issue_ref: String,
        labels: Vec<String>,
    },
    /// Print per-repo counts and the store's on-disk size.
    Status,
}

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start the async runtime: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };

    runtime.block_on(run())
}

async fn run() -> std::process::ExitCode {
    let cli = Cli::parse();

    let config = match config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config error: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Watch {
            repos,
            interval,
            notify,
            dry_run,
        } => {
            let interval = match commands::parse_duration(&interval) {
                Ok(interval) => interval,
                Err(err) => {
                    eprintln!("invalid --interval: {err}");
                    return std::process::ExitCode::FAILURE;
                }
            };
            commands::watch::run(&config, &repos, interval, &notify, dry_run).await
        }
        Commands::Scan { repo, workers } => match commands::parse_repo_ref(&repo) {
            Ok((owner, name)) => commands::scan::run(&config, &owner, &name, workers).await,
            Err(err) => {
                eprintln!("invalid repo: {err}");
                return std::process::ExitCode::FAILURE;
            }
        },
        Commands::Check { issue_ref } => match commands::parse_issue_ref(&issue_ref) {
            Ok((owner, name, number)) => commands::check::run(&config, &owner, &name, number).await,
            Err(err) => {
                eprintln!("invalid issue reference: {err}");
                return std::process::ExitCode::FAILURE;
            }
        },
        Commands::Apply { issue_ref, labels } => match commands::parse_issue_ref(&issue_ref) {
            Ok((owner, name, number)) => commands::apply::run(&config, &owner, &name, number, &labels).await,
            Err(err) => {
                eprintln!("invalid issue reference: {err}");
                return std::process::ExitCode::FAILURE;
            }
        },
        Commands::Status => commands::status::run(&config).await,
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        // A user-triggered shutdown mid-`watch`/`scan` is a clean exit, not a failure.
        Err(triage_core::Error::Cancelled) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::ExitCode::FAILURE
        }
    }
}
