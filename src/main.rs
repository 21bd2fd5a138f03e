//! crewdeck - GitHub repository import for the agent company dashboard
//!
//! Connects the dashboard to GitHub, resolves a repository and branch,
//! clones it on the backend and registers it as a project.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crewdeck::cli::commands::{Cli, Commands};
use crewdeck::cli::{config, connect, import, orchestrator};
use crewdeck::error::{CrewdeckError, Result};

#[tokio::main]
async fn main() {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        handle_error(e);
        std::process::exit(1);
    }
}

/// Print errors, with extra guidance for access problems
fn handle_error(e: CrewdeckError) {
    match &e {
        CrewdeckError::Cancelled => {
            eprintln!();
            eprintln!("{}", e);
        }
        CrewdeckError::RepoAccessDenied { owner, .. } => {
            eprintln!();
            eprintln!("Error: {}", e);
            eprintln!();
            eprintln!(
                "If '{}' is an organization, it may also restrict third-party OAuth apps.",
                owner
            );
        }
        _ => {
            eprintln!("Error: {}", e);
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        // Config commands never touch the backend
        Commands::Config(args) => config::handle_config(args.command, config_path),

        Commands::Status => connect::handle_status(&orchestrator(config_path)?).await,
        Commands::Connect { reconnect } => {
            connect::handle_connect(&orchestrator(config_path)?, reconnect).await
        }
        Commands::Disconnect => connect::handle_disconnect(&orchestrator(config_path)?).await,
        Commands::Repos { query } => {
            import::handle_repos(&orchestrator(config_path)?, query).await
        }
        Commands::Branches { repo, pat } => {
            import::handle_branches(&orchestrator(config_path)?, &repo, &pat).await
        }
        Commands::Import(args) => import::handle_import(&orchestrator(config_path)?, args).await,
    }
}
