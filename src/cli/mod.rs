//! CLI module for crewdeck
//!
//! This module contains all CLI command definitions and handlers using clap.

pub mod commands;
pub mod config;
pub mod connect;
pub mod import;

use std::future::Future;
use std::io::{self, IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;

use secrecy::SecretString;

use crate::backend::{DashboardApi, HttpDashboardApi};
use crate::cli::commands::PatArgs;
use crate::core::Config;
use crate::error::{CrewdeckError, Result};
use crate::import::ImportOrchestrator;

pub use commands::{Cli, Commands};

/// Load configuration and build an orchestrator bound to the HTTP backend
pub fn orchestrator(config_path: Option<&Path>) -> Result<ImportOrchestrator> {
    let config = Config::load_with(config_path)?;
    let api: Arc<dyn DashboardApi> = Arc::new(HttpDashboardApi::new(&config)?);
    Ok(ImportOrchestrator::new(api, config))
}

/// Run `work` until it finishes or Ctrl-C arrives
///
/// On interrupt `on_interrupt` runs and the result is `Cancelled`.
pub async fn interruptible<T>(
    work: impl Future<Output = Result<T>>,
    on_interrupt: impl FnOnce(),
) -> Result<T> {
    tokio::select! {
        result = work => result,
        _ = tokio::signal::ctrl_c() => {
            on_interrupt();
            Err(CrewdeckError::Cancelled)
        }
    }
}

/// Read the PAT named by `--pat-env`, if any
pub fn read_pat(args: &PatArgs) -> Result<Option<SecretString>> {
    let Some(var) = &args.pat_env else {
        return Ok(None);
    };

    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(Some(SecretString::from(value.trim().to_string()))),
        _ => Err(CrewdeckError::InvalidInput(format!(
            "Environment variable '{}' is not set or empty.\n\n  → Export your Personal Access Token as {} and try again.",
            var, var
        ))),
    }
}

/// Ask for a PAT on an interactive terminal; `None` when declined or not interactive
pub fn prompt_pat() -> Result<Option<SecretString>> {
    if !io::stdin().is_terminal() {
        return Ok(None);
    }

    println!();
    println!("A Personal Access Token with the 'repo' scope can read this repository.");
    println!("  Create one at: https://github.com/settings/tokens/new?scopes=repo");
    println!();
    print!("Paste a token to retry (leave empty to skip): ");
    io::stdout().flush()?;

    let mut token = String::new();
    io::stdin().read_line(&mut token)?;
    let token = token.trim();
    if token.is_empty() {
        Ok(None)
    } else {
        Ok(Some(SecretString::from(token.to_string())))
    }
}

/// Yes/no question defaulting to yes; non-interactive sessions answer no
pub fn confirm(question: &str) -> Result<bool> {
    if !io::stdin().is_terminal() {
        return Ok(false);
    }

    print!("{} [Y/n] ", question);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let choice = input.trim().to_lowercase();
    Ok(choice.is_empty() || choice == "y" || choice == "yes")
}
