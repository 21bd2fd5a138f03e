//! CLI command definitions using clap
//!
//! Defines the command structure for the `crewdeck` CLI tool.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// crewdeck - import GitHub repositories into the agent company dashboard
///
/// Talks to the dashboard backend configured in config.toml or CREWDECK_API_URL.
#[derive(Parser, Debug)]
#[command(name = "crewdeck", version, about, long_about = None)]
pub struct Cli {
    /// Use this configuration file instead of the default location
    #[arg(long, global = true, env = "CREWDECK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show whether the dashboard is connected to GitHub
    Status,

    /// Connect the dashboard to GitHub using the device flow
    Connect {
        /// Revoke the current authorization first (e.g. to gain private repo scope)
        #[arg(long)]
        reconnect: bool,
    },

    /// Revoke the dashboard's GitHub authorization
    Disconnect,

    /// Search repositories visible to the connected account
    Repos {
        /// Search text; omit to list recent repositories
        query: Option<String>,
    },

    /// List branches of a repository
    Branches {
        /// owner/repo or a GitHub URL
        repo: String,

        #[command(flatten)]
        pat: PatArgs,
    },

    /// Clone a repository and register it as a project
    Import(ImportArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Personal Access Token source
#[derive(Args, Debug, Default)]
pub struct PatArgs {
    /// Read a Personal Access Token from this environment variable
    /// (used for private repositories the connection cannot see)
    #[arg(long, value_name = "VAR")]
    pub pat_env: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Import Command
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
pub struct ImportArgs {
    /// owner/repo or a GitHub URL
    pub repo: String,

    /// Branch to clone (defaults to the repository's default branch)
    #[arg(long, short)]
    pub branch: Option<String>,

    /// Clone destination (defaults to <workspace_root>/<repo>)
    #[arg(long, short)]
    pub target: Option<String>,

    /// Project name (defaults to the repository name)
    #[arg(long)]
    pub name: Option<String>,

    /// Project goal (defaults to a generated description)
    #[arg(long)]
    pub goal: Option<String>,

    #[command(flatten)]
    pub pat: PatArgs,
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration commands
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Set a configuration value
    Set {
        /// Configuration key
        key: ConfigKey,

        /// Configuration value
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: ConfigKey,
    },

    /// Reset a configuration value to its default
    Remove {
        /// Configuration key
        key: ConfigKey,
    },

    /// Print the configuration file path
    Path,
}

/// Available configuration keys
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ConfigKey {
    /// Dashboard backend URL
    #[value(name = "api-url")]
    ApiUrl,

    /// Dashboard API key
    #[value(name = "api-key")]
    ApiKey,

    /// Directory for cloned repositories
    #[value(name = "workspace-root")]
    WorkspaceRoot,

    /// Open the browser during the device flow (true/false)
    #[value(name = "open-browser")]
    OpenBrowser,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_import() {
        let cli = Cli::try_parse_from([
            "crewdeck",
            "import",
            "acme/widgets",
            "--branch",
            "dev",
            "--pat-env",
            "ACME_PAT",
        ])
        .unwrap();

        match cli.command {
            Commands::Import(args) => {
                assert_eq!(args.repo, "acme/widgets");
                assert_eq!(args.branch.as_deref(), Some("dev"));
                assert_eq!(args.pat.pat_env.as_deref(), Some("ACME_PAT"));
                assert!(args.target.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_connect_reconnect() {
        let cli = Cli::try_parse_from(["crewdeck", "connect", "--reconnect"]).unwrap();
        assert!(matches!(cli.command, Commands::Connect { reconnect: true }));
    }
}
