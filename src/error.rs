//! Custom error types for crewdeck
//!
//! User-friendly error messages for every failure in the import pipeline.

use thiserror::Error;

/// Main error type for the crewdeck import engine
#[derive(Error, Debug)]
pub enum CrewdeckError {
    /// Free-text repository input did not have an owner/repo shape
    #[error("Cannot parse repository reference: {0}\n\n  → Expected format: owner/repo or https://github.com/owner/repo")]
    InvalidRepositoryReference(String),

    /// The dashboard has no GitHub authorization yet
    #[error("The dashboard is not connected to GitHub.\n\n  → Run 'crewdeck connect' to authorize it.")]
    NotConnected,

    /// Device code expired before the user approved it
    #[error("Authorization timed out - the device code expired.\n\n  → Run 'crewdeck connect' again and enter the code before it expires.")]
    AuthorizationExpired,

    /// User declined the authorization request
    #[error("Authorization was denied on GitHub.\n\n  → Run 'crewdeck connect' again and approve the request.")]
    AuthorizationDenied,

    /// Repository not visible with the current authorization
    #[error(
        "Cannot access repository '{owner}/{repo}'.\n\n  \
        This could mean:\n  \
        1. The repository doesn't exist\n  \
        2. The GitHub connection lacks access to this private repository\n\n  \
        → Reconnect with broader scope: crewdeck connect --reconnect\n  \
        → Or supply a Personal Access Token with --pat-env"
    )]
    RepoAccessDenied { owner: String, repo: String },

    /// Personal Access Token rejected by GitHub
    #[error("The Personal Access Token is invalid or expired.\n\n  → Create a new token at https://github.com/settings/tokens/new with the 'repo' scope.")]
    InvalidPat,

    /// Backend answered with a non-success status
    #[error("Dashboard API request failed ({status}): {message}")]
    Api { status: u16, message: String },

    /// The clone job itself reported a failure
    #[error("Clone failed: {0}\n\n  → Pick the branch again and retry the import.")]
    CloneFailed(String),

    /// The clone job made no progress within the configured window
    #[error("Clone made no progress for {0} seconds.\n\n  → Check the backend logs, then retry the import.")]
    CloneStalled(u64),

    /// Project registration failed after a successful clone
    #[error("Repository was cloned to '{target_path}' but the project could not be registered: {message}\n\n  → Retry registration; the checkout is kept.")]
    RegistrationFailed {
        target_path: String,
        message: String,
    },

    /// Invalid input from user
    #[error("{0}")]
    InvalidInput(String),

    /// Operation called in the wrong pipeline stage
    #[error("{0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// Network request error
    #[error("Network request failed: {0}\n\n  → Check that the dashboard backend is running.")]
    Network(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("Failed to parse response: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML serialization/deserialization error
    #[error("Configuration file is invalid: {0}")]
    Toml(String),

    /// Operation cancelled by user
    #[error("Operation cancelled.")]
    Cancelled,
}

impl CrewdeckError {
    /// HTTP status carried by a backend error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            CrewdeckError::Api { status, .. } => Some(*status),
            CrewdeckError::Network(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for CrewdeckError {
    fn from(err: toml::de::Error) -> Self {
        CrewdeckError::Toml(err.to_string())
    }
}

impl From<toml::ser::Error> for CrewdeckError {
    fn from(err: toml::ser::Error) -> Self {
        CrewdeckError::Toml(err.to_string())
    }
}

impl From<url::ParseError> for CrewdeckError {
    fn from(err: url::ParseError) -> Self {
        CrewdeckError::Config(format!("invalid URL: {}", err))
    }
}

/// Result type alias using CrewdeckError
pub type Result<T> = std::result::Result<T, CrewdeckError>;
