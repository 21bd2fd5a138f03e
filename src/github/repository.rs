//! Repository references
//!
//! A [`RepositoryRef`] either comes from the backend's repository listing or is
//! synthesized from free text the user typed (`owner/repo` or a GitHub URL),
//! which lets private repositories that are missing from the listing be
//! imported anyway.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use url::Url;

use crate::error::{CrewdeckError, Result};

/// Owner (user or organization) and repository name segments
static OWNER_REPO_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9](?:[A-Za-z0-9-]{0,38}))/([A-Za-z0-9._-]+)$")
        .expect("Invalid regex pattern for owner/repo detection")
});

/// A GitHub repository the import can target
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryRef {
    /// GitHub id, `0` when synthesized from user input
    #[serde(default)]
    pub id: u64,
    pub full_name: String,
    #[serde(deserialize_with = "owner_login")]
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub clone_url: String,
}

impl RepositoryRef {
    /// Build a reference without consulting the backend
    pub fn from_owner_repo(owner: &str, name: &str) -> Self {
        Self {
            id: 0,
            full_name: format!("{}/{}", owner, name),
            owner: owner.to_string(),
            name: name.to_string(),
            private: false,
            default_branch: None,
            clone_url: format!("https://github.com/{}/{}.git", owner, name),
        }
    }

    /// Get the GitHub URL for this repository
    pub fn github_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }
}

/// Accept both a plain login and GitHub's `{ "login": ... }` owner object
fn owner_login<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Owner {
        Login(String),
        Object { login: String },
    }

    Ok(match Owner::deserialize(deserializer)? {
        Owner::Login(login) => login,
        Owner::Object { login } => login,
    })
}

/// Resolve free-text input into a repository reference
///
/// Accepts:
/// - `owner/repo`
/// - `https://github.com/owner/repo` (optionally with `.git` or extra path segments)
/// - `github.com/owner/repo`
/// - `git@github.com:owner/repo.git`
/// - `ssh://git@github.com/owner/repo.git`
///
/// No network call is made; malformed input is rejected here.
pub fn resolve_direct_input(text: &str) -> Result<RepositoryRef> {
    let (owner, name) = parse_repository_input(text)?;
    Ok(RepositoryRef::from_owner_repo(&owner, &name))
}

/// Parse free-text input into `(owner, repo)`
pub fn parse_repository_input(text: &str) -> Result<(String, String)> {
    let input = text.trim().trim_end_matches('/');
    let invalid = || CrewdeckError::InvalidRepositoryReference(text.trim().to_string());

    if input.is_empty() {
        return Err(invalid());
    }

    // SSH format: git@github.com:owner/repo.git
    if let Some(path) = input.strip_prefix("git@github.com:") {
        return parse_owner_repo_path(path, false).ok_or_else(invalid);
    }

    if input.contains("://") {
        let parsed = Url::parse(input).map_err(|_| invalid())?;
        let host = parsed.host_str().unwrap_or_default();
        if host != "github.com" && host != "www.github.com" {
            return Err(invalid());
        }
        return parse_owner_repo_path(parsed.path().trim_start_matches('/'), true)
            .ok_or_else(invalid);
    }

    for prefix in ["github.com/", "www.github.com/"] {
        if let Some(path) = input.strip_prefix(prefix) {
            return parse_owner_repo_path(path, true).ok_or_else(invalid);
        }
    }

    parse_owner_repo_path(input, false).ok_or_else(invalid)
}

/// Match `owner/repo` at the start of a path
///
/// URL paths may carry extra segments (`/tree/main`), shorthand may not.
fn parse_owner_repo_path(path: &str, allow_trailing: bool) -> Option<(String, String)> {
    let mut segments = path.trim_end_matches('/').split('/');
    let owner = segments.next()?;
    let repo = segments.next()?;
    if !allow_trailing && segments.next().is_some() {
        return None;
    }

    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    let candidate = format!("{}/{}", owner, repo);
    let caps = OWNER_REPO_PATTERN.captures(&candidate)?;

    let owner = caps.get(1)?.as_str().to_string();
    let repo = caps.get(2)?.as_str().to_string();
    if repo == "." || repo == ".." {
        return None;
    }
    Some((owner, repo))
}
