//! Project registration payloads

use crate::backend::ProjectRequest;
use crate::github::repository::RepositoryRef;

/// User-supplied project fields; blanks fall back to defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectDetails {
    pub name: Option<String>,
    pub core_goal: Option<String>,
    /// Clone destination, defaults to `<workspace_root>/<repo name>`
    pub target_path: Option<String>,
}

/// Terminal artifact of a successful import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResult {
    pub project_id: String,
    pub project_path: String,
    pub branch: String,
}

/// Clone result kept while registration has not succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRegistration {
    pub repo: RepositoryRef,
    pub branch: String,
    pub target_path: String,
    pub details: ProjectDetails,
}

/// `owner/repo (branch)` label stored on the project
pub fn github_repo_label(repo: &RepositoryRef, branch: &str) -> String {
    format!("{}/{} ({})", repo.owner, repo.name, branch)
}

pub fn default_core_goal(repo: &RepositoryRef, branch: &str) -> String {
    format!(
        "Imported from GitHub repository {}/{} (branch {})",
        repo.owner, repo.name, branch
    )
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl PendingRegistration {
    /// Body for the project create call
    pub fn project_request(&self) -> ProjectRequest {
        ProjectRequest {
            name: non_blank(&self.details.name).unwrap_or_else(|| self.repo.name.clone()),
            project_path: self.target_path.clone(),
            core_goal: non_blank(&self.details.core_goal)
                .unwrap_or_else(|| default_core_goal(&self.repo, &self.branch)),
            github_repo: github_repo_label(&self.repo, &self.branch),
        }
    }
}
