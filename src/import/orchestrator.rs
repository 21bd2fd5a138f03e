//! Import orchestrator
//!
//! Owns one import attempt. Stages only move forward except through
//! [`ImportOrchestrator::back_to`], which resets the stage it returns to and
//! everything after it while leaving earlier stages untouched.

use std::sync::{Arc, Mutex};

use secrecy::SecretString;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::backend::{BranchRef, CloneRequest, ConnectionStatus, DashboardApi};
use crate::core::Config;
use crate::error::{CrewdeckError, Result};
use crate::github::auth::DeviceAuthClient;
use crate::github::clone::CloneMonitor;
use crate::github::error_handler::error_message;
use crate::github::repository::RepositoryRef;
use crate::github::resolver::RepoResolver;
use crate::import::project::{ImportResult, PendingRegistration, ProjectDetails};

/// Pipeline stage, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ImportStage {
    Repo,
    Branch,
    Clone,
}

/// Progress of the final project registration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RegistrationState {
    #[default]
    NotStarted,
    Registering,
    Registered(ImportResult),
    Failed {
        message: String,
    },
}

/// Orchestrator-level view for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSnapshot {
    pub stage: ImportStage,
    pub repo: Option<RepositoryRef>,
    pub branch: Option<String>,
    pub registration: RegistrationState,
}

impl Default for ImportSnapshot {
    fn default() -> Self {
        Self {
            stage: ImportStage::Repo,
            repo: None,
            branch: None,
            registration: RegistrationState::NotStarted,
        }
    }
}

/// Headless engine for one repository import
pub struct ImportOrchestrator {
    config: Config,
    api: Arc<dyn DashboardApi>,
    auth: DeviceAuthClient,
    resolver: RepoResolver,
    clone: CloneMonitor,
    snapshot: watch::Sender<ImportSnapshot>,
    pending: Mutex<Option<PendingRegistration>>,
}

impl ImportOrchestrator {
    pub fn new(api: Arc<dyn DashboardApi>, config: Config) -> Self {
        let (snapshot, _) = watch::channel(ImportSnapshot::default());
        Self {
            auth: DeviceAuthClient::new(api.clone(), &config),
            resolver: RepoResolver::new(api.clone(), &config),
            clone: CloneMonitor::new(api.clone(), &config),
            config,
            api,
            snapshot,
            pending: Mutex::new(None),
        }
    }

    pub fn auth(&self) -> &DeviceAuthClient {
        &self.auth
    }

    pub fn resolver(&self) -> &RepoResolver {
        &self.resolver
    }

    pub fn clone_monitor(&self) -> &CloneMonitor {
        &self.clone
    }

    pub fn snapshot(&self) -> ImportSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ImportSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn stage(&self) -> ImportStage {
        self.snapshot.borrow().stage
    }

    /// Make sure the backend holds a GitHub authorization with enough scope
    ///
    /// Runs the device flow when disconnected, or revokes and reauthorizes when
    /// the stored token lacks scope.
    pub async fn ensure_connected(&self) -> Result<ConnectionStatus> {
        let status = self.auth.connection_status().await?;
        if status.connected && status.has_required_scope {
            return Ok(status);
        }

        if status.connected {
            info!("GitHub connection lacks required scope, reconnecting");
            self.auth.reconnect().await?;
        } else {
            info!("GitHub not connected, starting device authorization");
            self.auth.start().await?;
        }
        self.auth.wait().await?;

        self.auth.connection_status().await
    }

    /// Debounced repository search; `None` means a newer search superseded it
    pub async fn search_repositories(&self, query: &str) -> Result<Option<Vec<RepositoryRef>>> {
        self.resolver.search(query).await
    }

    /// Choose a repository and load its branches
    pub async fn select_repository(
        &self,
        repo: RepositoryRef,
        pat: Option<SecretString>,
    ) -> Result<Vec<BranchRef>> {
        self.reset_from(ImportStage::Repo);
        self.snapshot.send_modify(|s| {
            s.stage = ImportStage::Branch;
            s.repo = Some(repo.clone());
        });
        info!(repo = %repo.full_name, "repository selected");
        self.resolver.list_branches(&repo, pat).await
    }

    /// Choose a repository typed as `owner/repo` or a GitHub URL
    ///
    /// Malformed input is rejected before any state changes or network calls.
    pub async fn select_direct_input(
        &self,
        text: &str,
        pat: Option<SecretString>,
    ) -> Result<Vec<BranchRef>> {
        let repo = self.resolver.resolve_direct_input(text)?;
        self.select_repository(repo, pat).await
    }

    /// Retry branch loading for the selected repository with a PAT
    pub async fn retry_with_pat(&self, pat: SecretString) -> Result<Vec<BranchRef>> {
        let repo = self.require_stage(ImportStage::Branch)?;
        self.resolver.retry_with_pat(&repo, pat).await
    }

    pub fn select_branch(&self, name: &str) -> Result<BranchRef> {
        self.require_stage(ImportStage::Branch)?;
        let branch = self.resolver.select_branch(name)?;
        self.snapshot
            .send_modify(|s| s.branch = Some(branch.name.clone()));
        Ok(branch)
    }

    /// Clone the selected branch and register it as a project
    pub async fn clone_and_register(&self, details: ProjectDetails) -> Result<ImportResult> {
        let snapshot = self.snapshot();
        let (repo, branch) = match (snapshot.repo, snapshot.branch) {
            (Some(repo), Some(branch)) if snapshot.stage >= ImportStage::Branch => (repo, branch),
            _ => {
                return Err(CrewdeckError::InvalidState(
                    "Select a repository and branch before cloning".into(),
                ))
            }
        };

        self.reset_from(ImportStage::Clone);
        self.snapshot.send_modify(|s| s.stage = ImportStage::Clone);

        let target_path = details.target_path.clone().unwrap_or_else(|| {
            self.config
                .default_target_path(&repo.name)
                .to_string_lossy()
                .into_owned()
        });

        let outcome = self
            .clone
            .submit(CloneRequest {
                owner: repo.owner.clone(),
                repo: repo.name.clone(),
                branch: branch.clone(),
                target_path,
                pat: self.resolver.pat(),
            })
            .await?;

        let pending = PendingRegistration {
            repo,
            branch,
            target_path: outcome.target_path,
            details,
        };
        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = Some(pending.clone());
        self.register(pending).await
    }

    /// Register the already cloned checkout again after a failed attempt
    pub async fn retry_registration(&self) -> Result<ImportResult> {
        let pending = self.pending_registration().ok_or_else(|| {
            CrewdeckError::InvalidState("No cloned repository is waiting for registration".into())
        })?;
        self.register(pending).await
    }

    /// Clone result kept after a failed registration
    pub fn pending_registration(&self) -> Option<PendingRegistration> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn register(&self, pending: PendingRegistration) -> Result<ImportResult> {
        self.snapshot
            .send_modify(|s| s.registration = RegistrationState::Registering);

        match self.api.create_project(&pending.project_request()).await {
            Ok(record) => {
                let result = ImportResult {
                    project_id: record.id,
                    project_path: pending.target_path.clone(),
                    branch: pending.branch.clone(),
                };
                info!(project_id = %result.project_id, path = %result.project_path, "project registered");
                self.pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .take();
                self.snapshot.send_modify(|s| {
                    s.registration = RegistrationState::Registered(result.clone())
                });
                Ok(result)
            }
            Err(err) => {
                let message = error_message(&err);
                warn!(path = %pending.target_path, %message, "project registration failed");
                self.snapshot.send_modify(|s| {
                    s.registration = RegistrationState::Failed {
                        message: message.clone(),
                    }
                });
                Err(CrewdeckError::RegistrationFailed {
                    target_path: pending.target_path,
                    message,
                })
            }
        }
    }

    /// Step back to an earlier stage
    ///
    /// Resets state owned by `stage` and later stages only.
    pub fn back_to(&self, stage: ImportStage) -> Result<()> {
        if stage > self.stage() {
            return Err(CrewdeckError::InvalidState(format!(
                "Cannot move forward to {:?} with back_to",
                stage
            )));
        }

        self.reset_from(stage);
        self.snapshot.send_modify(|s| {
            s.stage = stage;
            if stage == ImportStage::Repo {
                s.repo = None;
            }
            if stage <= ImportStage::Branch {
                s.branch = None;
            }
        });
        Ok(())
    }

    /// Clear state owned by `stage` and everything after it
    fn reset_from(&self, stage: ImportStage) {
        self.clone.reset();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.snapshot
            .send_modify(|s| s.registration = RegistrationState::NotStarted);

        match stage {
            ImportStage::Repo => self.resolver.reset(),
            ImportStage::Branch => self.resolver.unselect_branch(),
            ImportStage::Clone => {}
        }
    }

    fn require_stage(&self, stage: ImportStage) -> Result<RepositoryRef> {
        let snapshot = self.snapshot();
        match snapshot.repo {
            Some(repo) if snapshot.stage == stage => Ok(repo),
            _ => Err(CrewdeckError::InvalidState(format!(
                "Operation requires the {:?} stage, currently at {:?}",
                stage, snapshot.stage
            ))),
        }
    }

    /// Cancel every active poller
    pub fn cancel(&self) {
        self.auth.cancel();
        self.clone.cancel();
    }
}
