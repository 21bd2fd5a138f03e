//! Scripted in-memory backend used by unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::backend::{
    BranchRef, CloneJobStatus, CloneRequest, CloneStatus, CloneSubmission, ConnectionStatus,
    DashboardApi, DeviceAuthorization, DevicePollStatus, ProjectRecord, ProjectRequest,
};
use crate::error::{CrewdeckError, Result};
use crate::github::repository::RepositoryRef;

/// Per-endpoint call counters
#[derive(Debug, Default)]
pub struct Calls {
    pub connection_status: AtomicUsize,
    pub start_device_flow: AtomicUsize,
    pub poll_device_flow: AtomicUsize,
    pub disconnect: AtomicUsize,
    pub list_repositories: AtomicUsize,
    pub list_branches: AtomicUsize,
    pub submit_clone: AtomicUsize,
    pub clone_status: AtomicUsize,
    pub create_project: AtomicUsize,
}

/// Read a call counter
pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

/// Backend whose answers are queued up front
///
/// Empty queues fall back to: pending device polls, a 503 for clone status,
/// and generic success for everything else.
#[derive(Default)]
pub struct ScriptedApi {
    pub calls: Calls,
    connection: Mutex<ConnectionStatus>,
    device_starts: Mutex<VecDeque<Result<DeviceAuthorization>>>,
    device_polls: Mutex<VecDeque<Result<DevicePollStatus>>>,
    repos: Mutex<HashMap<String, (Duration, Vec<RepositoryRef>)>>,
    branches: Mutex<VecDeque<(Duration, Result<Vec<BranchRef>>)>>,
    clone_submits: Mutex<VecDeque<Result<CloneSubmission>>>,
    clone_statuses: Mutex<VecDeque<Result<CloneStatus>>>,
    clone_status_hangs: AtomicBool,
    projects: Mutex<VecDeque<Result<ProjectRecord>>>,
    /// Log of every call, in order
    pub log: Mutex<Vec<String>>,
    /// PAT values seen by branch listing (exposed for assertions only)
    pub seen_pats: Mutex<Vec<Option<String>>>,
    /// PAT values seen by clone submission
    pub clone_pats: Mutex<Vec<Option<String>>>,
    pub project_requests: Mutex<Vec<ProjectRequest>>,
}

pub fn authorization(interval_seconds: u64) -> DeviceAuthorization {
    DeviceAuthorization {
        user_code: "ABCD-1234".into(),
        verification_uri: "https://github.com/login/device".into(),
        state_id: "state-1".into(),
        interval_seconds,
    }
}

pub fn branch(name: &str, is_default: bool) -> BranchRef {
    BranchRef {
        name: name.into(),
        sha: format!("{}-sha", name),
        is_default,
    }
}

pub fn status(progress: u8, status: CloneJobStatus) -> CloneStatus {
    CloneStatus {
        progress,
        status,
        error: None,
    }
}

pub fn api_error(status: u16, message: &str) -> CrewdeckError {
    CrewdeckError::Api {
        status,
        message: message.into(),
    }
}

fn pop<T>(queue: &Mutex<VecDeque<Result<T>>>) -> Option<Result<T>> {
    queue.lock().unwrap().pop_front()
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, counter: &AtomicUsize, entry: String) {
        counter.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(entry);
    }

    pub fn set_connection(&self, connected: bool, has_required_scope: bool) {
        *self.connection.lock().unwrap() = ConnectionStatus {
            connected,
            has_required_scope,
            login: connected.then(|| "octocat".to_string()),
        };
    }

    pub fn push_device_start(&self, result: Result<DeviceAuthorization>) {
        self.device_starts.lock().unwrap().push_back(result);
    }

    pub fn push_device_poll(&self, result: Result<DevicePollStatus>) {
        self.device_polls.lock().unwrap().push_back(result);
    }

    pub fn set_repos(&self, query: &str, delay: Duration, repos: Vec<RepositoryRef>) {
        self.repos
            .lock()
            .unwrap()
            .insert(query.to_string(), (delay, repos));
    }

    pub fn push_branches(&self, result: Result<Vec<BranchRef>>) {
        self.push_branches_after(Duration::ZERO, result);
    }

    /// Queue a branch listing answered only after `delay`
    pub fn push_branches_after(&self, delay: Duration, result: Result<Vec<BranchRef>>) {
        self.branches.lock().unwrap().push_back((delay, result));
    }

    pub fn push_clone_submit(&self, result: Result<CloneSubmission>) {
        self.clone_submits.lock().unwrap().push_back(result);
    }

    pub fn push_clone_status(&self, result: Result<CloneStatus>) {
        self.clone_statuses.lock().unwrap().push_back(result);
    }

    /// Make every clone status request wait forever
    pub fn hang_clone_status(&self) {
        self.clone_status_hangs.store(true, Ordering::SeqCst);
    }

    pub fn push_project(&self, result: Result<ProjectRecord>) {
        self.projects.lock().unwrap().push_back(result);
    }

    pub fn log_entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl DashboardApi for ScriptedApi {
    async fn connection_status(&self) -> Result<ConnectionStatus> {
        self.record(&self.calls.connection_status, "connection_status".into());
        Ok(self.connection.lock().unwrap().clone())
    }

    async fn start_device_flow(&self) -> Result<DeviceAuthorization> {
        self.record(&self.calls.start_device_flow, "start_device_flow".into());
        pop(&self.device_starts).unwrap_or_else(|| Ok(authorization(5)))
    }

    async fn poll_device_flow(&self, state_id: &str) -> Result<DevicePollStatus> {
        self.record(
            &self.calls.poll_device_flow,
            format!("poll_device_flow:{}", state_id),
        );
        let result = pop(&self.device_polls).unwrap_or(Ok(DevicePollStatus::AuthorizationPending));
        if matches!(result, Ok(DevicePollStatus::Complete)) {
            self.set_connection(true, true);
        }
        result
    }

    async fn disconnect(&self) -> Result<()> {
        self.record(&self.calls.disconnect, "disconnect".into());
        self.set_connection(false, false);
        Ok(())
    }

    async fn list_repositories(&self, query: &str) -> Result<Vec<RepositoryRef>> {
        self.record(
            &self.calls.list_repositories,
            format!("list_repositories:{}", query),
        );
        let scripted = self.repos.lock().unwrap().get(query).cloned();
        match scripted {
            Some((delay, repos)) => {
                tokio::time::sleep(delay).await;
                Ok(repos)
            }
            None => Ok(Vec::new()),
        }
    }

    async fn list_branches(
        &self,
        owner: &str,
        repo: &str,
        pat: Option<&SecretString>,
    ) -> Result<Vec<BranchRef>> {
        self.record(
            &self.calls.list_branches,
            format!("list_branches:{}/{}", owner, repo),
        );
        self.seen_pats
            .lock()
            .unwrap()
            .push(pat.map(|p| p.expose_secret().to_string()));
        let scripted = self.branches.lock().unwrap().pop_front();
        match scripted {
            Some((delay, result)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            None => Ok(vec![branch("main", true)]),
        }
    }

    async fn submit_clone(&self, request: &CloneRequest) -> Result<CloneSubmission> {
        self.record(
            &self.calls.submit_clone,
            format!(
                "submit_clone:{}/{}@{}",
                request.owner, request.repo, request.branch
            ),
        );
        self.clone_pats
            .lock()
            .unwrap()
            .push(request.pat.as_ref().map(|p| p.expose_secret().to_string()));
        pop(&self.clone_submits).unwrap_or_else(|| {
            Ok(CloneSubmission::Started {
                clone_id: "clone-1".into(),
                target_path: request.target_path.clone(),
            })
        })
    }

    async fn clone_status(&self, clone_id: &str) -> Result<CloneStatus> {
        self.record(&self.calls.clone_status, format!("clone_status:{}", clone_id));
        if self.clone_status_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        pop(&self.clone_statuses).unwrap_or_else(|| Err(api_error(503, "unscripted")))
    }

    async fn create_project(&self, request: &ProjectRequest) -> Result<ProjectRecord> {
        self.record(
            &self.calls.create_project,
            format!("create_project:{}", request.name),
        );
        self.project_requests.lock().unwrap().push(request.clone());
        pop(&self.projects).unwrap_or_else(|| {
            Ok(ProjectRecord {
                id: "proj-1".into(),
                name: request.name.clone(),
                project_path: Some(request.project_path.clone()),
                created_at: None,
            })
        })
    }
}
