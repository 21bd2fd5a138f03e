//! Dashboard backend API
//!
//! The import engine treats the backend as an opaque remote service. Every
//! endpoint it consumes is listed on [`DashboardApi`]; [`HttpDashboardApi`]
//! is the production implementation.

pub mod http;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::Result;
use crate::github::repository::RepositoryRef;

pub use http::HttpDashboardApi;
pub use types::{
    BranchRef, CloneJobStatus, CloneRequest, CloneStatus, CloneSubmission, ConnectionStatus,
    DeviceAuthorization, DevicePollStatus, ProjectRecord, ProjectRequest,
};

/// Endpoints of the dashboard backend used by the import pipeline
#[async_trait]
pub trait DashboardApi: Send + Sync {
    /// Is an authorization present, and does it have sufficient scope
    async fn connection_status(&self) -> Result<ConnectionStatus>;

    /// Begin a device-code exchange
    async fn start_device_flow(&self) -> Result<DeviceAuthorization>;

    /// Poll the device-code exchange keyed by `state_id`
    async fn poll_device_flow(&self, state_id: &str) -> Result<DevicePollStatus>;

    /// Revoke the stored authorization
    async fn disconnect(&self) -> Result<()>;

    /// Search repositories; an empty query returns recent repositories
    async fn list_repositories(&self, query: &str) -> Result<Vec<RepositoryRef>>;

    /// List branches, optionally with an escalated credential
    async fn list_branches(
        &self,
        owner: &str,
        repo: &str,
        pat: Option<&SecretString>,
    ) -> Result<Vec<BranchRef>>;

    async fn submit_clone(&self, request: &CloneRequest) -> Result<CloneSubmission>;

    async fn clone_status(&self, clone_id: &str) -> Result<CloneStatus>;

    async fn create_project(&self, request: &ProjectRequest) -> Result<ProjectRecord>;
}
