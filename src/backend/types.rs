//! Request and response shapes exchanged with the dashboard backend

use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CrewdeckError, Result};

/// Result of the connection status check
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectionStatus {
    /// An authorization is stored on the backend
    pub connected: bool,
    /// The stored token carries the scopes needed for private repositories
    #[serde(default, alias = "has_repo_scope")]
    pub has_required_scope: bool,
    /// GitHub login of the connected account
    #[serde(default)]
    pub login: Option<String>,
}

/// A device-code grant handed out by the backend
///
/// Immutable for the lifetime of one authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceAuthorization {
    /// Code the user types on the verification page
    #[serde(alias = "userCode")]
    pub user_code: String,
    #[serde(alias = "verificationUri")]
    pub verification_uri: String,
    /// Opaque key for the poll endpoint
    #[serde(alias = "stateId")]
    pub state_id: String,
    /// Minimum polling interval in seconds
    #[serde(alias = "interval", default = "default_poll_interval")]
    pub interval_seconds: u64,
}

/// RFC 8628 default when the grant carries no interval
fn default_poll_interval() -> u64 {
    5
}

/// Answer of the device-code poll endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePollStatus {
    AuthorizationPending,
    SlowDown,
    Complete,
    #[serde(alias = "expired_token")]
    Expired,
    #[serde(alias = "access_denied")]
    Denied,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DevicePollResponse {
    pub status: DevicePollStatus,
}

/// A branch of a repository
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BranchRef {
    pub name: String,
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Clone job submission
///
/// The PAT is attached to this single request and never serialized elsewhere.
#[derive(Debug, Clone)]
pub struct CloneRequest {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub target_path: String,
    pub pat: Option<SecretString>,
}

/// Outcome of submitting a clone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneSubmission {
    /// Target already holds a checkout; nothing to poll
    AlreadyExists { target_path: String },
    /// A job was queued and must be polled
    Started {
        clone_id: String,
        target_path: String,
    },
}

#[derive(Debug, Deserialize)]
pub(crate) struct CloneSubmitResponse {
    #[serde(default)]
    pub already_exists: bool,
    #[serde(default)]
    pub clone_id: Option<String>,
    #[serde(default)]
    pub target_path: Option<String>,
}

impl CloneSubmitResponse {
    /// Convert the wire shape, falling back to the requested path
    pub fn into_submission(self, requested_path: &str) -> Result<CloneSubmission> {
        let target_path = self
            .target_path
            .unwrap_or_else(|| requested_path.to_string());

        if self.already_exists {
            return Ok(CloneSubmission::AlreadyExists { target_path });
        }

        match self.clone_id {
            Some(clone_id) => Ok(CloneSubmission::Started {
                clone_id,
                target_path,
            }),
            None => Err(CrewdeckError::Api {
                status: 200,
                message: "clone response carried neither clone_id nor already_exists".into(),
            }),
        }
    }
}

/// Lifecycle of a backend clone job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneJobStatus {
    Pending,
    Cloning,
    Done,
    Error,
}

impl CloneJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CloneJobStatus::Done | CloneJobStatus::Error)
    }
}

impl fmt::Display for CloneJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloneJobStatus::Pending => "pending",
            CloneJobStatus::Cloning => "cloning",
            CloneJobStatus::Done => "done",
            CloneJobStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Snapshot returned by the clone status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CloneStatus {
    #[serde(default, deserialize_with = "percent")]
    pub progress: u8,
    pub status: CloneJobStatus,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of the project create call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectRequest {
    pub name: String,
    pub project_path: String,
    pub core_goal: String,
    pub github_repo: String,
}

/// Project record created by the backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project_path: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Accept fractional or out-of-range progress, clamped to `0..=100`
fn percent<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    if value.is_nan() {
        return Ok(0);
    }
    Ok(value.clamp(0.0, 100.0).round() as u8)
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}
