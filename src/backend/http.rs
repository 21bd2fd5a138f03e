//! REST implementation of the dashboard backend API

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::backend::types::{CloneSubmitResponse, DevicePollResponse};
use crate::backend::{
    BranchRef, CloneRequest, CloneStatus, CloneSubmission, ConnectionStatus, DashboardApi,
    DeviceAuthorization, DevicePollStatus, ProjectRecord, ProjectRequest,
};
use crate::core::Config;
use crate::error::{CrewdeckError, Result};
use crate::github::repository::RepositoryRef;

/// Header carrying a Personal Access Token for a single request
const PAT_HEADER: &str = "X-GitHub-PAT";

/// Lists may come back bare or wrapped in an object
#[derive(Deserialize)]
#[serde(untagged)]
enum RepoList {
    Bare(Vec<RepositoryRef>),
    Wrapped { repos: Vec<RepositoryRef> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BranchList {
    Bare(Vec<BranchRef>),
    Wrapped { branches: Vec<BranchRef> },
}

/// Dashboard backend reached over HTTP
pub struct HttpDashboardApi {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
}

impl HttpDashboardApi {
    /// Create a client from configuration
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.polling.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: Url::parse(&config.api_url)?,
            api_key: config.api_key.clone().map(SecretString::from),
        })
    }

    /// Build an endpoint URL from path segments, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CrewdeckError::Config("api_url cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(method = method.as_str(), path = url.path(), "dashboard request");
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = check_status(builder.send().await?).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Turn a non-success response into an `Api` error
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(CrewdeckError::Api {
        status: status.as_u16(),
        message: extract_message(&body, status.canonical_reason().unwrap_or("error")),
    })
}

/// Pull a human-readable message out of an error body
///
/// Looks for `detail`, `error` or `message` fields and falls back to the raw body.
fn extract_message(body: &str, fallback: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "error", "message"] {
            match value.get(key) {
                Some(serde_json::Value::String(s)) if !s.is_empty() => return s.clone(),
                Some(other) if !other.is_null() => return other.to_string(),
                _ => {}
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl DashboardApi for HttpDashboardApi {
    async fn connection_status(&self) -> Result<ConnectionStatus> {
        let url = self.endpoint(&["api", "github", "status"])?;
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn start_device_flow(&self) -> Result<DeviceAuthorization> {
        let url = self.endpoint(&["api", "github", "device", "start"])?;
        self.send_json(self.request(Method::POST, url)).await
    }

    async fn poll_device_flow(&self, state_id: &str) -> Result<DevicePollStatus> {
        let url = self.endpoint(&["api", "github", "device", "poll", state_id])?;
        let response: DevicePollResponse = self.send_json(self.request(Method::GET, url)).await?;
        Ok(response.status)
    }

    async fn disconnect(&self) -> Result<()> {
        let url = self.endpoint(&["api", "github", "disconnect"])?;
        check_status(self.request(Method::POST, url).send().await?).await?;
        Ok(())
    }

    async fn list_repositories(&self, query: &str) -> Result<Vec<RepositoryRef>> {
        let mut url = self.endpoint(&["api", "github", "repos"])?;
        if !query.is_empty() {
            url.query_pairs_mut().append_pair("q", query);
        }
        let list: RepoList = self.send_json(self.request(Method::GET, url)).await?;
        Ok(match list {
            RepoList::Bare(repos) | RepoList::Wrapped { repos } => repos,
        })
    }

    async fn list_branches(
        &self,
        owner: &str,
        repo: &str,
        pat: Option<&SecretString>,
    ) -> Result<Vec<BranchRef>> {
        let url = self.endpoint(&["api", "github", "repos", owner, repo, "branches"])?;
        let mut builder = self.request(Method::GET, url);
        if let Some(pat) = pat {
            builder = builder.header(PAT_HEADER, pat.expose_secret());
        }
        let list: BranchList = self.send_json(builder).await?;
        Ok(match list {
            BranchList::Bare(branches) | BranchList::Wrapped { branches } => branches,
        })
    }

    async fn submit_clone(&self, request: &CloneRequest) -> Result<CloneSubmission> {
        let url = self.endpoint(&["api", "github", "clone"])?;
        let mut body = json!({
            "owner": request.owner,
            "repo": request.repo,
            "branch": request.branch,
            "target_path": request.target_path,
        });
        if let Some(pat) = &request.pat {
            body["pat"] = json!(pat.expose_secret());
        }

        let response: CloneSubmitResponse = self
            .send_json(self.request(Method::POST, url).json(&body))
            .await?;
        response.into_submission(&request.target_path)
    }

    async fn clone_status(&self, clone_id: &str) -> Result<CloneStatus> {
        let url = self.endpoint(&["api", "github", "clone", clone_id])?;
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn create_project(&self, request: &ProjectRequest) -> Result<ProjectRecord> {
        let url = self.endpoint(&["api", "projects"])?;
        self.send_json(self.request(Method::POST, url).json(request))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpDashboardApi {
        let config = Config {
            api_url: base.to_string(),
            ..Config::default()
        };
        HttpDashboardApi::new(&config).unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let api = api("http://localhost:8000");
        let url = api.endpoint(&["api", "github", "status"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/github/status");
    }

    #[test]
    fn test_endpoint_keeps_base_path_and_encodes() {
        let api = api("https://dash.example.com/backend/");
        let url = api
            .endpoint(&["api", "github", "repos", "acme", "my repo", "branches"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://dash.example.com/backend/api/github/repos/acme/my%20repo/branches"
        );
    }

    #[test]
    fn test_extract_message_prefers_detail() {
        assert_eq!(
            extract_message(r#"{"detail":"Repository not found"}"#, "Not Found"),
            "Repository not found"
        );
        assert_eq!(
            extract_message(r#"{"error":"Bad credentials"}"#, "Unauthorized"),
            "Bad credentials"
        );
    }

    #[test]
    fn test_extract_message_falls_back() {
        assert_eq!(extract_message("  upstream timeout ", "Bad Gateway"), "upstream timeout");
        assert_eq!(extract_message("", "Bad Gateway"), "Bad Gateway");
        assert_eq!(extract_message(r#"{"other":1}"#, "x"), r#"{"other":1}"#);
    }

    #[test]
    fn test_repo_list_shapes() {
        let bare: RepoList = serde_json::from_str(
            r#"[{"full_name":"acme/widgets","owner":"acme","name":"widgets"}]"#,
        )
        .unwrap();
        let wrapped: RepoList = serde_json::from_str(
            r#"{"repos":[{"full_name":"acme/widgets","owner":"acme","name":"widgets"}]}"#,
        )
        .unwrap();
        for list in [bare, wrapped] {
            let repos = match list {
                RepoList::Bare(r) | RepoList::Wrapped { repos: r } => r,
            };
            assert_eq!(repos.len(), 1);
            assert_eq!(repos[0].full_name, "acme/widgets");
        }
    }
}
