//! Repository and branch resolution
//!
//! Drives the `RepoSelection → BranchLoading → (BranchList | BranchError) →
//! BranchSelected` state machine. Repository search is debounced and the latest
//! initiated search always wins; branch listing can be retried with a Personal
//! Access Token that lives only in memory for the current attempt.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::{BranchRef, DashboardApi};
use crate::core::Config;
use crate::error::{CrewdeckError, Result};
use crate::github::error_handler::{classify_branch_error, BranchFailure};
use crate::github::repository::{self, RepositoryRef};

/// Resolver stage
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResolverState {
    #[default]
    RepoSelection,
    BranchLoading {
        repo: RepositoryRef,
        with_pat: bool,
    },
    BranchList {
        repo: RepositoryRef,
        branches: Vec<BranchRef>,
    },
    BranchError {
        repo: RepositoryRef,
        failure: BranchFailure,
    },
    BranchSelected {
        repo: RepositoryRef,
        branches: Vec<BranchRef>,
        branch: BranchRef,
    },
}

impl ResolverState {
    /// Repository the stage is working on, if any
    pub fn repo(&self) -> Option<&RepositoryRef> {
        match self {
            ResolverState::RepoSelection => None,
            ResolverState::BranchLoading { repo, .. }
            | ResolverState::BranchList { repo, .. }
            | ResolverState::BranchError { repo, .. }
            | ResolverState::BranchSelected { repo, .. } => Some(repo),
        }
    }
}

/// Clears a busy flag when dropped, unless a newer load has taken over
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
    current: &'a AtomicU64,
    generation: u64,
}

impl<'a> BusyGuard<'a> {
    fn set(flag: &'a AtomicBool, current: &'a AtomicU64, generation: u64) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self {
            flag,
            current,
            generation,
        }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if self.current.load(Ordering::SeqCst) == self.generation {
            self.flag.store(false, Ordering::SeqCst);
        }
    }
}

/// Repository/branch resolver
pub struct RepoResolver {
    api: Arc<dyn DashboardApi>,
    debounce: Duration,
    search_generation: AtomicU64,
    branch_generation: AtomicU64,
    repositories: watch::Sender<Vec<RepositoryRef>>,
    state: watch::Sender<ResolverState>,
    pat: Mutex<Option<SecretString>>,
    loading_branches: AtomicBool,
    retrying_with_pat: AtomicBool,
}

impl RepoResolver {
    pub fn new(api: Arc<dyn DashboardApi>, config: &Config) -> Self {
        let (repositories, _) = watch::channel(Vec::new());
        let (state, _) = watch::channel(ResolverState::RepoSelection);
        Self {
            api,
            debounce: config.polling.search_debounce(),
            search_generation: AtomicU64::new(0),
            branch_generation: AtomicU64::new(0),
            repositories,
            state,
            pat: Mutex::new(None),
            loading_branches: AtomicBool::new(false),
            retrying_with_pat: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ResolverState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResolverState> {
        self.state.subscribe()
    }

    /// Latest published search results
    pub fn repositories(&self) -> Vec<RepositoryRef> {
        self.repositories.borrow().clone()
    }

    pub fn subscribe_repositories(&self) -> watch::Receiver<Vec<RepositoryRef>> {
        self.repositories.subscribe()
    }

    /// Initial branch load in flight
    pub fn is_loading_branches(&self) -> bool {
        self.loading_branches.load(Ordering::SeqCst)
    }

    /// PAT retry in flight
    pub fn is_retrying_with_pat(&self) -> bool {
        self.retrying_with_pat.load(Ordering::SeqCst)
    }

    /// Debounced repository search
    ///
    /// Returns `None` when a newer search started before this one finished;
    /// superseded searches never publish results.
    pub async fn search(&self, query: &str) -> Result<Option<Vec<RepositoryRef>>> {
        let generation = self.search_generation.fetch_add(1, Ordering::SeqCst) + 1;

        tokio::time::sleep(self.debounce).await;
        if self.is_stale_search(generation) {
            debug!(query, "search superseded during debounce");
            return Ok(None);
        }

        let result = self.api.list_repositories(query.trim()).await;
        if self.is_stale_search(generation) {
            debug!(query, "discarding stale search response");
            return Ok(None);
        }

        let repos = result?;
        debug!(query, count = repos.len(), "search results");
        self.repositories.send_replace(repos.clone());
        Ok(Some(repos))
    }

    fn is_stale_search(&self, generation: u64) -> bool {
        self.search_generation.load(Ordering::SeqCst) != generation
    }

    /// Build a repository reference from free text without any network call
    pub fn resolve_direct_input(&self, text: &str) -> Result<RepositoryRef> {
        repository::resolve_direct_input(text)
    }

    /// Load branches for a repository
    ///
    /// A PAT given here is remembered for retries within this attempt.
    pub async fn list_branches(
        &self,
        repo: &RepositoryRef,
        pat: Option<SecretString>,
    ) -> Result<Vec<BranchRef>> {
        if let Some(pat) = pat {
            self.remember_pat(pat);
        }
        self.load_branches(repo, &self.loading_branches).await
    }

    /// Retry a failed branch load with an escalated credential
    pub async fn retry_with_pat(
        &self,
        repo: &RepositoryRef,
        pat: SecretString,
    ) -> Result<Vec<BranchRef>> {
        self.remember_pat(pat);
        self.load_branches(repo, &self.retrying_with_pat).await
    }

    async fn load_branches(&self, repo: &RepositoryRef, busy: &AtomicBool) -> Result<Vec<BranchRef>> {
        let generation = self.branch_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let pat = self.pat();
        let used_pat = pat.is_some();

        self.clear_busy();
        let _busy = BusyGuard::set(busy, &self.branch_generation, generation);
        self.state.send_replace(ResolverState::BranchLoading {
            repo: repo.clone(),
            with_pat: used_pat,
        });

        let result = self
            .api
            .list_branches(&repo.owner, &repo.name, pat.as_ref())
            .await;

        if self.branch_generation.load(Ordering::SeqCst) != generation {
            debug!(repo = %repo.full_name, "discarding stale branch response");
            return Err(CrewdeckError::Cancelled);
        }

        match result {
            Ok(branches) => {
                info!(repo = %repo.full_name, count = branches.len(), used_pat, "branches loaded");
                self.state.send_replace(ResolverState::BranchList {
                    repo: repo.clone(),
                    branches: branches.clone(),
                });
                Ok(branches)
            }
            Err(err) => {
                let failure = classify_branch_error(&err, used_pat);
                warn!(repo = %repo.full_name, ?failure, used_pat, "branch listing failed");
                self.state.send_replace(ResolverState::BranchError {
                    repo: repo.clone(),
                    failure: failure.clone(),
                });
                Err(match failure {
                    BranchFailure::NotFoundOrNoAccess => CrewdeckError::RepoAccessDenied {
                        owner: repo.owner.clone(),
                        repo: repo.name.clone(),
                    },
                    BranchFailure::InvalidPat => CrewdeckError::InvalidPat,
                    BranchFailure::Other(_) => err,
                })
            }
        }
    }

    /// Pick a branch from the loaded list
    pub fn select_branch(&self, name: &str) -> Result<BranchRef> {
        let (repo, branches) = match self.state() {
            ResolverState::BranchList { repo, branches }
            | ResolverState::BranchSelected { repo, branches, .. } => (repo, branches),
            _ => {
                return Err(CrewdeckError::InvalidState(
                    "Branches have not been loaded yet".into(),
                ))
            }
        };

        let branch = branches
            .iter()
            .find(|b| b.name == name)
            .cloned()
            .ok_or_else(|| {
                CrewdeckError::InvalidState(format!(
                    "Branch '{}' does not exist in {}",
                    name, repo.full_name
                ))
            })?;

        self.state.send_replace(ResolverState::BranchSelected {
            repo,
            branches,
            branch: branch.clone(),
        });
        Ok(branch)
    }

    /// Return to the branch list, dropping the branch choice
    pub fn unselect_branch(&self) {
        if let ResolverState::BranchSelected { repo, branches, .. } = self.state() {
            self.state
                .send_replace(ResolverState::BranchList { repo, branches });
        }
    }

    /// PAT remembered for this attempt
    pub fn pat(&self) -> Option<SecretString> {
        self.pat.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn remember_pat(&self, pat: SecretString) {
        *self.pat.lock().unwrap_or_else(|e| e.into_inner()) = Some(pat);
    }

    fn clear_busy(&self) {
        self.loading_branches.store(false, Ordering::SeqCst);
        self.retrying_with_pat.store(false, Ordering::SeqCst);
    }

    pub fn clear_pat(&self) {
        self.pat.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    /// Back to repository selection; forgets the PAT and ignores in-flight loads
    pub fn reset(&self) {
        self.branch_generation.fetch_add(1, Ordering::SeqCst);
        self.clear_busy();
        self.clear_pat();
        self.state.send_replace(ResolverState::RepoSelection);
    }
}

/// Branch to preselect: the flagged default, then the repository's default, then the first
pub fn preferred_branch<'a>(repo: &RepositoryRef, branches: &'a [BranchRef]) -> Option<&'a BranchRef> {
    branches
        .iter()
        .find(|b| b.is_default)
        .or_else(|| {
            repo.default_branch
                .as_deref()
                .and_then(|name| branches.iter().find(|b| b.name == name))
        })
        .or_else(|| branches.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{api_error, branch, count, ScriptedApi};

    fn resolver(api: &Arc<ScriptedApi>) -> RepoResolver {
        RepoResolver::new(api.clone(), &Config::default())
    }

    fn repo(full_name: &str) -> RepositoryRef {
        let (owner, name) = full_name.split_once('/').unwrap();
        RepositoryRef::from_owner_repo(owner, name)
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_load_keeps_newer_load_busy() {
        let api = Arc::new(ScriptedApi::new());
        api.push_branches_after(Duration::from_secs(1), Ok(vec![branch("old", true)]));
        api.push_branches_after(Duration::from_secs(5), Ok(vec![branch("main", true)]));

        let resolver = Arc::new(resolver(&api));
        let first = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.list_branches(&repo("acme/widgets"), None).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.list_branches(&repo("acme/gadgets"), None).await })
        };

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(matches!(first.await.unwrap(), Err(CrewdeckError::Cancelled)));
        assert!(resolver.is_loading_branches());

        let branches = second.await.unwrap().unwrap();
        assert_eq!(branches, vec![branch("main", true)]);
        assert!(!resolver.is_loading_branches());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_busy_flag_of_abandoned_load() {
        let api = Arc::new(ScriptedApi::new());
        api.push_branches_after(Duration::from_secs(5), Ok(vec![branch("main", true)]));

        let resolver = Arc::new(resolver(&api));
        let load = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.list_branches(&repo("acme/widgets"), None).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(resolver.is_loading_branches());

        resolver.reset();
        assert!(!resolver.is_loading_branches());
        assert!(matches!(load.await.unwrap(), Err(CrewdeckError::Cancelled)));
        assert!(!resolver.is_loading_branches());
        assert_eq!(resolver.state(), ResolverState::RepoSelection);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_search_wins_over_slow_response() {
        let api = Arc::new(ScriptedApi::new());
        api.set_repos("ac", Duration::from_secs(2), vec![repo("acorn/ac")]);
        api.set_repos("acme", Duration::from_millis(100), vec![repo("acme/widgets")]);

        let resolver = Arc::new(resolver(&api));
        let slow = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.search("ac").await })
        };
        // let "ac" get past the debounce so its request is in flight
        tokio::time::sleep(Duration::from_millis(400)).await;
        let fast = resolver.search("acme").await.unwrap();

        assert_eq!(fast, Some(vec![repo("acme/widgets")]));
        assert_eq!(slow.await.unwrap().unwrap(), None);
        assert_eq!(resolver.repositories(), vec![repo("acme/widgets")]);
        assert_eq!(count(&api.calls.list_repositories), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_typing_is_debounced() {
        let api = Arc::new(ScriptedApi::new());
        api.set_repos("acme", Duration::ZERO, vec![repo("acme/widgets")]);
        let resolver = resolver(&api);

        let (first, second) = tokio::join!(resolver.search("ac"), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            resolver.search("acme").await
        });

        assert_eq!(first.unwrap(), None);
        assert_eq!(second.unwrap(), Some(vec![repo("acme/widgets")]));
        assert_eq!(api.log_entries(), vec!["list_repositories:acme".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_query_lists_recent() {
        let api = Arc::new(ScriptedApi::new());
        api.set_repos("", Duration::ZERO, vec![repo("acme/recent")]);
        let resolver = resolver(&api);

        let repos = resolver.search("   ").await.unwrap();
        assert_eq!(repos, Some(vec![repo("acme/recent")]));
    }

    #[tokio::test]
    async fn test_direct_input_makes_no_network_call() {
        let api = Arc::new(ScriptedApi::new());
        let resolver = resolver(&api);

        assert!(matches!(
            resolver.resolve_direct_input("not a valid ref"),
            Err(CrewdeckError::InvalidRepositoryReference(_))
        ));
        let parsed = resolver
            .resolve_direct_input("https://github.com/acme/widgets.git")
            .unwrap();
        assert_eq!(parsed, repo("acme/widgets"));
        assert!(api.log_entries().is_empty());
    }

    #[tokio::test]
    async fn test_branch_list_and_select() {
        let api = Arc::new(ScriptedApi::new());
        api.push_branches(Ok(vec![branch("main", true), branch("dev", false)]));
        let resolver = resolver(&api);
        let target = repo("acme/widgets");

        let branches = resolver.list_branches(&target, None).await.unwrap();
        assert_eq!(branches.len(), 2);
        assert!(!resolver.is_loading_branches());
        assert_eq!(preferred_branch(&target, &branches).unwrap().name, "main");

        let selected = resolver.select_branch("dev").unwrap();
        assert_eq!(selected.name, "dev");
        assert!(matches!(
            resolver.state(),
            ResolverState::BranchSelected { ref branch, .. } if branch.name == "dev"
        ));

        assert!(resolver.select_branch("nope").is_err());
        resolver.unselect_branch();
        assert!(matches!(resolver.state(), ResolverState::BranchList { .. }));
    }

    #[tokio::test]
    async fn test_not_found_then_retry_with_pat() {
        let api = Arc::new(ScriptedApi::new());
        api.push_branches(Err(api_error(404, "Not Found")));
        api.push_branches(Ok(vec![branch("main", true)]));
        let resolver = resolver(&api);
        let target = repo("acme/private");

        let err = resolver.list_branches(&target, None).await.unwrap_err();
        assert!(matches!(err, CrewdeckError::RepoAccessDenied { .. }));
        assert_eq!(
            resolver.state(),
            ResolverState::BranchError {
                repo: target.clone(),
                failure: BranchFailure::NotFoundOrNoAccess
            }
        );

        let branches = resolver
            .retry_with_pat(&target, SecretString::from("ghp_secret".to_string()))
            .await
            .unwrap();
        assert_eq!(branches[0].name, "main");
        assert!(!resolver.is_retrying_with_pat());
        assert_eq!(
            *api.seen_pats.lock().unwrap(),
            vec![None, Some("ghp_secret".to_string())]
        );
        assert!(resolver.pat().is_some());
    }

    #[tokio::test]
    async fn test_invalid_pat_classified() {
        let api = Arc::new(ScriptedApi::new());
        api.push_branches(Err(api_error(401, "Bad credentials")));
        let resolver = resolver(&api);
        let target = repo("acme/private");

        let err = resolver
            .retry_with_pat(&target, SecretString::from("ghp_old".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, CrewdeckError::InvalidPat));
        assert!(matches!(
            resolver.state(),
            ResolverState::BranchError {
                failure: BranchFailure::InvalidPat,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_generic_error_passed_through() {
        let api = Arc::new(ScriptedApi::new());
        api.push_branches(Err(api_error(500, "upstream exploded")));
        let resolver = resolver(&api);

        let err = resolver
            .list_branches(&repo("acme/widgets"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CrewdeckError::Api { status: 500, ref message } if message == "upstream exploded"));
    }

    #[tokio::test]
    async fn test_reset_forgets_pat() {
        let api = Arc::new(ScriptedApi::new());
        let resolver = resolver(&api);
        resolver
            .list_branches(
                &repo("acme/widgets"),
                Some(SecretString::from("ghp_x".to_string())),
            )
            .await
            .unwrap();
        assert!(resolver.pat().is_some());

        resolver.reset();
        assert!(resolver.pat().is_none());
        assert_eq!(resolver.state(), ResolverState::RepoSelection);
    }
}
