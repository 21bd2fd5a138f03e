//! GitHub import stages
//!
//! This module provides the GitHub-facing parts of the import pipeline:
//! - OAuth Device Flow authorization
//! - Repository references and direct input parsing
//! - Repository search and branch resolution
//! - Clone job monitoring
//! - Error classification

pub mod auth;
pub mod clone;
pub mod error_handler;
pub mod repository;
pub mod resolver;

pub use auth::{open_browser, AuthFailure, DeviceAuthClient, DeviceAuthStatus};
pub use clone::{CloneMonitor, CloneOutcome, CloneState};
pub use error_handler::{classify_branch_error, BranchFailure};
pub use repository::{resolve_direct_input, RepositoryRef};
pub use resolver::{RepoResolver, ResolverState};
