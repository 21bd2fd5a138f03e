//! Repository import pipeline
//!
//! Ties device authorization, repository/branch resolution and clone
//! monitoring into one linear `Repo → Branch → Clone` flow that ends with a
//! registered project.

pub mod orchestrator;
pub mod project;

pub use orchestrator::{ImportOrchestrator, ImportSnapshot, ImportStage, RegistrationState};
pub use project::{ImportResult, PendingRegistration, ProjectDetails};
