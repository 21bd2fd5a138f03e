//! crewdeck - GitHub repository import engine for the agent company dashboard
//!
//! This library drives the dashboard's repository import: OAuth device
//! authorization, repository and branch resolution with PAT escalation, and
//! clone job monitoring that ends in a registered project. The engine is
//! headless; front-ends subscribe to its state through `watch` channels.

pub mod backend;
pub mod cli;
pub mod core;
pub mod error;
pub mod github;
pub mod import;

pub use error::{CrewdeckError, Result};
