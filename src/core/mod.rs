//! Core functionality for crewdeck
//!
//! This module contains shared plumbing including:
//! - Application configuration
//! - Cancellable polling tasks

pub mod config;
pub mod task;

pub use config::{Config, PollingConfig};
pub use task::{PollTask, StopFlag, TaskSlot};
