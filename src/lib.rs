//! Client for long-running workflow runs: submit a run, then follow it by polling its
//! status until it completes, fails, or is superseded by a newer run.
//!
//! The core is [`orchestrator::RunMonitor`], which owns at most one
//! [`engine::Poller`] at a time and publishes a [`model::MonitorSnapshot`] on every
//! transition.

pub mod cli;
pub mod definition;
pub mod engine;
pub mod error;
pub mod model;
pub mod orchestrator;
mod text_summary;

pub use error::{ErrorKind, Failure, MonitorError};
