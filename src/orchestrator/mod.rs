//! Application-level orchestration.
//!
//! This module owns run lifecycle control (start, supersede, dispose) and the
//! post-run report. CLI layers call into it and only render what it publishes.

mod controller;
mod post_process;

pub use controller::{RunMonitor, StartOutcome};
pub use post_process::ReportBuilder;
