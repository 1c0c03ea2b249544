//! Post-run processing.
//!
//! Folds the snapshots a monitor published into a single report for JSON output and
//! exit-status decisions.

use crate::model::{MonitorSnapshot, RunConfig, RunId, RunReport, RunState, RunVariant};
use std::time::Duration;

/// Accumulates what a consumer observed during one run.
#[derive(Debug)]
pub struct ReportBuilder {
    base_url: String,
    variant: RunVariant,
    poll_interval: Duration,
    run_id: Option<RunId>,
    updates: u64,
    last: Option<MonitorSnapshot>,
}

impl ReportBuilder {
    pub fn new(cfg: &RunConfig) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            variant: cfg.variant,
            poll_interval: cfg.poll_interval,
            run_id: None,
            updates: 0,
            last: None,
        }
    }

    pub fn started(&mut self, run_id: &RunId) {
        self.run_id = Some(run_id.clone());
    }

    /// Record a snapshot. Only snapshots carrying a run status count as updates.
    pub fn observe(&mut self, snapshot: &MonitorSnapshot) {
        if snapshot.status.is_some() {
            self.updates += 1;
        }
        self.last = Some(snapshot.clone());
    }

    pub fn finish(self) -> RunReport {
        let (status, error) = match self.last {
            Some(s) => (s.status, s.error),
            None => (None, None),
        };
        RunReport {
            timestamp_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            base_url: self.base_url,
            variant: self.variant,
            run_id: self.run_id,
            poll_interval: self.poll_interval,
            updates: self.updates,
            status,
            error,
        }
    }
}

impl RunReport {
    /// The run completed and nothing went wrong on the client side.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
            && self
                .status
                .as_ref()
                .is_some_and(|s| s.status == RunState::Completed)
    }
}
