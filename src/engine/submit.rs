use crate::engine::RunBackend;
use crate::error::{MonitorError, Result};
use crate::model::{RunId, RunRequest, RunVariant};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Issues run-creation requests. Never polls; the monitor owns that.
#[derive(Clone)]
pub struct Submitter {
    backend: Arc<dyn RunBackend>,
    variant: RunVariant,
}

impl Submitter {
    pub fn new(backend: Arc<dyn RunBackend>, variant: RunVariant) -> Self {
        Self { backend, variant }
    }

    pub fn variant(&self) -> RunVariant {
        self.variant
    }

    pub fn backend(&self) -> Arc<dyn RunBackend> {
        Arc::clone(&self.backend)
    }

    /// Send exactly one creation request and return the server-assigned id.
    ///
    /// Workflow runs require a request body; demo runs must not carry one.
    pub async fn submit(&self, request: Option<&RunRequest>) -> Result<RunId> {
        match (self.variant, request) {
            (RunVariant::Workflow, None) => {
                return Err(MonitorError::invalid_input(
                    "workflow runs need a workflow name and inputs",
                ))
            }
            (RunVariant::Demo, Some(_)) => {
                return Err(MonitorError::invalid_input("demo runs take no inputs"))
            }
            _ => {}
        }

        let started = Instant::now();
        let result = self.backend.create_run(self.variant, request).await;
        match &result {
            Ok(run_id) => info!(
                name: "run.submitted",
                run_id = %run_id,
                variant = ?self.variant,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "run accepted"
            ),
            Err(e) => warn!(
                name: "run.submit.failed",
                variant = ?self.variant,
                kind = ?e.kind(),
                error = %e,
                "run submission failed"
            ),
        }
        result
    }
}
