//! In-memory backend with scripted replies for engine and monitor tests.

use crate::engine::{lock, RunBackend};
use crate::error::{Failure, MonitorError, Result};
use crate::model::{RunDefinition, RunId, RunRequest, RunState, RunStatus, RunStep, RunVariant};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

pub(crate) enum Reply {
    Now(Result<RunStatus>),
    /// Resolve only after the given time has passed.
    Delayed(Duration, Result<RunStatus>),
    /// Resolve only once the test releases the gate.
    Gated(Arc<Notify>, Result<RunStatus>),
}

struct Submission {
    gate: Option<Arc<Notify>>,
    result: Result<RunId>,
}

#[derive(Default)]
struct Script {
    submissions: VecDeque<Submission>,
    replies: HashMap<RunId, VecDeque<Reply>>,
    definitions: HashMap<String, Result<RunDefinition>>,
    submitted: Vec<Option<RunRequest>>,
    fetches: Vec<(RunId, Instant)>,
}

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    script: Mutex<Script>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_submission(&self, result: Result<RunId>) {
        lock(&self.script).submissions.push_back(Submission { gate: None, result });
    }

    pub fn push_gated_submission(&self, gate: Arc<Notify>, result: Result<RunId>) {
        lock(&self.script).submissions.push_back(Submission {
            gate: Some(gate),
            result,
        });
    }

    pub fn push_reply(&self, run_id: &str, reply: Reply) {
        lock(&self.script)
            .replies
            .entry(RunId::new(run_id))
            .or_default()
            .push_back(reply);
    }

    pub fn set_definition(&self, name: &str, result: Result<RunDefinition>) {
        lock(&self.script).definitions.insert(name.to_string(), result);
    }

    pub fn submitted(&self) -> Vec<Option<RunRequest>> {
        lock(&self.script).submitted.clone()
    }

    /// Status fetches in the order they were issued.
    pub fn fetches(&self) -> Vec<(RunId, Instant)> {
        lock(&self.script).fetches.clone()
    }

    pub fn fetch_count(&self, run_id: &str) -> usize {
        lock(&self.script)
            .fetches
            .iter()
            .filter(|(id, _)| id.as_str() == run_id)
            .count()
    }
}

#[async_trait]
impl RunBackend for ScriptedBackend {
    async fn create_run(
        &self,
        _variant: RunVariant,
        request: Option<&RunRequest>,
    ) -> Result<RunId> {
        let next = {
            let mut script = lock(&self.script);
            script.submitted.push(request.cloned());
            script.submissions.pop_front()
        };
        let Some(Submission { gate, result }) = next else {
            return Err(MonitorError::SubmissionFailed {
                failure: Failure::Transport {
                    detail: "no scripted submission".into(),
                },
            });
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        result
    }

    async fn fetch_status(&self, _variant: RunVariant, run_id: &RunId) -> Result<RunStatus> {
        let next = {
            let mut script = lock(&self.script);
            script.fetches.push((run_id.clone(), Instant::now()));
            script.replies.get_mut(run_id).and_then(VecDeque::pop_front)
        };
        match next {
            Some(Reply::Now(r)) => r,
            Some(Reply::Delayed(d, r)) => {
                tokio::time::sleep(d).await;
                r
            }
            Some(Reply::Gated(gate, r)) => {
                gate.notified().await;
                r
            }
            // An exhausted script behaves like a backend that never answers.
            None => std::future::pending().await,
        }
    }

    async fn fetch_definition(&self, name: &str) -> Result<RunDefinition> {
        lock(&self.script)
            .definitions
            .get(name)
            .cloned()
            .unwrap_or_else(|| {
                Err(MonitorError::DefinitionFailed {
                    failure: Failure::Status {
                        status: 404,
                        detail: Some("Workflow not found".into()),
                    },
                })
            })
    }
}

/// Build a run snapshot whose steps carry the given states, in order.
pub(crate) fn snapshot(run_id: &str, run: RunState, steps: &[RunState]) -> RunStatus {
    let steps: Vec<RunStep> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| RunStep {
            id: format!("step-{i}"),
            agent: format!("agent-{i}"),
            input: (*s != RunState::Pending).then(|| format!("input {i}")),
            output: s.is_terminal().then(|| format!("output {i}")),
            status: *s,
        })
        .collect();
    let current_step = steps
        .iter()
        .find(|s| s.status == RunState::Running)
        .map(|s| s.id.clone());
    RunStatus {
        run_id: RunId::new(run_id),
        workflow_name: "demo_linear".into(),
        status: run,
        current_step,
        steps,
        error: (run == RunState::Failed).then(|| "agent crashed".to_string()),
    }
}

pub(crate) fn not_found() -> MonitorError {
    MonitorError::FetchFailed {
        failure: Failure::Status {
            status: 404,
            detail: Some("Run not found".into()),
        },
    }
}

/// A status request that never got an HTTP answer.
pub(crate) fn connection_reset() -> MonitorError {
    MonitorError::FetchFailed {
        failure: Failure::Transport {
            detail: "connection reset by peer".into(),
        },
    }
}
