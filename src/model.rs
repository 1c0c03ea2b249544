use crate::error::{ErrorKind, MonitorError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub base_url: String,
    pub variant: RunVariant,
    #[serde(default)]
    pub workflow_name: Option<String>,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
    pub user_agent: String,
}

/// Which pair of backend endpoints a run goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunVariant {
    /// `POST /workflow/run` with a `RunRequest` body.
    Workflow,
    /// `POST /demo/run` with no body.
    Demo,
}

impl RunVariant {
    /// Path segment the backend mounts this variant under.
    pub fn as_path(self) -> &'static str {
        match self {
            RunVariant::Workflow => "workflow",
            RunVariant::Demo => "demo",
        }
    }

    /// Cadence the web client used for each variant.
    pub fn default_poll_interval(self) -> Duration {
        match self {
            RunVariant::Workflow => Duration::from_millis(1200),
            RunVariant::Demo => Duration::from_millis(1000),
        }
    }
}

/// Server-assigned run identifier. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state shared by a run and each of its steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunState {
    /// No further transitions happen once a run reaches one of these.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireStep")]
pub struct RunStep {
    /// Stable key for the step within its run.
    pub id: String,
    pub agent: String,
    pub input: Option<String>,
    pub output: Option<String>,
    pub status: RunState,
}

/// Step as sent by the backend. Demo runs key their steps by agent and send no id.
#[derive(Deserialize)]
struct WireStep {
    #[serde(default)]
    id: Option<String>,
    agent: String,
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    output: Option<String>,
    status: RunState,
}

impl From<WireStep> for RunStep {
    fn from(w: WireStep) -> Self {
        let id = match w.id {
            Some(id) if !id.is_empty() => id,
            _ => w.agent.clone(),
        };
        Self {
            id,
            agent: w.agent,
            input: w.input,
            output: w.output,
            status: w.status,
        }
    }
}

/// Snapshot of a run as reported by the backend. Never built client-side outside tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub run_id: RunId,
    #[serde(default)]
    pub workflow_name: String,
    pub status: RunState,
    #[serde(default, alias = "current_agent")]
    pub current_step: Option<String>,
    #[serde(default)]
    pub steps: Vec<RunStep>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Index of the step currently executing, if any.
    pub fn current_step_index(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.status == RunState::Running)
    }

    /// Completed steps over total steps.
    pub fn progress(&self) -> (usize, usize) {
        let done = self
            .steps
            .iter()
            .filter(|s| s.status == RunState::Completed)
            .count();
        (done, self.steps.len())
    }

    /// Breaches of the sequential-execution invariants, as human-readable lines.
    ///
    /// An empty result means the snapshot is self-consistent. The backend stays the
    /// authority on state, so callers only report these.
    pub fn violations(&self) -> Vec<String> {
        let mut out = Vec::new();

        for step in &self.steps {
            if step.output.is_some() && !step.status.is_terminal() {
                out.push(format!(
                    "step {} has output while {}",
                    step.id,
                    step.status
                ));
            }
        }

        let any_failed = self.steps.iter().any(|s| s.status == RunState::Failed);
        if any_failed && self.status != RunState::Failed {
            out.push(format!("a step failed but run is {}", self.status));
        }

        if self.status == RunState::Completed
            && self.steps.iter().any(|s| s.status != RunState::Completed)
        {
            out.push("run completed with unfinished steps".to_string());
        }

        let running: Vec<usize> = self
            .steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status == RunState::Running)
            .map(|(i, _)| i)
            .collect();
        if running.len() > 1 {
            out.push(format!("{} steps running at once", running.len()));
        }
        if let [idx] = running.as_slice() {
            let (before, after) = self.steps.split_at(*idx);
            if before.iter().any(|s| s.status != RunState::Completed)
                || after[1..].iter().any(|s| s.status != RunState::Pending)
            {
                out.push("running step is not the sequential frontier".to_string());
            }
            if self.status != RunState::Running {
                out.push(format!("a step is running but run is {}", self.status));
            }
        }

        if self.error.is_some() && self.status != RunState::Failed {
            out.push(format!("error present on a {} run", self.status));
        }

        out
    }
}

/// Body of a workflow creation request. Built once per submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub workflow_name: String,
    pub inputs: BTreeMap<String, String>,
}

impl RunRequest {
    pub fn new(workflow_name: impl Into<String>, inputs: BTreeMap<String, String>) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            inputs,
        }
    }
}

/// Response of the creation endpoints. `run_id` is checked by hand so a missing or
/// non-string id maps to a malformed-response error rather than a generic decode error.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RunCreated {
    #[serde(default)]
    pub run_id: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefinitionVersion {
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub example: Option<String>,
}

fn default_required() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub name: String,
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub agent: String,
    /// Input template, resolved server-side.
    #[serde(default)]
    pub input: String,
}

/// Declared shape of a workflow: its inputs, agents and steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDefinition {
    pub version: DefinitionVersion,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<InputDescriptor>,
    #[serde(default)]
    pub agents: Vec<AgentDescriptor>,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl RunDefinition {
    /// Display name for a step id, falling back to the id itself.
    pub fn step_label<'a>(&'a self, step_id: &'a str) -> &'a str {
        self.steps
            .iter()
            .find(|s| s.id == step_id)
            .and_then(|s| s.name.as_deref())
            .unwrap_or(step_id)
    }
}

/// Lifecycle of a `RunMonitor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorPhase {
    Idle,
    Starting,
    Polling,
    Terminal,
}

/// Error as surfaced to consumers: a stable kind plus a readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&MonitorError> for ReportedError {
    fn from(err: &MonitorError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// State delivered to subscribers on every monitor transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub phase: MonitorPhase,
    pub status: Option<RunStatus>,
    pub error: Option<ReportedError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(default)]
    pub timestamp_utc: String,
    pub base_url: String,
    pub variant: RunVariant,
    #[serde(default)]
    pub run_id: Option<RunId>,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    pub updates: u64,
    #[serde(default)]
    pub status: Option<RunStatus>,
    #[serde(default)]
    pub error: Option<ReportedError>,
}
