//! Text summary builder for CLI output.
//!
//! Pure formatting of monitor snapshots and workflow definitions into lines.

use crate::model::{MonitorPhase, MonitorSnapshot, RunDefinition};
use std::collections::BTreeMap;

/// Pre-formatted lines for text output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Render a snapshot. The definition, when known, supplies human step names.
pub(crate) fn build_text_summary(
    snapshot: &MonitorSnapshot,
    definition: Option<&RunDefinition>,
) -> TextSummary {
    let mut lines = Vec::new();

    match (&snapshot.status, snapshot.phase) {
        (None, MonitorPhase::Starting) => lines.push("Starting run...".to_string()),
        (None, MonitorPhase::Polling) => {
            lines.push("Run accepted, waiting for status...".to_string())
        }
        (None, _) => lines.push("Status: idle".to_string()),
        (Some(status), _) => {
            let (done, total) = status.progress();
            let current = status.current_step.as_deref().unwrap_or("none");
            let current = definition.map_or(current, |d| d.step_label(current));
            lines.push(format!(
                "Run {}: {} ({done}/{total} steps) current step: {current}",
                status.run_id, status.status
            ));

            for step in &status.steps {
                let label = definition.map_or(step.id.as_str(), |d| d.step_label(&step.id));
                lines.push(format!("  [{}] {} ({})", step.status, label, step.agent));
                lines.push(format!(
                    "      input:  {}",
                    step.input.as_deref().unwrap_or("pending")
                ));
                lines.push(format!(
                    "      output: {}",
                    step.output.as_deref().unwrap_or("waiting for agent output...")
                ));
            }

            if let Some(err) = status.error.as_deref() {
                lines.push(format!("Run error: {err}"));
            }
        }
    }

    if let Some(err) = &snapshot.error {
        lines.push(format!("Error: {}", err.message));
    }

    TextSummary { lines }
}

/// Render a definition together with the inputs that would be submitted.
pub(crate) fn build_definition_summary(
    definition: &RunDefinition,
    inputs: &BTreeMap<String, String>,
) -> TextSummary {
    let mut lines = vec![format!("Workflow: {}", definition.name)];
    if !definition.description.trim().is_empty() {
        lines.push(definition.description.clone());
    }

    lines.push("Inputs:".to_string());
    for input in &definition.inputs {
        let optional = if input.required { "" } else { " (optional)" };
        let value = inputs.get(&input.name).map(String::as_str).unwrap_or("");
        lines.push(format!("  {}{optional} = {value:?}", input.name));
        if let Some(desc) = input.description.as_deref() {
            lines.push(format!("      {desc}"));
        }
    }

    lines.push("Steps:".to_string());
    for step in &definition.steps {
        lines.push(format!(
            "  {} ({})",
            step.name.as_deref().unwrap_or(&step.id),
            step.agent
        ));
    }

    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::snapshot;
    use crate::error::ErrorKind;
    use crate::model::{DefinitionVersion, ReportedError, RunState, StepDefinition};

    #[test]
    fn renders_steps_and_progress() {
        let snap = MonitorSnapshot {
            phase: MonitorPhase::Polling,
            status: Some(snapshot(
                "r1",
                RunState::Running,
                &[RunState::Completed, RunState::Running, RunState::Pending],
            )),
            error: None,
        };
        let def = RunDefinition {
            version: DefinitionVersion::Number(1),
            name: "demo_linear".into(),
            description: String::new(),
            inputs: vec![],
            agents: vec![],
            steps: vec![StepDefinition {
                id: "step-1".into(),
                name: Some("Design".into()),
                agent: "agent-1".into(),
                input: String::new(),
            }],
        };

        let lines = build_text_summary(&snap, Some(&def)).lines;
        assert_eq!(lines[0], "Run r1: running (1/3 steps) current step: Design");
        assert!(lines.contains(&"  [running] Design (agent-1)".to_string()));
        assert!(lines.contains(&"      output: output 0".to_string()));
        assert!(lines.contains(&"      input:  pending".to_string()));
    }

    #[test]
    fn renders_client_error_after_status() {
        let snap = MonitorSnapshot {
            phase: MonitorPhase::Idle,
            status: None,
            error: Some(ReportedError {
                kind: ErrorKind::SubmissionFailed,
                message: "run request failed (status 500)".into(),
            }),
        };
        let lines = build_text_summary(&snap, None).lines;
        assert_eq!(
            lines,
            vec![
                "Status: idle".to_string(),
                "Error: run request failed (status 500)".to_string()
            ]
        );
    }
}
