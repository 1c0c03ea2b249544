//! Workflow definition loading and input collection.

use crate::engine::RunBackend;
use crate::error::{MonitorError, Result};
use crate::model::{RunDefinition, RunRequest};
use std::collections::BTreeMap;
use tracing::info;

pub async fn load_definition(backend: &dyn RunBackend, name: &str) -> Result<RunDefinition> {
    let definition = backend.fetch_definition(name).await?;
    info!(
        name: "definition.loaded",
        workflow = %definition.name,
        inputs = definition.inputs.len(),
        steps = definition.steps.len(),
        "workflow definition loaded"
    );
    Ok(definition)
}

/// Every declared input mapped to its example value, or empty when it has none.
pub fn default_inputs(definition: &RunDefinition) -> BTreeMap<String, String> {
    definition
        .inputs
        .iter()
        .map(|i| (i.name.clone(), i.example.clone().unwrap_or_default()))
        .collect()
}

/// Apply user-supplied values on top of the defaults. Names the definition does not
/// declare are rejected.
pub fn merge_inputs(
    mut inputs: BTreeMap<String, String>,
    overrides: impl IntoIterator<Item = (String, String)>,
) -> Result<BTreeMap<String, String>> {
    for (name, value) in overrides {
        match inputs.get_mut(&name) {
            Some(slot) => *slot = value,
            None => {
                return Err(MonitorError::invalid_input(format!(
                    "unknown input {name:?}"
                )))
            }
        }
    }
    Ok(inputs)
}

/// Check required inputs are present and non-blank.
pub fn validate_inputs(
    definition: &RunDefinition,
    inputs: &BTreeMap<String, String>,
) -> Result<()> {
    let missing: Vec<&str> = definition
        .inputs
        .iter()
        .filter(|i| i.required)
        .filter(|i| inputs.get(&i.name).map_or(true, |v| v.trim().is_empty()))
        .map(|i| i.name.as_str())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(MonitorError::invalid_input(format!(
            "missing required input: {}",
            missing.join(", ")
        )))
    }
}

pub fn build_request(
    definition: &RunDefinition,
    inputs: BTreeMap<String, String>,
) -> Result<RunRequest> {
    validate_inputs(definition, &inputs)?;
    Ok(RunRequest::new(definition.name.clone(), inputs))
}

/// Parse a `KEY=VALUE` argument.
pub fn parse_assignment(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::ScriptedBackend;
    use crate::error::ErrorKind;
    use crate::model::{DefinitionVersion, InputDescriptor};

    fn definition() -> RunDefinition {
        RunDefinition {
            version: DefinitionVersion::Text("1".into()),
            name: "demo_linear".into(),
            description: "Plan, design, build".into(),
            inputs: vec![
                InputDescriptor {
                    name: "goal".into(),
                    description: Some("What to build".into()),
                    required: true,
                    example: Some("a landing page".into()),
                },
                InputDescriptor {
                    name: "audience".into(),
                    description: None,
                    required: true,
                    example: None,
                },
                InputDescriptor {
                    name: "tone".into(),
                    description: None,
                    required: false,
                    example: None,
                },
            ],
            agents: vec![],
            steps: vec![],
        }
    }

    #[test]
    fn defaults_use_examples_or_empty() {
        let d = default_inputs(&definition());
        assert_eq!(d["goal"], "a landing page");
        assert_eq!(d["audience"], "");
        assert_eq!(d["tone"], "");
        assert_eq!(d.len(), 3);
    }

    #[test]
    fn required_inputs_must_be_filled() {
        let def = definition();
        let err = build_request(&def, default_inputs(&def)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("audience"));
        assert!(!err.to_string().contains("tone"));

        let inputs = merge_inputs(
            default_inputs(&def),
            [("audience".to_string(), "founders".to_string())],
        )
        .unwrap();
        let req = build_request(&def, inputs).unwrap();
        assert_eq!(req.workflow_name, "demo_linear");
        assert_eq!(req.inputs["audience"], "founders");
        assert_eq!(req.inputs["goal"], "a landing page");
    }

    #[test]
    fn unknown_override_is_rejected() {
        let err = merge_inputs(
            default_inputs(&definition()),
            [("colour".to_string(), "blue".to_string())],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn assignments_split_on_first_equals() {
        assert_eq!(
            parse_assignment("goal=a=b").unwrap(),
            ("goal".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_assignment("goal=").unwrap(),
            ("goal".to_string(), String::new())
        );
        assert!(parse_assignment("=x").is_err());
        assert!(parse_assignment("goal").is_err());
    }

    #[tokio::test]
    async fn load_reports_definition_failure() {
        let backend = ScriptedBackend::new();
        let err = load_definition(&backend, "missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DefinitionFailed);

        backend.set_definition("demo_linear", Ok(definition()));
        let def = load_definition(&backend, "demo_linear").await.unwrap();
        assert_eq!(def.inputs.len(), 3);
    }
}
