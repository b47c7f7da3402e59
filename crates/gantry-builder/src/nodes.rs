//! The pipeline graph model: stages containing phases.

use gantry_core::constants;
use gantry_core::expression::ExpressionValue;
use gantry_core::resources::VariableGroupReference;
use gantry_core::step::Step;
use gantry_core::target::PhaseTarget;
use gantry_core::variables::Variable;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Fields shared by every phase node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseCommon {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Evaluated at runtime once all dependencies are satisfied; empty means
    /// the default "previous nodes succeeded" condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_error: Option<ExpressionValue<bool>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PhaseTarget>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<Variable>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variable_groups: Vec<VariableGroupReference>,
}

/// A phase whose steps run as-is on its target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    #[serde(flatten)]
    pub common: PhaseCommon,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,
}

/// A phase whose job set is produced by evaluating a strategy template.
/// The steps act as a template for each expanded job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFactory {
    #[serde(flatten)]
    pub common: PhaseCommon,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,
    /// Strategy template token; interpreted by the host's strategy
    /// evaluator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_display_name: Option<ExpressionValue<String>>,
    /// Target template token; evaluated per configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_target: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_timeout: Option<ExpressionValue<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_cancel_timeout: Option<ExpressionValue<u32>>,
}

/// A node in a stage's phase graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PhaseNode {
    Phase(Phase),
    JobFactory(JobFactory),
}

impl PhaseNode {
    pub fn common(&self) -> &PhaseCommon {
        match self {
            PhaseNode::Phase(phase) => &phase.common,
            PhaseNode::JobFactory(factory) => &factory.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut PhaseCommon {
        match self {
            PhaseNode::Phase(phase) => &mut phase.common,
            PhaseNode::JobFactory(factory) => &mut factory.common,
        }
    }

    pub fn steps(&self) -> &[Step] {
        match self {
            PhaseNode::Phase(phase) => &phase.steps,
            PhaseNode::JobFactory(factory) => &factory.steps,
        }
    }

    pub fn steps_mut(&mut self) -> &mut Vec<Step> {
        match self {
            PhaseNode::Phase(phase) => &mut phase.steps,
            PhaseNode::JobFactory(factory) => &mut factory.steps,
        }
    }
}

impl<'de> Deserialize<'de> for PhaseNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        let object = raw
            .as_object()
            .ok_or_else(|| D::Error::custom("phase node must be an object"))?;

        // Documents written before the discriminator existed are phases.
        let kind = object
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("type"))
            .and_then(|(_, v)| v.as_str())
            .unwrap_or("phase")
            .to_string();

        if kind.eq_ignore_ascii_case("phase") {
            Ok(PhaseNode::Phase(
                serde_json::from_value(raw).map_err(D::Error::custom)?,
            ))
        } else if kind.eq_ignore_ascii_case("jobFactory") {
            Ok(PhaseNode::JobFactory(
                serde_json::from_value(raw).map_err(D::Error::custom)?,
            ))
        } else {
            Err(D::Error::custom(format!("unknown phase type '{kind}'")))
        }
    }
}

/// A stage: the outermost grouping of phases. Stages depend on stages the
/// same way phases depend on phases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<Variable>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variable_groups: Vec<VariableGroupReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<PhaseNode>,
}

impl Stage {
    pub fn new(name: impl Into<String>, phases: Vec<PhaseNode>) -> Self {
        Self {
            name: name.into(),
            phases,
            ..Stage::default()
        }
    }

    /// Wraps phases in the implicit default stage.
    pub fn implicit(phases: Vec<PhaseNode>) -> Self {
        Self::new(constants::DEFAULT_JOB_NAME, phases)
    }
}

/// A validated, resource-resolved pipeline ready for orchestration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineProcess {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<Stage>,
}

/// Produces the official display name for a node path. Occurrences of the
/// default node name are removed; an empty result falls back to the default
/// display-name prefix.
pub fn generate_display_name(tokens: &[&str]) -> String {
    let default_name = constants::DEFAULT_JOB_NAME;
    let parts: Vec<&str> = tokens
        .iter()
        .filter(|t| !t.trim().is_empty())
        .map(|t| {
            t.strip_prefix(default_name)
                .map(str::trim)
                .unwrap_or(t.trim())
        })
        .filter(|t| !t.is_empty())
        .collect();

    if parts.is_empty() {
        constants::DEFAULT_JOB_DISPLAY_NAME.to_string()
    } else {
        parts.join(" ")
    }
}

/// Display name for a phase node, optionally qualified by a configuration.
pub fn phase_display_name(phase: &PhaseCommon, configuration: Option<&str>) -> String {
    let base = phase.display_name.as_deref().unwrap_or(&phase.name);
    match configuration {
        Some(configuration) => generate_display_name(&[base, configuration]),
        None => generate_display_name(&[base]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_generate_display_name_strips_default() {
        assert_eq!(generate_display_name(&["__default", "shard1"]), "shard1");
        assert_eq!(generate_display_name(&["__default"]), "Job");
        assert_eq!(generate_display_name(&["Build", "linux"]), "Build linux");
    }

    #[test]
    fn test_untyped_phase_node_is_phase() {
        let node: PhaseNode = serde_json::from_str(r#"{"name":"build"}"#).unwrap();
        assert!(matches!(node, PhaseNode::Phase(_)));
    }

    #[test]
    fn test_job_factory_round_trip() {
        let node = PhaseNode::JobFactory(JobFactory {
            common: PhaseCommon {
                name: "test".to_string(),
                ..PhaseCommon::default()
            },
            ..JobFactory::default()
        });

        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "jobFactory");
        let back: PhaseNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }
}
