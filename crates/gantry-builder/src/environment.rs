//! The build's output contract.

use crate::options::ExecutionOptions;
use crate::nodes::PipelineProcess;
use crate::validation::ValidationResult;
use gantry_core::resources::PipelineResources;
use gantry_core::variables::Variable;
use gantry_stores::Counter;
use serde::{Deserialize, Serialize};

fn default_process_type() -> String {
    "Pipeline".to_string()
}

fn default_version() -> i32 {
    1
}

fn is_default_version(version: &i32) -> bool {
    *version == default_version()
}

/// Everything the orchestration store needs to run the pipeline: authorized
/// resources, counters, and variables. Immutable once produced; empty
/// collections are omitted entirely from serialized output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineEnvironment {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub counters: Vec<Counter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ExecutionOptions>,
    #[serde(default = "default_process_type")]
    pub process_type: String,
    #[serde(default, skip_serializing_if = "PipelineResources::is_empty")]
    pub resources: PipelineResources,
    /// Applied after user variables downstream, so the system wins on any
    /// name collision.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system_variables: Vec<Variable>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_variables: Vec<Variable>,
    #[serde(default = "default_version", skip_serializing_if = "is_default_version")]
    pub version: i32,
}

impl Default for PipelineEnvironment {
    fn default() -> Self {
        Self {
            counters: Vec::new(),
            options: None,
            process_type: default_process_type(),
            resources: PipelineResources::new(),
            system_variables: Vec::new(),
            user_variables: Vec::new(),
            version: default_version(),
        }
    }
}

/// The result of one `build` call. Callers must check
/// `result.errors` before treating the process as runnable.
#[derive(Debug)]
pub struct PipelineBuildResult {
    pub environment: PipelineEnvironment,
    pub process: PipelineProcess,
    pub result: ValidationResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_collections_are_omitted() {
        let environment = PipelineEnvironment::default();
        let json = serde_json::to_value(&environment).unwrap();
        let object = json.as_object().unwrap();

        assert_eq!(object.get("processType").unwrap(), "Pipeline");
        assert!(!object.contains_key("counters"));
        assert!(!object.contains_key("resources"));
        assert!(!object.contains_key("systemVariables"));
        assert!(!object.contains_key("userVariables"));
    }
}
