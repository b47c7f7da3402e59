//! The job-request message dispatched to agents.

use crate::ids::{JobId, PlanId, TimelineId};
use crate::job::WorkspaceOptions;
use crate::resources::{ContainerResource, RepositoryResource, SecureFile, ServiceEndpoint};
use crate::step::Step;
use crate::variables::VariableValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Reference to the orchestration plan a job belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReference {
    pub plan_id: PlanId,
    /// Plan kind, e.g. `Build` or `Release`. Drives repository handling in
    /// the legacy translator.
    #[serde(default)]
    pub plan_type: String,
}

/// Reference to the timeline receiving this job's records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineReference {
    pub id: TimelineId,
}

/// How a mask hint matches secret content in log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MaskType {
    Variable,
    Regex,
}

/// A value or pattern the agent must mask in any output it ships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskHint {
    #[serde(rename = "type")]
    pub mask_type: MaskType,
    pub value: String,
}

/// The typed resources shipped with a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResources {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<ServiceEndpoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secure_files: Vec<SecureFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<RepositoryResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerResource>,
}

/// The pipeline-model job request: ordered steps plus typed resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentJobRequestMessage {
    pub plan: PlanReference,
    pub timeline: TimelineReference,
    pub job_id: JobId,
    #[serde(default)]
    pub job_name: String,
    #[serde(default)]
    pub job_display_name: String,
    #[serde(default)]
    pub request_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_container: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub job_sidecar_containers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, VariableValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mask_hints: Vec<MaskHint>,
    #[serde(default)]
    pub resources: JobResources,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<WorkspaceOptions>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,
}

impl AgentJobRequestMessage {
    /// Reads a variable value, case-insensitively.
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.value.as_deref())
    }

    /// Sets a variable only when it is currently absent or empty.
    pub fn set_variable_if_unset(&mut self, name: &str, value: Option<String>) {
        let current = self.variable(name);
        if current.is_none_or(str::is_empty) {
            let key = self
                .variables
                .keys()
                .find(|k| k.eq_ignore_ascii_case(name))
                .cloned()
                .unwrap_or_else(|| name.to_string());
            self.variables.insert(
                key,
                VariableValue {
                    value,
                    is_secret: false,
                },
            );
        }
    }
}
