//! The materialized job model produced by phase expansion.

use crate::ids::JobId;
use crate::step::Step;
use crate::target::PhaseTarget;
use crate::task::Demand;
use crate::variables::Variable;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Options controlling how an agent manages the job workspace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceOptions {
    /// One of the [`crate::constants::workspace_clean`] values, or unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean: Option<String>,
}

/// A single runnable job: the output of expanding one phase configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub sidecar_containers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub continue_on_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_in_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_timeout_in_minutes: Option<u32>,
    /// Snapshot of the resolved target; queue references are fixed up to
    /// stable `{id, name}` pairs before dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PhaseTarget>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub demands: Vec<Demand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<WorkspaceOptions>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<Variable>,
}

impl Job {
    /// Adds a demand unless an identical one is already present.
    pub fn add_demand(&mut self, demand: Demand) {
        if !self.demands.contains(&demand) {
            self.demands.push(demand);
        }
    }
}

/// Identity of a job within a phase attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInstance {
    pub name: String,
    #[serde(default = "default_attempt")]
    pub attempt: u32,
}

fn default_attempt() -> u32 {
    1
}

impl JobInstance {
    pub fn new(name: impl Into<String>, attempt: u32) -> Self {
        Self {
            name: name.into(),
            attempt: attempt.max(1),
        }
    }
}
