//! Phase execution targets.
//!
//! A phase runs its jobs against exactly one target kind: an agent queue,
//! an agent pool, the orchestration server itself, or a deployment group.
//! Targets here are plain data with an explicit `type` discriminator; the
//! expansion and validation operations over them live in the builder crate
//! and dispatch by `match`.

use crate::expression::ExpressionValue;
use crate::job::WorkspaceOptions;
use crate::resources::{AgentPoolReference, AgentQueueReference, EnvironmentReference};
use crate::task::{Demand, TaskDefinition};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Expansion settings for agent-queue phases that predate the strategy DSL:
/// either a matrix of named configurations or a sliced job count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelExecutionOptions {
    /// Configuration name to variable overrides, in authored order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix: Option<ExpressionValue<IndexMap<String, IndexMap<String, String>>>>,
    /// Number of slices to fan out to, 0 or less meaning "one per job".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<ExpressionValue<i64>>,
}

/// Settings shared by every target kind. Timeouts and continue-on-error are
/// expression values: literals known at build time, or expressions deferred
/// to the concrete job context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCommon {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_error: Option<ExpressionValue<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_in_minutes: Option<ExpressionValue<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_timeout_in_minutes: Option<ExpressionValue<u32>>,
}

/// Runs jobs on agents drawn from a queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentQueueTarget {
    #[serde(flatten)]
    pub common: TargetCommon,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<AgentQueueReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_specification: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ParallelExecutionOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<WorkspaceOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ExpressionValue<String>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub sidecar_containers: IndexMap<String, ExpressionValue<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub demands: Vec<Demand>,
}

impl AgentQueueTarget {
    /// True when the target contains no deferred expressions or macros and
    /// can therefore be validated at build time.
    pub fn is_literal(&self) -> bool {
        match &self.queue {
            Some(queue) => match &queue.name {
                Some(ExpressionValue::Expr(_)) => false,
                Some(ExpressionValue::Literal(literal)) => !crate::variables::is_macro(literal),
                None => true,
            },
            None => true,
        }
    }
}

/// Runs jobs on agents drawn directly from a pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPoolTarget {
    #[serde(flatten)]
    pub common: TargetCommon,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<AgentPoolReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub demands: Vec<Demand>,
}

/// Runs jobs on the orchestration server itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTarget {
    #[serde(flatten)]
    pub common: TargetCommon,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ParallelExecutionOptions>,
}

/// Runs jobs across the machines of a deployment group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentGroupTarget {
    #[serde(flatten)]
    pub common: TargetCommon,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub demands: Vec<Demand>,
}

/// The polymorphic execution target of a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PhaseTarget {
    Queue(AgentQueueTarget),
    Pool(AgentPoolTarget),
    Server(ServerTarget),
    DeploymentGroup(DeploymentGroupTarget),
}

impl Default for PhaseTarget {
    fn default() -> Self {
        PhaseTarget::Queue(AgentQueueTarget::default())
    }
}

impl PhaseTarget {
    /// Whether a task definition is allowed to run on this target kind.
    pub fn is_valid(&self, task: &TaskDefinition) -> bool {
        match self {
            PhaseTarget::Queue(_) | PhaseTarget::Pool(_) | PhaseTarget::DeploymentGroup(_) => {
                task.runs_on_agent()
            }
            PhaseTarget::Server(_) => task.runs_on_server(),
        }
    }

    pub fn demands(&self) -> &[Demand] {
        match self {
            PhaseTarget::Queue(target) => &target.demands,
            PhaseTarget::Pool(target) => &target.demands,
            PhaseTarget::DeploymentGroup(target) => &target.demands,
            PhaseTarget::Server(_) => &[],
        }
    }

    pub fn demands_mut(&mut self) -> Option<&mut Vec<Demand>> {
        match self {
            PhaseTarget::Queue(target) => Some(&mut target.demands),
            PhaseTarget::Pool(target) => Some(&mut target.demands),
            PhaseTarget::DeploymentGroup(target) => Some(&mut target.demands),
            PhaseTarget::Server(_) => None,
        }
    }

    pub fn as_queue(&self) -> Option<&AgentQueueTarget> {
        match self {
            PhaseTarget::Queue(target) => Some(target),
            _ => None,
        }
    }

    pub fn as_queue_mut(&mut self) -> Option<&mut AgentQueueTarget> {
        match self {
            PhaseTarget::Queue(target) => Some(target),
            _ => None,
        }
    }

    pub fn common(&self) -> &TargetCommon {
        match self {
            PhaseTarget::Queue(target) => &target.common,
            PhaseTarget::Pool(target) => &target.common,
            PhaseTarget::Server(target) => &target.common,
            PhaseTarget::DeploymentGroup(target) => &target.common,
        }
    }

    pub fn execution(&self) -> Option<&ParallelExecutionOptions> {
        match self {
            PhaseTarget::Queue(target) => target.execution.as_ref(),
            PhaseTarget::Server(target) => target.execution.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::runs_on;

    fn agent_task() -> TaskDefinition {
        TaskDefinition {
            runs_on: vec![runs_on::AGENT.to_string()],
            ..TaskDefinition::default()
        }
    }

    fn server_task() -> TaskDefinition {
        TaskDefinition {
            runs_on: vec![runs_on::SERVER.to_string()],
            ..TaskDefinition::default()
        }
    }

    #[test]
    fn test_target_task_compatibility() {
        let queue = PhaseTarget::default();
        assert!(queue.is_valid(&agent_task()));
        assert!(!queue.is_valid(&server_task()));

        let server = PhaseTarget::Server(ServerTarget::default());
        assert!(server.is_valid(&server_task()));
        assert!(!server.is_valid(&agent_task()));
    }

    #[test]
    fn test_queue_target_literal() {
        let mut target = AgentQueueTarget::default();
        assert!(target.is_literal());

        target.queue = Some(AgentQueueReference::by_name("hosted-linux"));
        assert!(target.is_literal());

        target.queue = Some(AgentQueueReference {
            id: 0,
            name: Some(ExpressionValue::expr("$[ variables.queue ]")),
        });
        assert!(!target.is_literal());

        target.queue = Some(AgentQueueReference::by_name("$(queueName)"));
        assert!(!target.is_literal());
    }

    #[test]
    fn test_discriminator_round_trip() {
        let target = PhaseTarget::Server(ServerTarget::default());
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["type"], "server");
        let back: PhaseTarget = serde_json::from_value(json).unwrap();
        assert_eq!(back, target);
    }
}
