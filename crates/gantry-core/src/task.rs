//! Task definitions and agent demands.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// Execution hosts a task may run on.
pub mod runs_on {
    pub const AGENT: &str = "Agent";
    pub const SERVER: &str = "Server";
    pub const DEPLOYMENT_GROUP: &str = "DeploymentGroup";
}

/// A capability demand placed on the agent selected for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Demand {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Demand {
    pub fn exists(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn equals(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn is_agent_version(&self) -> bool {
        self.name
            .eq_ignore_ascii_case(crate::constants::AGENT_VERSION_DEMAND_NAME)
    }
}

/// Compares two dotted version strings segment by segment. Non-numeric
/// segments compare as strings.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ordering = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(xn), Ok(yn)) => xn.cmp(&yn),
                    _ => x.cmp(y),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

/// Removes every minimum-agent-version demand from the set and returns the
/// one with the highest version, if any. Jobs carry at most one.
pub fn max_agent_version_and_remove(demands: &mut Vec<Demand>) -> Option<Demand> {
    let mut max: Option<Demand> = None;
    demands.retain(|demand| {
        if demand.is_agent_version() {
            let replace = match (&max, &demand.value) {
                (None, _) => true,
                (Some(current), Some(candidate)) => {
                    let current_value = current.value.as_deref().unwrap_or("");
                    compare_versions(candidate, current_value) == Ordering::Greater
                }
                (Some(_), None) => false,
            };
            if replace {
                max = Some(demand.clone());
            }
            false
        } else {
            true
        }
    });
    max
}

/// An input declared by a task definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInputDefinition {
    pub name: String,
    #[serde(rename = "type", default)]
    pub input_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
}

/// A task available for use within pipelines, resolved from the task store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    #[serde(default, skip_serializing_if = "Uuid::is_nil")]
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runs_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub demands: Vec<Demand>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub satisfies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_agent_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<TaskInputDefinition>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

impl TaskDefinition {
    pub fn runs_on_agent(&self) -> bool {
        self.runs_on.iter().any(|r| r.eq_ignore_ascii_case(runs_on::AGENT))
    }

    pub fn runs_on_server(&self) -> bool {
        self.runs_on
            .iter()
            .any(|r| r.eq_ignore_ascii_case(runs_on::SERVER))
    }

    /// Merges this task's minimum agent version with a previously computed
    /// one, keeping the higher.
    pub fn merge_minimum_agent_version(&self, current: Option<&str>) -> Option<String> {
        match (self.minimum_agent_version.as_deref(), current) {
            (None, None) => None,
            (Some(mine), None) => Some(mine.to_string()),
            (None, Some(existing)) => Some(existing.to_string()),
            (Some(mine), Some(existing)) => {
                if compare_versions(mine, existing) == Ordering::Greater {
                    Some(mine.to_string())
                } else {
                    Some(existing.to_string())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("2.144.0", "2.9.3"), Ordering::Greater);
        assert_eq!(compare_versions("2.144.0", "2.144.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.0", "1.0.1"), Ordering::Less);
    }

    #[test]
    fn test_max_agent_version_and_remove() {
        let mut demands = vec![
            Demand::exists("docker"),
            Demand::equals("Agent.Version", "2.100.0"),
            Demand::equals("agent.version", "2.144.0"),
            Demand::equals("node", "18"),
        ];

        let max = max_agent_version_and_remove(&mut demands).unwrap();
        assert_eq!(max.value.as_deref(), Some("2.144.0"));
        assert_eq!(demands.len(), 2);
        assert!(demands.iter().all(|d| !d.is_agent_version()));
    }
}
