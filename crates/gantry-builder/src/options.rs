//! Build and expansion options.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Validation behavior for one `build` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOptions {
    /// Resolve referenced resources and error on anything unauthorized.
    #[serde(default)]
    pub validate_resources: bool,
    /// Require deferred expressions to resolve at build time.
    #[serde(default)]
    pub validate_expressions: bool,
    /// Merge implicit task demands into the phase target demands.
    #[serde(default)]
    pub rollup_step_demands: bool,
    /// Permit queue targets with no queue; the hosting environment supplies
    /// one later.
    #[serde(default)]
    pub allow_empty_queue_target: bool,
    #[serde(default)]
    pub allow_hyphen_names: bool,
    #[serde(default)]
    pub enable_resource_expressions: bool,
}

impl BuildOptions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn full() -> Self {
        Self {
            validate_resources: true,
            validate_expressions: true,
            rollup_step_demands: true,
            allow_empty_queue_target: false,
            allow_hyphen_names: false,
            enable_resource_expressions: false,
        }
    }
}

/// Limits and policies enforced during expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOptions {
    /// Hard ceiling on the number of jobs one phase may expand into.
    #[serde(default = "default_max_job_expansion")]
    pub max_job_expansion: usize,
    /// Hosting-enforced ceiling on requested slice concurrency. Takes
    /// precedence over the user's `maxConcurrency` request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallelism: Option<i64>,
    /// Rename illegal configuration names instead of merely warning.
    #[serde(default)]
    pub enforce_legal_node_names: bool,
    #[serde(default)]
    pub allow_hyphen_names: bool,
    #[serde(default)]
    pub restrict_secrets: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_token_scope: Option<String>,
    #[serde(default)]
    pub enable_resource_expressions: bool,
}

fn default_max_job_expansion() -> usize {
    gantry_core::constants::DEFAULT_MAX_JOB_EXPANSION
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_job_expansion: default_max_job_expansion(),
            max_parallelism: None,
            enforce_legal_node_names: false,
            allow_hyphen_names: false,
            restrict_secrets: false,
            system_token_scope: None,
            enable_resource_expressions: false,
        }
    }
}

/// Restricts an expansion to specific configurations, carrying an explicit
/// attempt number per configuration. Used to re-run only failed jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobExpansionOptions {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub configurations: IndexMap<String, u32>,
}

impl JobExpansionOptions {
    pub fn single(configuration: impl Into<String>, attempt: u32) -> Self {
        let mut configurations = IndexMap::new();
        configurations.insert(configuration.into(), attempt);
        Self { configurations }
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    /// Whether the configuration survives this filter. An empty filter
    /// includes everything.
    pub fn is_included(&self, configuration: &str) -> bool {
        self.configurations.is_empty()
            || self
                .configurations
                .keys()
                .any(|k| k.eq_ignore_ascii_case(configuration))
    }

    pub fn attempt_for(&self, configuration: &str) -> Option<u32> {
        self.configurations
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(configuration))
            .map(|(_, attempt)| *attempt)
    }
}
