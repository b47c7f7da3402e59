//! The legacy (flat) job-request message model.

use gantry_core::ids::JobId;
use gantry_core::messages::{MaskHint, PlanReference, TimelineReference};
use gantry_core::resources::{SecureFile, ServiceEndpoint};
use gantry_core::variables::VariableValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Boolean strings as the legacy wire writes them. Casing matters to old
/// agents.
pub const TRUE_STRING: &str = "True";
pub const FALSE_STRING: &str = "False";

/// Repository endpoint types as the legacy wire names them.
pub mod legacy_repository_types {
    pub const TFS_VERSION_CONTROL: &str = "TfsVersionControl";
    pub const TFS_GIT: &str = "TfsGit";
    pub const GIT: &str = "Git";
    pub const GITHUB: &str = "GitHub";
    pub const GITHUB_ENTERPRISE: &str = "GitHubEnterprise";
    pub const BITBUCKET: &str = "Bitbucket";
    pub const SVN: &str = "Svn";

    pub const ALL: &[&str] = &[
        TFS_VERSION_CONTROL,
        TFS_GIT,
        GIT,
        GITHUB,
        GITHUB_ENTERPRISE,
        BITBUCKET,
        SVN,
    ];
}

/// Keys of the legacy repository endpoint's `data` dictionary.
pub mod endpoint_data {
    pub const REPOSITORY_ID: &str = "repositoryId";
    pub const CLEAN: &str = "clean";
    pub const CHECKOUT_SUBMODULES: &str = "checkoutSubmodules";
    pub const CHECKOUT_NESTED_SUBMODULES: &str = "checkoutNestedSubmodules";
    pub const FETCH_DEPTH: &str = "fetchDepth";
    pub const GIT_LFS_SUPPORT: &str = "gitLfsSupport";
    pub const SKIP_SYNC_SOURCE: &str = "skipSyncSource";
    pub const CLEAN_OPTIONS: &str = "cleanOptions";
    pub const TFVC_WORKSPACE_MAPPING: &str = "tfvcWorkspaceMapping";
    pub const SVN_WORKSPACE_MAPPING: &str = "svnWorkspaceMapping";
    pub const ACCEPT_UNTRUSTED_CERTS: &str = "acceptUntrustedCerts";
    pub const REALM_NAME: &str = "realmName";
    pub const ONPREM_TFS_GIT: &str = "onpremtfsgit";
    pub const ROOT_FOLDER: &str = "rootFolder";
}

/// `cleanOptions` values on the legacy wire.
pub mod clean_options {
    pub const SOURCE: &str = "0";
    pub const SOURCE_AND_OUTPUT_DIR: &str = "1";
    pub const SOURCE_DIR: &str = "2";
    pub const ALL_BUILD_DIR: &str = "3";
}

/// A single mapping entry inside the TFVC workspace-mapping JSON blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyMappingDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

/// The TFVC workspace mapping embedded as JSON inside endpoint data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyBuildWorkspace {
    #[serde(default)]
    pub mappings: Vec<LegacyMappingDetails>,
}

/// A single mapping entry inside the SVN workspace-mapping JSON blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySvnMappingDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default)]
    pub depth: i32,
    #[serde(default)]
    pub ignore_externals: bool,
}

/// The SVN workspace mapping embedded as JSON inside endpoint data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySvnWorkspace {
    #[serde(default)]
    pub mappings: Vec<LegacySvnMappingDetails>,
}

/// A task as the legacy message carries it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInstance {
    /// Instance id, unique within the job.
    #[serde(default, skip_serializing_if = "Uuid::is_nil")]
    pub instance_id: Uuid,
    #[serde(default, skip_serializing_if = "Uuid::is_nil")]
    pub task_id: Uuid,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// The step reference name on the pipeline side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub continue_on_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_in_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub inputs: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub environment: IndexMap<String, String>,
}

fn default_true() -> bool {
    true
}

/// The flat environment block of a legacy message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEnvironment {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<ServiceEndpoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secure_files: Vec<SecureFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mask_hints: Vec<MaskHint>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, VariableValue>,
}

impl JobEnvironment {
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.value.as_deref())
    }
}

/// The legacy job-request message: a task list plus an endpoint-based
/// environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyAgentJobRequestMessage {
    pub plan: PlanReference,
    pub timeline: TimelineReference,
    pub job_id: JobId,
    /// Human-readable job name (the pipeline message's display name).
    #[serde(default)]
    pub job_name: String,
    /// Stable reference name (the pipeline message's job name).
    #[serde(default)]
    pub job_ref_name: String,
    #[serde(default)]
    pub request_id: i64,
    #[serde(default)]
    pub environment: JobEnvironment,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskInstance>,
}
