//! Well-known names, values, and limits shared with the orchestration server
//! and agents. These values are interop contract; do not change them.

use uuid::Uuid;

/// Reference name used for nodes the user did not name.
pub const DEFAULT_JOB_NAME: &str = "__default";

/// Display-name prefix for generated jobs ("Job1", "Job2", ...).
pub const DEFAULT_JOB_DISPLAY_NAME: &str = "Job";

pub const DEFAULT_JOB_TIMEOUT_MINUTES: u32 = 60;
pub const DEFAULT_JOB_CANCEL_TIMEOUT_MINUTES: u32 = 5;

/// Default ceiling on the number of jobs a single phase may expand into.
pub const DEFAULT_MAX_JOB_EXPANSION: usize = 100;

pub const MAX_NODE_NAME_LENGTH: usize = 100;

/// Repository alias for the pipeline's own source repository.
pub const SELF_ALIAS: &str = "self";

/// Repository alias indicating sources should not be synced.
pub const NONE_ALIAS: &str = "none";

/// Repository alias used by designer (non-YAML) builds.
pub const DESIGNER_REPO_ALIAS: &str = "__designer_repo";

pub const AGENT_VERSION_DEMAND_NAME: &str = "Agent.Version";

/// The well-known checkout task.
pub mod checkout_task {
    use super::Uuid;

    pub const ID: Uuid = Uuid::from_u128(0x6d15af64_176c_496d_b583_fd2ae21d4df4);
    pub const NAME: &str = "Checkout";
    pub const FRIENDLY_NAME: &str = "Get sources";
    pub const VERSION: &str = "1.0.0";
}

/// Input names understood by the checkout task.
pub mod checkout_inputs {
    pub const REPOSITORY: &str = "repository";
    pub const CLEAN: &str = "clean";
    pub const SUBMODULES: &str = "submodules";
    pub const LFS: &str = "lfs";
    pub const FETCH_DEPTH: &str = "fetchDepth";
    pub const PERSIST_CREDENTIALS: &str = "persistCredentials";
    pub const PATH: &str = "path";

    pub mod submodule_options {
        pub const RECURSIVE: &str = "recursive";
        pub const TRUE: &str = "true";
    }
}

/// Workspace clean option values carried on [`crate::job::WorkspaceOptions`].
pub mod workspace_clean {
    pub const OUTPUTS: &str = "outputs";
    pub const RESOURCES: &str = "resources";
    pub const ALL: &str = "all";
}

/// Variable names produced during job expansion and consumed downstream by
/// task execution.
pub mod well_known_variables {
    pub const JOB_ID: &str = "system.jobId";
    pub const JOB_NAME: &str = "system.jobName";
    pub const JOB_DISPLAY_NAME: &str = "system.jobDisplayName";
    pub const TASK_INSTANCE_ID: &str = "system.taskInstanceId";
    pub const TASK_DISPLAY_NAME: &str = "system.taskDisplayName";
    pub const TASK_INSTANCE_NAME: &str = "system.taskInstanceName";
    pub const PARALLEL_EXECUTION_TYPE: &str = "system.parallelExecutionType";
    pub const SERVER_TYPE: &str = "system.servertype";
    pub const ACCESS_TOKEN_SCOPE: &str = "system.accessTokenScope";
    pub const JOB_PARALLELISM_TAG: &str = "system.jobParallelismTag";
}

/// Values for the `system.parallelExecutionType` variable.
pub mod parallel_execution_type {
    pub const MULTI_CONFIGURATION: &str = "MultiConfiguration";
    pub const MULTI_MACHINE: &str = "MultiMachine";
}

/// Service endpoint names with special meaning to agents.
pub mod well_known_endpoints {
    pub const SYSTEM_VSS_CONNECTION: &str = "SystemVssConnection";
}
