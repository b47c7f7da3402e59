//! Bidirectional translation between the pipeline job-request message and
//! the legacy flat message.

use crate::legacy::{
    clean_options, endpoint_data, legacy_repository_types, JobEnvironment,
    LegacyAgentJobRequestMessage, LegacyBuildWorkspace, LegacyMappingDetails,
    LegacySvnMappingDetails, LegacySvnWorkspace, TaskInstance, FALSE_STRING, TRUE_STRING,
};
use gantry_core::constants::{self, checkout_inputs, checkout_task, workspace_clean};
use gantry_core::error::{Error, Result};
use gantry_core::messages::{AgentJobRequestMessage, MaskHint, MaskType};
use gantry_core::resources::{
    authorization_parameters, authorization_schemes, repository_properties, repository_types,
    EndpointAuthorization, RepositoryResource, ServiceEndpoint, ServiceEndpointReference,
    VersionInfo, WorkspaceMapping,
};
use gantry_core::expression::ExpressionValue;
use gantry_core::job::WorkspaceOptions;
use gantry_core::step::{Step, TaskStep, TaskStepDefinitionReference};
use uuid::Uuid;

const LEGACY_REPO_ALIAS: &str = "__legacy_repo_endpoint";
const BUILD_PLAN_TYPE: &str = "Build";

/// Converts a legacy message into the pipeline model. Used by a new agent
/// connected to an old server. For `Build` plans the repository service
/// endpoint is rewritten as a synthesized checkout step plus a repository
/// resource.
pub fn to_pipeline_message(legacy: &LegacyAgentJobRequestMessage) -> Result<AgentJobRequestMessage> {
    let mut message = AgentJobRequestMessage {
        plan: legacy.plan.clone(),
        timeline: legacy.timeline.clone(),
        job_id: legacy.job_id,
        job_name: legacy.job_ref_name.clone(),
        job_display_name: legacy.job_name.clone(),
        request_id: legacy.request_id,
        variables: legacy.environment.variables.clone(),
        mask_hints: legacy.environment.mask_hints.clone(),
        workspace: Some(WorkspaceOptions::default()),
        ..AgentJobRequestMessage::default()
    };

    message.resources.endpoints = legacy.environment.endpoints.clone();
    message.resources.secure_files = legacy.environment.secure_files.clone();
    message.steps = legacy
        .tasks
        .iter()
        .map(|task| Step::Task(task_step_from_instance(task)))
        .collect();

    if legacy.plan.plan_type.eq_ignore_ascii_case(BUILD_PLAN_TYPE)
        && let Some(endpoint) = find_legacy_repo_endpoint(&legacy.environment.endpoints)
    {
        let (checkout, repository, workspace) = synthesize_checkout(legacy, endpoint)?;
        message.steps.insert(0, Step::Task(checkout));
        message.resources.repositories.push(repository);
        message.workspace = Some(workspace);
    }

    Ok(message)
}

/// Repository id was added after early servers, so fall back to locating
/// the endpoint by its type.
fn find_legacy_repo_endpoint(endpoints: &[ServiceEndpoint]) -> Option<&ServiceEndpoint> {
    endpoints
        .iter()
        .find(|endpoint| endpoint.data_value(endpoint_data::REPOSITORY_ID).is_some())
        .or_else(|| {
            endpoints.iter().find(|endpoint| {
                legacy_repository_types::ALL
                    .iter()
                    .any(|t| endpoint.endpoint_type.eq_ignore_ascii_case(t))
            })
        })
}

fn synthesize_checkout(
    legacy: &LegacyAgentJobRequestMessage,
    endpoint: &ServiceEndpoint,
) -> Result<(TaskStep, RepositoryResource, WorkspaceOptions)> {
    let environment = &legacy.environment;

    let mut checkout = TaskStep {
        id: Uuid::new_v4(),
        name: "__system_checkout".to_string(),
        display_name: Some(checkout_task::FRIENDLY_NAME.to_string()),
        reference: Some(TaskStepDefinitionReference {
            id: checkout_task::ID,
            name: checkout_task::NAME.to_string(),
            version: checkout_task::VERSION.to_string(),
        }),
        ..TaskStep::default()
    };
    checkout.inputs.insert(
        checkout_inputs::REPOSITORY.to_string(),
        LEGACY_REPO_ALIAS.to_string(),
    );

    let mut repository = RepositoryResource::new(LEGACY_REPO_ALIAS);
    repository
        .properties
        .set(repository_properties::NAME, &endpoint.name);
    match endpoint.data_value(endpoint_data::REPOSITORY_ID) {
        Some(repository_id) if !repository_id.is_empty() => repository.set_id(repository_id),
        _ => repository.set_id(LEGACY_REPO_ALIAS),
    }
    repository.set_endpoint(&ServiceEndpointReference::by_name(endpoint.name.clone()));
    repository.set_type_name(&convert_legacy_source_type(&endpoint.endpoint_type)?);
    if let Some(url) = &endpoint.url {
        repository.set_url(url);
    }

    if let Some(version) = environment.variable("build.sourceVersion")
        && !version.is_empty()
    {
        repository.set_version(version);
    }
    if let Some(branch) = environment.variable("build.sourceBranch")
        && !branch.is_empty()
    {
        repository
            .properties
            .set(repository_properties::REF, &branch);
    }

    let mut version_info: Option<VersionInfo> = None;
    if let Some(author) = environment.variable("build.sourceVersionAuthor")
        && !author.is_empty()
    {
        version_info.get_or_insert_with(VersionInfo::default).author = Some(author.to_string());
    }
    if let Some(message) = environment.variable("build.sourceVersionMessage")
        && !message.is_empty()
    {
        version_info.get_or_insert_with(VersionInfo::default).message = Some(message.to_string());
    }
    if let Some(version_info) = &version_info {
        repository
            .properties
            .set(repository_properties::VERSION_INFO, version_info);
    }

    let repository_type = repository.type_name().unwrap_or_default();
    if repository_type == repository_types::TFVC {
        if let Some(shelveset) = environment.variable("build.sourceTfvcShelveset")
            && !shelveset.is_empty()
        {
            repository
                .properties
                .set(repository_properties::SHELVESET, &shelveset);
        }

        if let Some(mapping_json) = endpoint.data_value(endpoint_data::TFVC_WORKSPACE_MAPPING) {
            let legacy_mapping: LegacyBuildWorkspace = serde_json::from_str(mapping_json)?;
            let mappings: Vec<WorkspaceMapping> = legacy_mapping
                .mappings
                .iter()
                .map(|mapping| WorkspaceMapping {
                    server_path: mapping.server_path.clone(),
                    local_path: mapping.local_path.clone(),
                    exclude: mapping
                        .mapping_type
                        .as_deref()
                        .is_some_and(|t| t.eq_ignore_ascii_case("cloak")),
                    ..WorkspaceMapping::default()
                })
                .collect();
            repository
                .properties
                .set(repository_properties::MAPPINGS, &mappings);
        }
    } else if repository_type == repository_types::SVN
        && let Some(mapping_json) = endpoint.data_value(endpoint_data::SVN_WORKSPACE_MAPPING)
    {
        let legacy_mapping: LegacySvnWorkspace = serde_json::from_str(mapping_json)?;
        let mappings: Vec<WorkspaceMapping> = legacy_mapping
            .mappings
            .iter()
            .map(|mapping| WorkspaceMapping {
                server_path: mapping.server_path.clone(),
                local_path: mapping.local_path.clone(),
                depth: Some(mapping.depth),
                ignore_externals: mapping.ignore_externals,
                revision: mapping.revision.clone(),
                ..WorkspaceMapping::default()
            })
            .collect();
        repository
            .properties
            .set(repository_properties::MAPPINGS, &mappings);
    }

    // The checkout task defaults clean to false.
    let clean = endpoint.data_value(endpoint_data::CLEAN).unwrap_or_default();
    checkout.inputs.insert(
        checkout_inputs::CLEAN.to_string(),
        if clean.is_empty() {
            FALSE_STRING.to_string()
        } else {
            clean.to_string()
        },
    );

    if parse_bool(endpoint.data_value(endpoint_data::CHECKOUT_SUBMODULES)) {
        let submodules = if parse_bool(endpoint.data_value(endpoint_data::CHECKOUT_NESTED_SUBMODULES))
        {
            checkout_inputs::submodule_options::RECURSIVE
        } else {
            checkout_inputs::submodule_options::TRUE
        };
        checkout
            .inputs
            .insert(checkout_inputs::SUBMODULES.to_string(), submodules.to_string());
    }

    if let Some(fetch_depth) = endpoint.data_value(endpoint_data::FETCH_DEPTH) {
        checkout
            .inputs
            .insert(checkout_inputs::FETCH_DEPTH.to_string(), fetch_depth.to_string());
    }

    if let Some(lfs) = endpoint.data_value(endpoint_data::GIT_LFS_SUPPORT) {
        checkout
            .inputs
            .insert(checkout_inputs::LFS.to_string(), lfs.to_string());
    }

    if parse_bool(environment.variable("system.enableAccessToken")) {
        checkout.inputs.insert(
            checkout_inputs::PERSIST_CREDENTIALS.to_string(),
            TRUE_STRING.to_string(),
        );
    }

    // Workspace clean options apply only when the sources are cleaned.
    let mut workspace = WorkspaceOptions::default();
    if parse_bool(Some(clean)) {
        workspace.clean = match endpoint.data_value(endpoint_data::CLEAN_OPTIONS) {
            Some(clean_options::SOURCE_AND_OUTPUT_DIR) => {
                Some(workspace_clean::OUTPUTS.to_string())
            }
            Some(clean_options::SOURCE_DIR) => Some(workspace_clean::RESOURCES.to_string()),
            Some(clean_options::ALL_BUILD_DIR) => Some(workspace_clean::ALL.to_string()),
            _ => None,
        };
    }

    // Sources are skipped when build.syncSources says so, or when the
    // endpoint was flagged.
    let sync_sources = environment.variable("build.syncSources");
    if sync_sources.is_some_and(|v| !v.is_empty() && !parse_bool(Some(v))) {
        checkout.condition = Some(FALSE_STRING.to_string());
    } else if parse_bool(endpoint.data_value(endpoint_data::SKIP_SYNC_SOURCE)) {
        checkout.condition = Some(FALSE_STRING.to_string());
    }

    Ok((checkout, repository, workspace))
}

/// Converts a pipeline message into the legacy model. Used by a server
/// when the connected agent is an old version that does not understand the
/// pipeline contract. Features legacy agents cannot represent are rejected.
pub fn to_legacy_message(mut message: AgentJobRequestMessage) -> Result<LegacyAgentJobRequestMessage> {
    // Old agents can't handle containers.
    if let Some(container) = &message.job_container
        && !container.is_empty()
    {
        return Err(Error::NotSupported(container.clone()));
    }
    if !message.job_sidecar_containers.is_empty() {
        let keys: Vec<&str> = message
            .job_sidecar_containers
            .keys()
            .map(String::as_str)
            .collect();
        return Err(Error::NotSupported(keys.join(", ")));
    }

    // Old agents can't handle more than one repository.
    if message.resources.repositories.len() > 1 {
        let aliases: Vec<&str> = message
            .resources
            .repositories
            .iter()
            .map(|r| r.alias.as_str())
            .collect();
        return Err(Error::NotSupported(aliases.join(", ")));
    }

    // Old agents can't handle more than one checkout task.
    let checkout_count = message.steps.iter().filter(|s| s.is_checkout_task()).count();
    if checkout_count > 1 {
        return Err(Error::NotSupported(checkout_task::ID.to_string()));
    }

    // The checkout step is not a task on the legacy wire; it becomes
    // endpoint data instead.
    let mut tasks = Vec::new();
    for step in &message.steps {
        let Step::Task(task) = step else {
            return Err(Error::NotSupported(format!("step '{}'", step.name())));
        };

        if !task.is_checkout_task() {
            tasks.push(task_instance_from_step(task));
        }
    }

    // Legacy messages require every endpoint's name to equal its id; the
    // system connection and repository endpoints (nil id) are exempt.
    for endpoint in &mut message.resources.endpoints {
        if !endpoint
            .name
            .eq_ignore_ascii_case(constants::well_known_endpoints::SYSTEM_VSS_CONNECTION)
            && !endpoint.id.is_nil()
        {
            endpoint.name = endpoint.id.to_string();
        }
    }

    // Propagate secure-file download tickets into the mask hints.
    for secure_file in &message.resources.secure_files {
        if let Some(ticket) = &secure_file.ticket
            && !ticket.is_empty()
        {
            message.mask_hints.push(MaskHint {
                mask_type: MaskType::Regex,
                value: regex::escape(ticket),
            });
        }
    }

    if message.plan.plan_type.eq_ignore_ascii_case(BUILD_PLAN_TYPE)
        && let Some(repository) = message.resources.repositories.first().cloned()
    {
        let endpoint = build_legacy_repo_endpoint(&mut message, &repository)?;
        message.resources.endpoints.push(endpoint);
    }

    Ok(LegacyAgentJobRequestMessage {
        plan: message.plan,
        timeline: message.timeline,
        job_id: message.job_id,
        job_name: message.job_display_name,
        job_ref_name: message.job_name,
        request_id: message.request_id,
        environment: JobEnvironment {
            endpoints: message.resources.endpoints,
            secure_files: message.resources.secure_files,
            mask_hints: message.mask_hints,
            variables: message.variables,
        },
        tasks,
    })
}

fn build_legacy_repo_endpoint(
    message: &mut AgentJobRequestMessage,
    repository: &RepositoryResource,
) -> Result<ServiceEndpoint> {
    let mut endpoint = ServiceEndpoint {
        name: repository
            .properties
            .get(repository_properties::NAME)
            .unwrap_or_default(),
        endpoint_type: convert_to_legacy_source_type(
            &repository.type_name().unwrap_or_default(),
        )?,
        url: repository.url(),
        ..ServiceEndpoint::default()
    };

    if let Some(reference) = repository.endpoint() {
        let referenced = message
            .resources
            .endpoints
            .iter()
            .find(|candidate| {
                (candidate.id == reference.id && !candidate.id.is_nil())
                    || (candidate.id.is_nil()
                        && reference.id.is_nil()
                        && matches!(
                            &reference.name,
                            Some(ExpressionValue::Literal(name))
                                if candidate.name.eq_ignore_ascii_case(name)
                        ))
            })
            .ok_or_else(|| {
                Error::ResourceNotFound(format!(
                    "Service endpoint for repository '{}' not found",
                    repository.alias
                ))
            })?;

        endpoint.authorization = translate_authorization(referenced.authorization.as_ref());

        // Two settings carry over from the connection endpoint directly.
        if let Some(accept_untrusted) =
            referenced.data_value(endpoint_data::ACCEPT_UNTRUSTED_CERTS)
        {
            endpoint.set_data(
                endpoint_data::ACCEPT_UNTRUSTED_CERTS,
                Some(accept_untrusted.to_string()),
            );
        }
        if let Some(realm_name) = referenced.data_value(endpoint_data::REALM_NAME) {
            endpoint.set_data(endpoint_data::REALM_NAME, Some(realm_name.to_string()));
        }
    }

    endpoint.set_data(
        endpoint_data::REPOSITORY_ID,
        Some(repository.id().unwrap_or_default()),
    );

    // Default values in the old message format.
    endpoint.set_data(endpoint_data::CLEAN, Some(FALSE_STRING.to_string()));
    endpoint.set_data(
        endpoint_data::CHECKOUT_SUBMODULES,
        Some(FALSE_STRING.to_string()),
    );
    endpoint.set_data(
        endpoint_data::CHECKOUT_NESTED_SUBMODULES,
        Some(FALSE_STRING.to_string()),
    );
    endpoint.set_data(endpoint_data::FETCH_DEPTH, Some("0".to_string()));
    endpoint.set_data(endpoint_data::GIT_LFS_SUPPORT, Some(FALSE_STRING.to_string()));
    endpoint.set_data(
        endpoint_data::SKIP_SYNC_SOURCE,
        Some(FALSE_STRING.to_string()),
    );
    endpoint.set_data(
        endpoint_data::CLEAN_OPTIONS,
        Some(clean_options::SOURCE.to_string()),
    );
    // Old TFVC endpoints carried this, but nothing reads it.
    endpoint.set_data(endpoint_data::ROOT_FOLDER, None);

    let repository_type = repository.type_name().unwrap_or_default();
    if repository_type == repository_types::TFVC {
        if let Some(mappings) = repository
            .properties
            .get::<Vec<WorkspaceMapping>>(repository_properties::MAPPINGS)
        {
            let legacy_mapping = LegacyBuildWorkspace {
                mappings: mappings
                    .iter()
                    .map(|mapping| LegacyMappingDetails {
                        server_path: mapping.server_path.clone(),
                        local_path: mapping.local_path.clone(),
                        mapping_type: Some(
                            if mapping.exclude { "cloak" } else { "map" }.to_string(),
                        ),
                    })
                    .collect(),
            };
            endpoint.set_data(
                endpoint_data::TFVC_WORKSPACE_MAPPING,
                Some(serde_json::to_string(&legacy_mapping)?),
            );
        }
    } else if repository_type == repository_types::SVN {
        if let Some(mappings) = repository
            .properties
            .get::<Vec<WorkspaceMapping>>(repository_properties::MAPPINGS)
        {
            let legacy_mapping = LegacySvnWorkspace {
                mappings: mappings
                    .iter()
                    .map(|mapping| LegacySvnMappingDetails {
                        server_path: mapping.server_path.clone(),
                        local_path: mapping.local_path.clone(),
                        revision: mapping.revision.clone(),
                        depth: mapping.depth.unwrap_or_default(),
                        ignore_externals: mapping.ignore_externals,
                    })
                    .collect(),
            };
            endpoint.set_data(
                endpoint_data::SVN_WORKSPACE_MAPPING,
                Some(serde_json::to_string(&legacy_mapping)?),
            );
        }
    } else if repository_type == repository_types::GIT {
        let hosted = message
            .variable(constants::well_known_variables::SERVER_TYPE)
            .is_some_and(|v| v.eq_ignore_ascii_case("Hosted"));
        endpoint.set_data(
            endpoint_data::ONPREM_TFS_GIT,
            Some(if hosted { FALSE_STRING } else { TRUE_STRING }.to_string()),
        );
    }

    // Back-fill build.* variables from the repository when unset.
    message.set_variable_if_unset("build.repository.id", repository.id());
    message.set_variable_if_unset(
        "build.repository.name",
        repository.properties.get(repository_properties::NAME),
    );
    message.set_variable_if_unset("build.repository.uri", repository.url());

    let version_info: Option<VersionInfo> =
        repository.properties.get(repository_properties::VERSION_INFO);
    message.set_variable_if_unset(
        "build.sourceVersionAuthor",
        version_info.as_ref().and_then(|v| v.author.clone()),
    );
    message.set_variable_if_unset(
        "build.sourceVersionMessage",
        version_info.as_ref().and_then(|v| v.message.clone()),
    );
    message.set_variable_if_unset("build.sourceVersion", repository.version());
    message.set_variable_if_unset(
        "build.sourceBranch",
        repository.properties.get(repository_properties::REF),
    );
    if repository_type == repository_types::TFVC {
        let shelveset: Option<String> =
            repository.properties.get(repository_properties::SHELVESET);
        if shelveset.as_deref().is_some_and(|s| !s.is_empty()) {
            message.set_variable_if_unset("build.sourceTfvcShelveset", shelveset);
        }
    }

    // The checkout task's inputs override the defaults.
    let checkout = message.steps.iter().find_map(|step| match step {
        Step::Task(task) if task.is_checkout_task() => Some(task),
        _ => None,
    });

    if let Some(checkout) = checkout {
        match checkout.input(checkout_inputs::CLEAN) {
            Some(clean) if !clean.is_empty() => {
                endpoint.set_data(endpoint_data::CLEAN, Some(clean.to_string()));
            }
            _ => {
                endpoint.set_data(endpoint_data::CLEAN, Some(FALSE_STRING.to_string()));
            }
        }

        if let Some(submodules) = checkout.input(checkout_inputs::SUBMODULES)
            && !submodules.is_empty()
        {
            endpoint.set_data(
                endpoint_data::CHECKOUT_SUBMODULES,
                Some(TRUE_STRING.to_string()),
            );
            if submodules.eq_ignore_ascii_case(checkout_inputs::submodule_options::RECURSIVE) {
                endpoint.set_data(
                    endpoint_data::CHECKOUT_NESTED_SUBMODULES,
                    Some(TRUE_STRING.to_string()),
                );
            }
        }

        if let Some(fetch_depth) = checkout.input(checkout_inputs::FETCH_DEPTH)
            && !fetch_depth.is_empty()
        {
            endpoint.set_data(endpoint_data::FETCH_DEPTH, Some(fetch_depth.to_string()));
        }

        if let Some(lfs) = checkout.input(checkout_inputs::LFS)
            && !lfs.is_empty()
        {
            endpoint.set_data(endpoint_data::GIT_LFS_SUPPORT, Some(lfs.to_string()));
        }

        // Skip sync sources when checking out "none", or when a designer
        // checkout was disabled outright.
        let checkout_repository = checkout.input(checkout_inputs::REPOSITORY).unwrap_or_default();
        if checkout_repository.eq_ignore_ascii_case(constants::NONE_ALIAS) {
            endpoint.set_data(
                endpoint_data::SKIP_SYNC_SOURCE,
                Some(TRUE_STRING.to_string()),
            );
        } else if checkout_repository.eq_ignore_ascii_case(constants::DESIGNER_REPO_ALIAS)
            && checkout.condition.as_deref() == Some(FALSE_STRING)
        {
            endpoint.set_data(
                endpoint_data::SKIP_SYNC_SOURCE,
                Some(TRUE_STRING.to_string()),
            );
        }
    }

    // Workspace clean options.
    let clean_option = match message.workspace.as_ref().and_then(|w| w.clean.as_deref()) {
        Some(value) if value.eq_ignore_ascii_case(workspace_clean::OUTPUTS) => {
            clean_options::SOURCE_AND_OUTPUT_DIR
        }
        Some(value) if value.eq_ignore_ascii_case(workspace_clean::RESOURCES) => {
            clean_options::SOURCE_DIR
        }
        Some(value) if value.eq_ignore_ascii_case(workspace_clean::ALL) => {
            clean_options::ALL_BUILD_DIR
        }
        _ => clean_options::SOURCE,
    };
    endpoint.set_data(endpoint_data::CLEAN_OPTIONS, Some(clean_option.to_string()));

    Ok(endpoint)
}

/// Token-based authorization schemes are translated into username/password
/// pairs with fixed sentinel values understood by legacy agents. The
/// sentinels are meaningful to the receiving end; do not change them.
fn translate_authorization(
    authorization: Option<&EndpointAuthorization>,
) -> Option<EndpointAuthorization> {
    let authorization = authorization?;

    if authorization.scheme == authorization_schemes::TOKEN {
        if let Some(access_token) = authorization.parameter(authorization_parameters::ACCESS_TOKEN)
        {
            return Some(username_password("x-access-token", access_token));
        }
        if let Some(api_token) = authorization.parameter(authorization_parameters::API_TOKEN) {
            return Some(username_password(api_token, "x-oauth-basic"));
        }
        // A token scheme without its token cannot be represented.
        return None;
    }

    if authorization.scheme == authorization_schemes::PERSONAL_ACCESS_TOKEN {
        return authorization
            .parameter(authorization_parameters::ACCESS_TOKEN)
            .map(|access_token| username_password("pat", access_token));
    }

    Some(authorization.clone())
}

fn username_password(username: &str, password: &str) -> EndpointAuthorization {
    let mut parameters = indexmap::IndexMap::new();
    parameters.insert(
        authorization_parameters::USERNAME.to_string(),
        username.to_string(),
    );
    parameters.insert(
        authorization_parameters::PASSWORD.to_string(),
        password.to_string(),
    );
    EndpointAuthorization {
        scheme: authorization_schemes::USERNAME_PASSWORD.to_string(),
        parameters,
    }
}

fn task_step_from_instance(task: &TaskInstance) -> TaskStep {
    TaskStep {
        id: task.instance_id,
        name: task.ref_name.clone().unwrap_or_default(),
        display_name: task.display_name.clone(),
        enabled: task.enabled,
        condition: task.condition.clone(),
        continue_on_error: task.continue_on_error,
        timeout_in_minutes: task.timeout_in_minutes,
        inputs: task.inputs.clone(),
        environment: task.environment.clone(),
        reference: Some(TaskStepDefinitionReference {
            id: task.task_id,
            name: task.name.clone(),
            version: task.version.clone(),
        }),
    }
}

fn task_instance_from_step(step: &TaskStep) -> TaskInstance {
    let reference = step.reference.clone().unwrap_or_default();
    TaskInstance {
        instance_id: step.id,
        task_id: reference.id,
        version: reference.version,
        name: reference.name,
        display_name: step.display_name.clone(),
        ref_name: Some(step.name.clone()),
        enabled: step.enabled,
        condition: step.condition.clone(),
        continue_on_error: step.continue_on_error,
        timeout_in_minutes: step.timeout_in_minutes,
        inputs: step.inputs.clone(),
        environment: step.environment.clone(),
    }
}

fn convert_legacy_source_type(legacy_type: &str) -> Result<String> {
    let converted = if legacy_type.eq_ignore_ascii_case(legacy_repository_types::BITBUCKET) {
        repository_types::BITBUCKET
    } else if legacy_type.eq_ignore_ascii_case(legacy_repository_types::GIT) {
        repository_types::EXTERNAL_GIT
    } else if legacy_type.eq_ignore_ascii_case(legacy_repository_types::TFS_GIT) {
        repository_types::GIT
    } else if legacy_type.eq_ignore_ascii_case(legacy_repository_types::GITHUB) {
        repository_types::GITHUB
    } else if legacy_type.eq_ignore_ascii_case(legacy_repository_types::GITHUB_ENTERPRISE) {
        repository_types::GITHUB_ENTERPRISE
    } else if legacy_type.eq_ignore_ascii_case(legacy_repository_types::SVN) {
        repository_types::SVN
    } else if legacy_type.eq_ignore_ascii_case(legacy_repository_types::TFS_VERSION_CONTROL) {
        repository_types::TFVC
    } else {
        return Err(Error::NotSupported(legacy_type.to_string()));
    };

    Ok(converted.to_string())
}

fn convert_to_legacy_source_type(pipeline_type: &str) -> Result<String> {
    let converted = if pipeline_type.eq_ignore_ascii_case(repository_types::BITBUCKET) {
        legacy_repository_types::BITBUCKET
    } else if pipeline_type.eq_ignore_ascii_case(repository_types::EXTERNAL_GIT) {
        legacy_repository_types::GIT
    } else if pipeline_type.eq_ignore_ascii_case(repository_types::GIT) {
        legacy_repository_types::TFS_GIT
    } else if pipeline_type.eq_ignore_ascii_case(repository_types::GITHUB) {
        legacy_repository_types::GITHUB
    } else if pipeline_type.eq_ignore_ascii_case(repository_types::GITHUB_ENTERPRISE) {
        legacy_repository_types::GITHUB_ENTERPRISE
    } else if pipeline_type.eq_ignore_ascii_case(repository_types::SVN) {
        legacy_repository_types::SVN
    } else if pipeline_type.eq_ignore_ascii_case(repository_types::TFVC) {
        legacy_repository_types::TFS_VERSION_CONTROL
    } else {
        return Err(Error::NotSupported(pipeline_type.to_string()));
    };

    Ok(converted.to_string())
}

fn parse_bool(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("true"))
}
