//! Translator behavior: legacy round trips, downgrade rejections, and the
//! exact legacy field/value table.

use gantry_compat::legacy::{
    endpoint_data, legacy_repository_types, JobEnvironment, LegacyAgentJobRequestMessage,
    FALSE_STRING, TRUE_STRING,
};
use gantry_compat::{to_legacy_message, to_pipeline_message};
use gantry_core::constants::{checkout_inputs, checkout_task};
use gantry_core::error::Error;
use gantry_core::messages::{AgentJobRequestMessage, PlanReference};
use gantry_core::resources::{
    authorization_parameters, authorization_schemes, repository_properties, repository_types,
    EndpointAuthorization, RepositoryResource, SecureFile, ServiceEndpoint,
    ServiceEndpointReference,
};
use gantry_core::step::{checkout_step, Step, TaskStep, TaskStepDefinitionReference};
use gantry_core::variables::VariableValue;
use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use uuid::Uuid;

fn build_plan() -> PlanReference {
    PlanReference {
        plan_type: "Build".to_string(),
        ..PlanReference::default()
    }
}

fn git_repository(alias: &str) -> RepositoryResource {
    let mut repository = RepositoryResource::new(alias);
    repository.set_id("3f7c4a90-0000-0000-0000-00000000beef");
    repository.set_type_name(repository_types::GIT);
    repository.set_url("https://example.test/org/project/_git/repo");
    repository.set_version("abc123");
    repository
        .properties
        .set(repository_properties::NAME, &"project/repo");
    repository
        .properties
        .set(repository_properties::REF, &"refs/heads/main");
    repository.set_endpoint(&ServiceEndpointReference::by_name("project/repo"));
    repository
}

fn repo_connection_endpoint(name: &str) -> ServiceEndpoint {
    ServiceEndpoint {
        id: Uuid::nil(),
        name: name.to_string(),
        endpoint_type: "TfsGit".to_string(),
        url: Some("https://example.test/org/project/_git/repo".to_string()),
        authorization: Some(EndpointAuthorization {
            scheme: authorization_schemes::OAUTH.to_string(),
            parameters: IndexMap::new(),
        }),
        data: IndexMap::new(),
    }
}

fn pipeline_build_message() -> AgentJobRequestMessage {
    let mut message = AgentJobRequestMessage {
        plan: build_plan(),
        job_name: "__default".to_string(),
        job_display_name: "Build".to_string(),
        ..AgentJobRequestMessage::default()
    };
    message.resources.repositories.push(git_repository("self"));
    message
        .resources
        .endpoints
        .push(repo_connection_endpoint("project/repo"));

    let mut checkout = checkout_step("self");
    checkout
        .inputs
        .insert(checkout_inputs::CLEAN.to_string(), "true".to_string());
    checkout
        .inputs
        .insert(checkout_inputs::FETCH_DEPTH.to_string(), "5".to_string());
    message.steps.push(Step::Task(checkout));

    message
}

#[test]
fn legacy_round_trip_preserves_checkout_settings() {
    let legacy = to_legacy_message(pipeline_build_message()).unwrap();

    // The checkout task was stripped from the task list...
    assert!(legacy.tasks.is_empty());

    // ...and became the repository endpoint's data.
    let endpoint = legacy
        .environment
        .endpoints
        .iter()
        .find(|e| e.data_value(endpoint_data::REPOSITORY_ID).is_some())
        .expect("legacy repo endpoint");
    assert_eq!(endpoint.endpoint_type, legacy_repository_types::TFS_GIT);
    assert_eq!(endpoint.data_value(endpoint_data::CLEAN), Some("true"));
    assert_eq!(endpoint.data_value(endpoint_data::FETCH_DEPTH), Some("5"));

    // Converting back re-synthesizes the checkout step and repository.
    let pipeline = to_pipeline_message(&legacy).unwrap();
    let Step::Task(checkout) = &pipeline.steps[0] else {
        panic!("expected checkout step first");
    };
    assert!(checkout.is_checkout_task());
    assert_eq!(checkout.input(checkout_inputs::CLEAN), Some("true"));
    assert_eq!(checkout.input(checkout_inputs::FETCH_DEPTH), Some("5"));

    let repository = &pipeline.resources.repositories[0];
    assert_eq!(
        repository.type_name().as_deref(),
        Some(repository_types::GIT)
    );
    assert_eq!(
        repository.id().as_deref(),
        Some("3f7c4a90-0000-0000-0000-00000000beef")
    );
}

#[test]
fn multiple_repositories_cannot_downgrade() {
    let mut message = pipeline_build_message();
    message.resources.repositories.push(git_repository("tools"));

    let error = to_legacy_message(message).unwrap_err();
    assert!(matches!(error, Error::NotSupported(aliases) if aliases == "self, tools"));
}

#[test]
fn containers_cannot_downgrade() {
    let mut message = pipeline_build_message();
    message.job_container = Some("ubuntu:22.04".to_string());

    let error = to_legacy_message(message).unwrap_err();
    assert!(matches!(error, Error::NotSupported(container) if container == "ubuntu:22.04"));
}

#[test]
fn multiple_checkouts_cannot_downgrade() {
    let mut message = pipeline_build_message();
    message.steps.push(Step::Task(checkout_step("tools")));

    let error = to_legacy_message(message).unwrap_err();
    assert!(matches!(error, Error::NotSupported(id) if id == checkout_task::ID.to_string()));
}

#[test]
fn legacy_defaults_table_is_exact() {
    let mut message = pipeline_build_message();
    // Drop the authored checkout so only the defaults remain.
    message.steps.clear();

    let legacy = to_legacy_message(message).unwrap();
    let endpoint = legacy
        .environment
        .endpoints
        .iter()
        .find(|e| e.data_value(endpoint_data::REPOSITORY_ID).is_some())
        .unwrap();

    assert_eq!(endpoint.data_value(endpoint_data::CLEAN), Some(FALSE_STRING));
    assert_eq!(
        endpoint.data_value(endpoint_data::CHECKOUT_SUBMODULES),
        Some(FALSE_STRING)
    );
    assert_eq!(
        endpoint.data_value(endpoint_data::CHECKOUT_NESTED_SUBMODULES),
        Some(FALSE_STRING)
    );
    assert_eq!(endpoint.data_value(endpoint_data::FETCH_DEPTH), Some("0"));
    assert_eq!(
        endpoint.data_value(endpoint_data::GIT_LFS_SUPPORT),
        Some(FALSE_STRING)
    );
    assert_eq!(
        endpoint.data_value(endpoint_data::SKIP_SYNC_SOURCE),
        Some(FALSE_STRING)
    );
    assert_eq!(endpoint.data_value(endpoint_data::CLEAN_OPTIONS), Some("0"));

    // rootFolder is present as an explicit null.
    assert!(endpoint.data.contains_key(endpoint_data::ROOT_FOLDER));
    assert_eq!(endpoint.data_value(endpoint_data::ROOT_FOLDER), None);

    // On-prem marker for plain git repositories without a Hosted server
    // type variable.
    assert_eq!(
        endpoint.data_value(endpoint_data::ONPREM_TFS_GIT),
        Some(TRUE_STRING)
    );
}

#[test]
fn token_authorization_uses_access_token_sentinel() {
    let mut message = pipeline_build_message();
    message.resources.endpoints[0].authorization = Some(EndpointAuthorization {
        scheme: authorization_schemes::TOKEN.to_string(),
        parameters: IndexMap::from_iter([(
            authorization_parameters::ACCESS_TOKEN.to_string(),
            "ghs_token".to_string(),
        )]),
    });

    let legacy = to_legacy_message(message).unwrap();
    let endpoint = legacy
        .environment
        .endpoints
        .iter()
        .find(|e| e.data_value(endpoint_data::REPOSITORY_ID).is_some())
        .unwrap();

    let authorization = endpoint.authorization.as_ref().unwrap();
    assert_eq!(authorization.scheme, authorization_schemes::USERNAME_PASSWORD);
    assert_eq!(
        authorization.parameter(authorization_parameters::USERNAME),
        Some("x-access-token")
    );
    assert_eq!(
        authorization.parameter(authorization_parameters::PASSWORD),
        Some("ghs_token")
    );
}

#[test]
fn api_token_authorization_uses_oauth_basic_sentinel() {
    let mut message = pipeline_build_message();
    message.resources.endpoints[0].authorization = Some(EndpointAuthorization {
        scheme: authorization_schemes::TOKEN.to_string(),
        parameters: IndexMap::from_iter([(
            authorization_parameters::API_TOKEN.to_string(),
            "ghe_api_token".to_string(),
        )]),
    });

    let legacy = to_legacy_message(message).unwrap();
    let endpoint = legacy
        .environment
        .endpoints
        .iter()
        .find(|e| e.data_value(endpoint_data::REPOSITORY_ID).is_some())
        .unwrap();

    let authorization = endpoint.authorization.as_ref().unwrap();
    assert_eq!(
        authorization.parameter(authorization_parameters::USERNAME),
        Some("ghe_api_token")
    );
    assert_eq!(
        authorization.parameter(authorization_parameters::PASSWORD),
        Some("x-oauth-basic")
    );
}

#[test]
fn personal_access_token_uses_pat_sentinel() {
    let mut message = pipeline_build_message();
    message.resources.endpoints[0].authorization = Some(EndpointAuthorization {
        scheme: authorization_schemes::PERSONAL_ACCESS_TOKEN.to_string(),
        parameters: IndexMap::from_iter([(
            authorization_parameters::ACCESS_TOKEN.to_string(),
            "gh_pat".to_string(),
        )]),
    });

    let legacy = to_legacy_message(message).unwrap();
    let endpoint = legacy
        .environment
        .endpoints
        .iter()
        .find(|e| e.data_value(endpoint_data::REPOSITORY_ID).is_some())
        .unwrap();

    let authorization = endpoint.authorization.as_ref().unwrap();
    assert_eq!(
        authorization.parameter(authorization_parameters::USERNAME),
        Some("pat")
    );
    assert_eq!(
        authorization.parameter(authorization_parameters::PASSWORD),
        Some("gh_pat")
    );
}

#[test]
fn build_variables_backfill_only_when_unset() {
    let mut message = pipeline_build_message();
    message.variables.insert(
        "build.sourceBranch".to_string(),
        VariableValue::new("refs/heads/release"),
    );

    let legacy = to_legacy_message(message).unwrap();

    assert_eq!(
        legacy.environment.variable("build.repository.name"),
        Some("project/repo")
    );
    assert_eq!(legacy.environment.variable("build.sourceVersion"), Some("abc123"));
    // The pre-set value wins over the repository's ref.
    assert_eq!(
        legacy.environment.variable("build.sourceBranch"),
        Some("refs/heads/release")
    );
}

#[test]
fn secure_file_tickets_become_mask_hints() {
    let mut message = pipeline_build_message();
    message.resources.secure_files.push(SecureFile {
        id: Uuid::new_v4(),
        name: "signing.p12".to_string(),
        ticket: Some("ticket(with|specials)".to_string()),
    });

    let legacy = to_legacy_message(message).unwrap();
    assert!(legacy
        .environment
        .mask_hints
        .iter()
        .any(|hint| hint.value == regex::escape("ticket(with|specials)")));
}

#[test]
fn forward_conversion_synthesizes_checkout() {
    let mut endpoint = repo_connection_endpoint("project/repo");
    endpoint.set_data(
        endpoint_data::REPOSITORY_ID,
        Some("repo-guid".to_string()),
    );
    endpoint.set_data(endpoint_data::CLEAN, Some(TRUE_STRING.to_string()));
    endpoint.set_data(
        endpoint_data::CHECKOUT_SUBMODULES,
        Some(TRUE_STRING.to_string()),
    );
    endpoint.set_data(
        endpoint_data::CHECKOUT_NESTED_SUBMODULES,
        Some(TRUE_STRING.to_string()),
    );
    endpoint.set_data(endpoint_data::CLEAN_OPTIONS, Some("1".to_string()));

    let legacy = LegacyAgentJobRequestMessage {
        plan: build_plan(),
        job_name: "Build".to_string(),
        job_ref_name: "__default".to_string(),
        environment: JobEnvironment {
            endpoints: vec![endpoint],
            ..JobEnvironment::default()
        },
        tasks: vec![],
        ..LegacyAgentJobRequestMessage::default()
    };

    let pipeline = to_pipeline_message(&legacy).unwrap();

    let Step::Task(checkout) = &pipeline.steps[0] else {
        panic!("expected checkout step");
    };
    assert!(checkout.is_checkout_task());
    assert_eq!(checkout.input(checkout_inputs::CLEAN), Some(TRUE_STRING));
    assert_eq!(
        checkout.input(checkout_inputs::SUBMODULES),
        Some(checkout_inputs::submodule_options::RECURSIVE)
    );
    assert!(checkout.condition.is_none());

    let repository = &pipeline.resources.repositories[0];
    assert_eq!(repository.id().as_deref(), Some("repo-guid"));
    assert_eq!(
        repository.type_name().as_deref(),
        Some(repository_types::GIT)
    );

    // clean=true with cleanOptions=1 maps to an "outputs" workspace clean.
    assert_eq!(
        pipeline.workspace.as_ref().and_then(|w| w.clean.as_deref()),
        Some("outputs")
    );
}

#[test]
fn forward_conversion_disables_checkout_when_sources_skipped() {
    let mut endpoint = repo_connection_endpoint("project/repo");
    endpoint.set_data(
        endpoint_data::REPOSITORY_ID,
        Some("repo-guid".to_string()),
    );
    endpoint.set_data(
        endpoint_data::SKIP_SYNC_SOURCE,
        Some(TRUE_STRING.to_string()),
    );

    let legacy = LegacyAgentJobRequestMessage {
        plan: build_plan(),
        environment: JobEnvironment {
            endpoints: vec![endpoint],
            ..JobEnvironment::default()
        },
        ..LegacyAgentJobRequestMessage::default()
    };

    let pipeline = to_pipeline_message(&legacy).unwrap();
    let Step::Task(checkout) = &pipeline.steps[0] else {
        panic!("expected checkout step");
    };
    assert_eq!(checkout.condition.as_deref(), Some(FALSE_STRING));
}

#[test]
fn non_build_plans_are_passed_through() {
    let legacy = LegacyAgentJobRequestMessage {
        plan: PlanReference {
            plan_type: "Release".to_string(),
            ..PlanReference::default()
        },
        tasks: vec![gantry_compat::TaskInstance {
            instance_id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            version: "1.0.0".to_string(),
            name: "CmdLine".to_string(),
            ref_name: Some("run".to_string()),
            enabled: true,
            ..gantry_compat::TaskInstance::default()
        }],
        ..LegacyAgentJobRequestMessage::default()
    };

    let pipeline = to_pipeline_message(&legacy).unwrap();
    assert_eq!(pipeline.steps.len(), 1);
    assert!(pipeline.resources.repositories.is_empty());

    let Step::Task(task) = &pipeline.steps[0] else {
        panic!("expected task step");
    };
    assert_eq!(task.name, "run");
    assert_eq!(task.reference.as_ref().unwrap().name, "CmdLine");
}

#[test]
fn endpoint_names_are_rewritten_to_ids() {
    let mut message = pipeline_build_message();
    let endpoint_id = Uuid::new_v4();
    message.resources.endpoints.push(ServiceEndpoint {
        id: endpoint_id,
        name: "my-deploy-connection".to_string(),
        endpoint_type: "azurerm".to_string(),
        ..ServiceEndpoint::default()
    });

    let legacy = to_legacy_message(message).unwrap();
    let rewritten = legacy
        .environment
        .endpoints
        .iter()
        .find(|e| e.id == endpoint_id)
        .unwrap();
    assert_eq!(rewritten.name, endpoint_id.to_string());
}
