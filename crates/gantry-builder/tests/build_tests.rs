//! Full pipeline builds: defaults, template resolution, validation, and
//! the output environment contract.

use gantry_builder::builder::{BuilderConfig, PipelineBuilder};
use gantry_builder::nodes::{Phase, PhaseCommon, PhaseNode, Stage};
use gantry_builder::options::BuildOptions;
use gantry_builder::validation::codes;
use gantry_core::resources::{AgentQueueReference, CheckoutOptions, RepositoryResource, TaskAgentQueue};
use gantry_core::step::{Step, TaskStep, TaskStepDefinitionReference, TaskTemplateStep};
use gantry_core::target::{AgentQueueTarget, PhaseTarget};
use gantry_core::task::{runs_on, TaskDefinition};
use gantry_core::variables::Variable;
use gantry_stores::{InMemoryTaskStore, TaskTemplateStore};
use uuid::Uuid;

fn cmdline_task_id() -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, b"CmdLine")
}

fn task_store() -> InMemoryTaskStore {
    InMemoryTaskStore::new(vec![
        TaskDefinition {
            id: cmdline_task_id(),
            name: "CmdLine".to_string(),
            version: "2.212.0".to_string(),
            runs_on: vec![runs_on::AGENT.to_string()],
            ..TaskDefinition::default()
        },
        TaskDefinition {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, b"InvokeRestApi"),
            name: "InvokeRestApi".to_string(),
            version: "1.0.0".to_string(),
            runs_on: vec![runs_on::SERVER.to_string()],
            ..TaskDefinition::default()
        },
    ])
}

fn task_step(name: &str, reference_name: &str, version: &str) -> Step {
    Step::Task(TaskStep {
        name: name.to_string(),
        reference: Some(TaskStepDefinitionReference {
            id: Uuid::nil(),
            name: reference_name.to_string(),
            version: version.to_string(),
        }),
        ..TaskStep::default()
    })
}

fn phase_named(name: &str, depends_on: &[&str], steps: Vec<Step>) -> PhaseNode {
    PhaseNode::Phase(Phase {
        common: PhaseCommon {
            name: name.to_string(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            ..PhaseCommon::default()
        },
        steps,
    })
}

fn builder_with_defaults() -> PipelineBuilder {
    let config = BuilderConfig {
        default_queue: Some(AgentQueueReference::by_name("hosted-linux")),
        ..BuilderConfig::default()
    };
    let mut builder = PipelineBuilder::new(config).with_task_store(Box::new(task_store()));
    builder.resource_store.queues.add(TaskAgentQueue {
        id: 7,
        name: "hosted-linux".to_string(),
        pool: None,
    });
    builder
        .resource_store
        .repositories
        .add("self".to_string(), RepositoryResource::new("self"));
    builder
}

#[test]
fn build_applies_default_queue_and_validates() {
    let mut builder = builder_with_defaults();

    let phases = vec![phase_named(
        "build",
        &[],
        vec![task_step("run", "CmdLine", "2.*")],
    )];

    let result = builder
        .build_phases(
            phases,
            &BuildOptions {
                validate_resources: true,
                ..BuildOptions::default()
            },
        )
        .unwrap();

    assert!(result.result.is_valid(), "{:?}", result.result.errors);

    let phase = &result.process.stages[0].phases[0];
    let Some(PhaseTarget::Queue(queue_target)) = &phase.common().target else {
        panic!("expected queue target");
    };
    // The default queue was substituted and resolved to its numeric id.
    assert_eq!(queue_target.queue.as_ref().unwrap().id, 7);

    // The resolved queue shows up as an authorized resource.
    assert_eq!(result.environment.resources.queues.len(), 1);
    assert_eq!(result.environment.resources.queues[0].id, 7);
    assert_eq!(result.environment.resources.repositories.len(), 1);

    // Task references are pinned to the resolved version.
    let Step::Task(task) = &phase.steps()[0] else {
        panic!("expected task step");
    };
    let reference = task.reference.as_ref().unwrap();
    assert_eq!(reference.version, "2.212.0");
    assert_eq!(reference.id, cmdline_task_id());
}

#[test]
fn stage_cycle_is_reported() {
    let mut builder = builder_with_defaults();

    let stages = vec![
        Stage {
            name: "a".to_string(),
            depends_on: vec!["b".to_string()],
            phases: vec![phase_named("p1", &[], vec![])],
            ..Stage::default()
        },
        Stage {
            name: "b".to_string(),
            depends_on: vec!["c".to_string()],
            phases: vec![phase_named("p2", &[], vec![])],
            ..Stage::default()
        },
        Stage {
            name: "c".to_string(),
            depends_on: vec!["a".to_string()],
            phases: vec![phase_named("p3", &[], vec![])],
            ..Stage::default()
        },
    ];

    let result = builder.build(stages, &BuildOptions::default()).unwrap();

    let cycle_errors: Vec<_> = result
        .result
        .errors
        .iter()
        .filter(|e| e.code == codes::GRAPH_CONTAINS_CYCLE)
        .collect();
    assert_eq!(cycle_errors.len(), 1);
}

#[test]
fn validation_accumulates_every_error() {
    let mut builder = builder_with_defaults();

    let phases = vec![
        phase_named("build", &["ghost"], vec![task_step("run", "Missing", "1.*")]),
        phase_named("build", &[], vec![]),
    ];

    let result = builder
        .build_phases(phases, &BuildOptions::default())
        .unwrap();

    let codes_seen: Vec<&str> = result
        .result
        .errors
        .iter()
        .map(|e| e.code.as_str())
        .collect();
    assert!(codes_seen.contains(&codes::NAME_NOT_UNIQUE));
    assert!(codes_seen.contains(&codes::DEPENDENCY_NOT_FOUND));
    assert!(codes_seen.contains(&codes::TASK_MISSING));
}

#[test]
fn server_task_is_invalid_on_queue_target() {
    let mut builder = builder_with_defaults();

    let phases = vec![phase_named(
        "build",
        &[],
        vec![task_step("call", "InvokeRestApi", "1.*")],
    )];

    let result = builder
        .build_phases(phases, &BuildOptions::default())
        .unwrap();

    assert!(result
        .result
        .errors
        .iter()
        .any(|e| e.code == codes::TASK_INVALID_FOR_TARGET));
}

#[test]
fn disabled_steps_are_filtered_before_validation() {
    let mut builder = builder_with_defaults();

    let mut disabled = TaskStep {
        name: "never".to_string(),
        reference: None,
        ..TaskStep::default()
    };
    disabled.enabled = false;

    let phases = vec![phase_named(
        "build",
        &[],
        vec![
            Step::Task(disabled),
            task_step("run", "CmdLine", "2.*"),
        ],
    )];

    let result = builder
        .build_phases(phases, &BuildOptions::default())
        .unwrap();

    assert!(result.result.is_valid(), "{:?}", result.result.errors);
    assert_eq!(result.process.stages[0].phases[0].steps().len(), 1);
}

#[test]
fn unnamed_steps_get_generated_names() {
    let mut builder = builder_with_defaults();

    let phases = vec![phase_named(
        "build",
        &[],
        vec![
            task_step("", "CmdLine", "2.*"),
            task_step("", "CmdLine", "2.*"),
        ],
    )];

    let result = builder
        .build_phases(phases, &BuildOptions::default())
        .unwrap();

    assert!(result.result.is_valid(), "{:?}", result.result.errors);
    let names: Vec<&str> = result.process.stages[0].phases[0]
        .steps()
        .iter()
        .map(|s| s.name())
        .collect();
    assert_eq!(names, vec!["CmdLine1", "CmdLine2"]);
}

struct StubTemplateStore;

impl TaskTemplateStore for StubTemplateStore {
    fn resolve_tasks(&self, template: &TaskTemplateStep) -> Vec<Step> {
        vec![task_step(&format!("{}_run", template.name), "CmdLine", "2.*")]
    }
}

#[test]
fn template_step_without_store_is_a_hard_error() {
    let mut builder = builder_with_defaults();

    let phases = vec![phase_named(
        "build",
        &[],
        vec![Step::TaskTemplate(TaskTemplateStep {
            name: "shared".to_string(),
            ..TaskTemplateStep::default()
        })],
    )];

    let error = builder
        .build_phases(phases, &BuildOptions::default())
        .unwrap_err();
    assert!(matches!(
        error,
        gantry_core::Error::TemplateStoreNotProvided(name) if name == "shared"
    ));
}

#[test]
fn template_step_resolves_through_store() {
    let mut builder = builder_with_defaults().with_template_store(Box::new(StubTemplateStore));

    let phases = vec![phase_named(
        "build",
        &[],
        vec![Step::TaskTemplate(TaskTemplateStep {
            name: "shared".to_string(),
            ..TaskTemplateStep::default()
        })],
    )];

    let result = builder
        .build_phases(phases, &BuildOptions::default())
        .unwrap();

    assert!(result.result.is_valid(), "{:?}", result.result.errors);
    let steps = result.process.stages[0].phases[0].steps();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].name(), "shared_run");
}

#[test]
fn default_checkout_options_propagate_first_wins() {
    let mut builder = builder_with_defaults();

    // One repo with explicit options, one without.
    let mut pinned = RepositoryResource::new("tools");
    pinned.set_checkout_options(&CheckoutOptions {
        clean: Some("false".to_string()),
        ..CheckoutOptions::default()
    });
    builder.resource_store.repositories.add("tools".to_string(), pinned);

    let config = BuilderConfig {
        default_checkout_options: Some(CheckoutOptions {
            clean: Some("true".to_string()),
            ..CheckoutOptions::default()
        }),
        ..BuilderConfig::default()
    };
    let mut builder = {
        let mut with_defaults = PipelineBuilder::new(config);
        std::mem::swap(
            &mut with_defaults.resource_store,
            &mut builder.resource_store,
        );
        with_defaults
    };

    let phases = vec![phase_named("build", &[], vec![])];
    builder
        .build_phases(phases, &BuildOptions::default())
        .unwrap();

    let self_repo = builder.resource_store.repositories.get("self").unwrap();
    assert_eq!(
        self_repo.checkout_options().unwrap().clean.as_deref(),
        Some("true")
    );

    let tools = builder.resource_store.repositories.get("tools").unwrap();
    assert_eq!(
        tools.checkout_options().unwrap().clean.as_deref(),
        Some("false")
    );
}

#[test]
fn environment_lists_user_then_system_variables() {
    let mut builder = builder_with_defaults();
    builder.add_user_variable(Variable {
        name: "configuration".to_string(),
        value: Some("release".to_string()),
        secret: false,
    });
    builder.add_system_variable(Variable {
        name: "system.definitionId".to_string(),
        value: Some("12".to_string()),
        secret: false,
    });

    let phases = vec![phase_named("build", &[], vec![])];
    let result = builder
        .build_phases(phases, &BuildOptions::default())
        .unwrap();

    assert_eq!(result.environment.user_variables.len(), 1);
    assert_eq!(result.environment.system_variables.len(), 1);

    let json = serde_json::to_value(&result.environment).unwrap();
    assert_eq!(json["processType"], "Pipeline");
    assert!(json.get("userVariables").is_some());
    assert!(json.get("systemVariables").is_some());
}
