//! Validation results.
//!
//! Validation never short-circuits: every problem in a pipeline is
//! collected into one result so a single build surfaces the complete list.
//! Only impossible-to-continue configuration states abort the build as
//! [`gantry_core::Error`] values.

use crate::environment::PipelineEnvironment;
use gantry_core::resources::PipelineResources;
use serde::{Deserialize, Serialize};

/// Error codes surfaced in validation results.
pub mod codes {
    pub const NAME_INVALID: &str = "NameInvalid";
    pub const NAME_NOT_UNIQUE: &str = "NameNotUnique";
    pub const DEPENDENCY_NOT_FOUND: &str = "DependencyNotFound";
    pub const GRAPH_CONTAINS_CYCLE: &str = "GraphContainsCycle";
    pub const STARTING_POINT_NOT_FOUND: &str = "StartingPointNotFound";
    pub const PHASE_TARGET_REQUIRED: &str = "PhaseTargetRequired";
    pub const STEP_NAME_INVALID: &str = "StepNameInvalid";
    pub const STEP_NAME_NOT_UNIQUE: &str = "StepNameNotUnique";
    pub const STEP_REFERENCE_INVALID: &str = "StepReferenceInvalid";
    pub const TASK_MISSING: &str = "TaskMissing";
    pub const TASK_INVALID_FOR_TARGET: &str = "TaskInvalidForGivenTarget";
    pub const QUEUE_NOT_FOUND: &str = "QueueNotFound";
    pub const QUEUE_NOT_DEFINED: &str = "QueueNotDefined";
    pub const POOL_NOT_FOUND: &str = "PoolNotFound";
    pub const ENVIRONMENT_NOT_FOUND: &str = "EnvironmentNotFound";
    pub const VARIABLE_GROUP_NOT_FOUND: &str = "VariableGroupNotFound";
    pub const DEMAND_EXPANSION_INVALID: &str = "DemandExpansionInvalid";
    pub const STEP_NOT_SUPPORTED: &str = "StepNotSupported";
}

/// A single validation problem, rendered per-error by hosting UIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineValidationError {
    pub code: String,
    pub message: String,
}

impl PipelineValidationError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Accumulated outcome of validating a pipeline process.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<PipelineValidationError>,
    pub warnings: Vec<String>,
    /// Every resource the pipeline refers to, resolvable or not.
    pub referenced_resources: PipelineResources,
    /// Referenced resources the stores could not resolve.
    pub unauthorized_resources: PipelineResources,
    pub environment: Option<PipelineEnvironment>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&mut self, code: &str, message: impl Into<String>) {
        self.errors.push(PipelineValidationError::new(code, message));
    }
}

use crate::graph::{validate_graph, GraphOptions};
use crate::nodes::{PhaseNode, PipelineProcess};
use crate::options::BuildOptions;
use gantry_core::expression::ExpressionValue;
use gantry_core::names::{is_legal_node_name, sanitize};
use gantry_core::resources::VariableGroupReference;
use gantry_core::step::{ActionStep, ActionStepDefinitionReference, Step, TaskStep};
use gantry_core::target::PhaseTarget;
use gantry_core::task::{max_agent_version_and_remove, Demand};
use gantry_stores::{ResourceStore, TaskSpec, TaskStore};
use std::collections::HashSet;

/// The condition applied when a node specifies none.
pub const DEFAULT_CONDITION: &str = "succeeded()";

/// Stores consulted while validating a process.
pub struct ValidationServices<'a> {
    pub resource_store: &'a mut ResourceStore,
    pub task_store: Option<&'a dyn TaskStore>,
}

/// Validates a whole process: graph structure, per-phase targets, steps,
/// and referenced resources. Mutates the process where validation pins
/// state (task references, generated step names, merged demands, resolved
/// queue ids).
pub fn validate_process(
    services: &mut ValidationServices<'_>,
    process: &mut PipelineProcess,
    options: &BuildOptions,
    result: &mut ValidationResult,
) {
    let graph_options = GraphOptions {
        allow_hyphen_names: options.allow_hyphen_names,
        // Build-time graph validation always reports illegal names as
        // errors; the lenient path applies to runtime configuration names.
        enforce_legal_node_names: true,
    };

    validate_graph(&process.stages, None, graph_options, result);

    let single_stage = process.stages.len() == 1;
    for stage in &mut process.stages {
        let scope = if single_stage
            && stage
                .name
                .eq_ignore_ascii_case(gantry_core::constants::DEFAULT_JOB_NAME)
        {
            None
        } else {
            Some(stage.name.clone())
        };

        validate_graph(&stage.phases, scope.as_deref(), graph_options, result);

        validate_variable_groups(services, &stage.variable_groups, &stage.name, options, result);

        for phase in &mut stage.phases {
            validate_phase(services, phase, options, result);
        }
    }
}

fn validate_phase(
    services: &mut ValidationServices<'_>,
    phase: &mut PhaseNode,
    options: &BuildOptions,
    result: &mut ValidationResult,
) {
    let phase_name = phase.common().name.clone();

    if phase.common().target.is_none() {
        result.error(
            codes::PHASE_TARGET_REQUIRED,
            format!("Phase '{phase_name}' requires a target"),
        );
        return;
    }

    // Default the condition to something reasonable if none is specified.
    {
        let common = phase.common_mut();
        if common.condition.as_deref().is_none_or(str::is_empty) {
            common.condition = Some(DEFAULT_CONDITION.to_string());
        }
    }

    let variable_groups = phase.common().variable_groups.clone();
    validate_variable_groups(services, &variable_groups, &phase_name, options, result);

    let target = phase.common().target.clone().expect("target checked above");
    let mut task_demands =
        validate_steps(services, &phase_name, &target, phase.steps_mut(), options, result);

    // Resolve literal targets now so the orchestration engine gets stable
    // identifiers; targets with expressions are evaluated against concrete
    // job contexts instead.
    let validate_target_now = match &target {
        PhaseTarget::Pool(_) | PhaseTarget::Server(_) | PhaseTarget::DeploymentGroup(_) => true,
        PhaseTarget::Queue(queue) => queue.is_literal(),
    };

    if validate_target_now {
        let mut resolved_target = target;
        validate_target(
            services,
            &phase_name,
            &mut resolved_target,
            &mut task_demands,
            options,
            result,
        );
        phase.common_mut().target = Some(resolved_target);
    }
}

fn validate_variable_groups(
    services: &mut ValidationServices<'_>,
    groups: &[VariableGroupReference],
    scope_name: &str,
    options: &BuildOptions,
    result: &mut ValidationResult,
) {
    for group in groups {
        result.referenced_resources.variable_groups.push(group.clone());

        if options.validate_resources && services.resource_store.variable_groups.get(group).is_none()
        {
            result
                .unauthorized_resources
                .variable_groups
                .push(group.clone());
            result.error(
                codes::VARIABLE_GROUP_NOT_FOUND,
                format!("'{scope_name}' references a variable group which could not be found"),
            );
        }
    }
}

/// Per-step validation state threaded through one phase.
struct StepValidationState {
    known_names: HashSet<String>,
    unnamed: Vec<usize>,
    task_demands: Vec<Demand>,
    tasks_satisfy: HashSet<String>,
    min_agent_version: Option<String>,
}

fn validate_steps(
    services: &mut ValidationServices<'_>,
    phase_name: &str,
    target: &PhaseTarget,
    steps: &mut Vec<Step>,
    options: &BuildOptions,
    result: &mut ValidationResult,
) -> Vec<Demand> {
    let mut state = StepValidationState {
        known_names: HashSet::new(),
        unnamed: Vec::new(),
        task_demands: Vec::new(),
        tasks_satisfy: HashSet::new(),
        min_agent_version: None,
    };

    let mut kept: Vec<Step> = Vec::with_capacity(steps.len());
    let mut default_names: Vec<Option<String>> = Vec::with_capacity(steps.len());

    for step in steps.drain(..) {
        if !step.enabled() {
            continue;
        }

        let mut step = step;
        let default_name = match &mut step {
            Step::Task(task) => {
                match validate_task_step(services, phase_name, target, task, options, result, &mut state)
                {
                    Some(name) => name,
                    None => continue,
                }
            }
            Step::Group(group) => {
                let mut valid = true;
                for task in &mut group.steps {
                    if validate_task_step(
                        services, phase_name, target, task, options, result, &mut state,
                    )
                    .is_none()
                    {
                        valid = false;
                    }
                }
                if !valid {
                    continue;
                }
                sanitize("Group", options.allow_hyphen_names)
            }
            Step::Action(action) => match validate_action_step(phase_name, action, options, result) {
                Some(name) => name,
                None => continue,
            },
            Step::TaskTemplate(template) => {
                // Template steps are resolved away before validation runs.
                result.error(
                    codes::STEP_NOT_SUPPORTED,
                    format!(
                        "Phase '{phase_name}' contains unresolved template step '{}'",
                        template.name
                    ),
                );
                continue;
            }
        };

        let index = kept.len();
        match validate_step_name(phase_name, &step, options, result, &mut state) {
            StepNameOutcome::Ok => default_names.push(None),
            StepNameOutcome::Unnamed => {
                state.unnamed.push(index);
                default_names.push(Some(default_name));
            }
            StepNameOutcome::Invalid => continue,
        }

        kept.push(step);
    }

    // Name any steps which did not specify one, numbering per base name.
    for &index in &state.unnamed {
        let base = default_names[index].clone().unwrap_or_default();
        let mut suffix = 1;
        let name = loop {
            let candidate = format!("{base}{suffix}");
            if !state.known_names.contains(&candidate.to_lowercase()) {
                break candidate;
            }
            suffix += 1;
        };
        state.known_names.insert(name.to_lowercase());
        kept[index].set_name(name);
    }

    *steps = kept;

    // The computed minimum agent version joins the task demands.
    if let Some(version) = state.min_agent_version.take() {
        state.task_demands.push(Demand::equals(
            gantry_core::constants::AGENT_VERSION_DEMAND_NAME,
            version,
        ));
    }

    state.task_demands
}

enum StepNameOutcome {
    Ok,
    Unnamed,
    Invalid,
}

fn validate_step_name(
    phase_name: &str,
    step: &Step,
    options: &BuildOptions,
    result: &mut ValidationResult,
    state: &mut StepValidationState,
) -> StepNameOutcome {
    let name = step.name();
    if name.is_empty() {
        return StepNameOutcome::Unnamed;
    }

    if !is_legal_node_name(name, options.allow_hyphen_names) {
        result.error(
            codes::STEP_NAME_INVALID,
            format!("Phase '{phase_name}': step name '{name}' is not valid"),
        );
        return StepNameOutcome::Invalid;
    }

    if !state.known_names.insert(name.to_lowercase()) {
        result.error(
            codes::STEP_NAME_NOT_UNIQUE,
            format!("Phase '{phase_name}': step name '{name}' must be unique"),
        );
        return StepNameOutcome::Invalid;
    }

    StepNameOutcome::Ok
}

/// Validates one task step; returns its default reference name, or `None`
/// when the step should be dropped (errors already recorded).
fn validate_task_step(
    services: &mut ValidationServices<'_>,
    phase_name: &str,
    target: &PhaseTarget,
    task: &mut TaskStep,
    options: &BuildOptions,
    result: &mut ValidationResult,
    state: &mut StepValidationState,
) -> Option<String> {
    // We need either an identifier or a name, plus a version.
    let reference_ok = task.reference.as_ref().is_some_and(|reference| {
        !reference.version.is_empty() && (!reference.id.is_nil() || !reference.name.is_empty())
    });
    if !reference_ok {
        result.error(
            codes::STEP_REFERENCE_INVALID,
            format!(
                "Phase '{phase_name}': step '{}' has an invalid task reference",
                task.name
            ),
        );
        return None;
    }

    let reference = task.reference.as_ref().expect("checked above");

    let Some(task_store) = services.task_store else {
        // No task store configured: the reference cannot be pinned, but the
        // step is otherwise acceptable.
        return Some(sanitize(&reference.name, options.allow_hyphen_names));
    };

    let spec = if !reference.id.is_nil() {
        TaskSpec::Id(reference.id)
    } else {
        TaskSpec::Name(&reference.name)
    };

    let resolved = match task_store.resolve_task(spec, &reference.version) {
        Some(resolved) if !resolved.disabled => resolved,
        _ => {
            let shown = if !reference.id.is_nil() {
                reference.id.to_string()
            } else {
                reference.name.clone()
            };
            result.error(
                codes::TASK_MISSING,
                format!(
                    "Phase '{phase_name}': task '{shown}'@{} could not be found",
                    reference.version
                ),
            );
            return None;
        }
    };

    // Make sure this step can run on the phase's target.
    if !target.is_valid(&resolved) {
        result.error(
            codes::TASK_INVALID_FOR_TARGET,
            format!(
                "Phase '{phase_name}': task '{}' cannot run on the selected target",
                resolved.name
            ),
        );
        return None;
    }

    // Pin the resolved version for the duration of the plan.
    task.reference = Some(gantry_core::step::TaskStepDefinitionReference {
        id: resolved.id,
        name: resolved.name.clone(),
        version: resolved.version.clone(),
    });

    state
        .tasks_satisfy
        .extend(resolved.satisfies.iter().map(|s| s.to_lowercase()));
    state.min_agent_version = resolved.merge_minimum_agent_version(state.min_agent_version.as_deref());

    for demand in &resolved.demands {
        if !state.tasks_satisfy.contains(&demand.name.to_lowercase())
            && !state.task_demands.contains(demand)
        {
            state.task_demands.push(demand.clone());
        }
    }

    Some(sanitize(&resolved.name, options.allow_hyphen_names))
}

/// Validates an action step; returns its default reference name.
fn validate_action_step(
    phase_name: &str,
    action: &ActionStep,
    options: &BuildOptions,
    result: &mut ValidationResult,
) -> Option<String> {
    let Some(reference) = &action.reference else {
        result.error(
            codes::STEP_REFERENCE_INVALID,
            format!(
                "Phase '{phase_name}': action step '{}' has no reference",
                action.name
            ),
        );
        return None;
    };

    let default_name = match reference {
        ActionStepDefinitionReference::ContainerRegistry { image } => {
            sanitize(image, options.allow_hyphen_names)
        }
        ActionStepDefinitionReference::Repository { name, .. } => sanitize(
            name.as_deref().unwrap_or(gantry_core::constants::SELF_ALIAS),
            options.allow_hyphen_names,
        ),
        ActionStepDefinitionReference::AgentPlugin { plugin } => {
            sanitize(plugin, options.allow_hyphen_names)
        }
        ActionStepDefinitionReference::Script => "run".to_string(),
    };

    Some(default_name)
}

fn validate_target(
    services: &mut ValidationServices<'_>,
    phase_name: &str,
    target: &mut PhaseTarget,
    task_demands: &mut Vec<Demand>,
    options: &BuildOptions,
    result: &mut ValidationResult,
) {
    let mut include_task_demands = true;

    match target {
        PhaseTarget::Queue(queue_target) => {
            let queue = queue_target.queue.clone().unwrap_or_default();
            let queue_name = match &queue.name {
                Some(ExpressionValue::Literal(name)) => name.clone(),
                _ => String::new(),
            };

            if queue.id == 0 && queue_name.is_empty() {
                if !options.allow_empty_queue_target && options.validate_resources {
                    result.error(
                        codes::QUEUE_NOT_DEFINED,
                        format!("Phase '{phase_name}' does not specify an agent queue"),
                    );
                }
            } else {
                result
                    .referenced_resources
                    .add_queue_reference(queue.id, (!queue_name.is_empty()).then(|| queue_name.clone()));

                if options.validate_resources {
                    let resolved = if queue.id != 0 {
                        services.resource_store.queues.get_by_id(queue.id)
                    } else {
                        services.resource_store.queues.get_by_name(&queue_name)
                    };

                    match resolved {
                        Some(resolved) => {
                            // Pin the numeric id for orchestration.
                            queue_target.queue = Some(
                                gantry_core::resources::AgentQueueReference {
                                    id: resolved.id,
                                    name: Some(ExpressionValue::Literal(resolved.name.clone())),
                                },
                            );
                            if resolved.pool.as_ref().is_some_and(|pool| pool.is_hosted) {
                                // Hosted pools satisfy tool demands themselves.
                                include_task_demands = false;
                            }
                        }
                        None => {
                            result.unauthorized_resources.queues.push(queue.clone());
                            result.error(
                                codes::QUEUE_NOT_FOUND,
                                format!(
                                    "Phase '{phase_name}': agent queue '{}' could not be found",
                                    if queue.id != 0 {
                                        queue.id.to_string()
                                    } else {
                                        queue_name.clone()
                                    }
                                ),
                            );
                        }
                    }
                }
            }

            // A container supplies its own tools.
            if queue_target.container.is_some() {
                include_task_demands = false;
            }
        }
        PhaseTarget::Pool(pool_target) => {
            if let Some(pool) = &pool_target.pool {
                result.referenced_resources.pools.push(pool.clone());
                if options.validate_resources
                    && services.resource_store.pools.get(pool).is_none()
                {
                    result.unauthorized_resources.pools.push(pool.clone());
                    result.error(
                        codes::POOL_NOT_FOUND,
                        format!("Phase '{phase_name}': agent pool could not be found"),
                    );
                }
            }
        }
        PhaseTarget::Server(_) => {}
        PhaseTarget::DeploymentGroup(group_target) => {
            if let Some(environment) = &group_target.environment {
                result
                    .referenced_resources
                    .environments
                    .push(environment.clone());
                if options.validate_resources
                    && services.resource_store.environments.get(environment).is_none()
                {
                    result
                        .unauthorized_resources
                        .environments
                        .push(environment.clone());
                    result.error(
                        codes::ENVIRONMENT_NOT_FOUND,
                        format!("Phase '{phase_name}': environment could not be found"),
                    );
                }
            }
        }
    }

    // Keep a single minimum-agent-version demand: the highest across task
    // and target demands.
    let mut minimum = max_agent_version_and_remove(task_demands);
    if let Some(demands) = target.demands_mut() {
        let target_minimum = max_agent_version_and_remove(demands);
        minimum = match (minimum, target_minimum) {
            (Some(a), Some(b)) => {
                let a_value = a.value.clone().unwrap_or_default();
                let b_value = b.value.clone().unwrap_or_default();
                if gantry_core::task::compare_versions(&a_value, &b_value)
                    == std::cmp::Ordering::Greater
                {
                    Some(a)
                } else {
                    Some(b)
                }
            }
            (Some(a), None) => Some(a),
            (None, b) => b,
        };

        if include_task_demands && options.rollup_step_demands {
            for demand in task_demands.iter() {
                if !demands.contains(demand) {
                    demands.push(demand.clone());
                }
            }
        }

        if let Some(minimum) = minimum {
            if !demands.contains(&minimum) {
                demands.push(minimum);
            }
        }
    }
}
