//! Job expansion.
//!
//! Turns one phase (or job factory) into the ordered list of concrete jobs
//! it fans out to: one per strategy configuration, matrix entry, or slice.
//! Expansion is deterministic (the same inputs produce the same jobs in
//! the same order) and bounded by
//! [`crate::options::ExecutionOptions::max_job_expansion`], which aborts the
//! whole phase rather than producing a partial job list.

use crate::context::{JobExecutionContext, PhaseExecutionContext};
use crate::nodes::{phase_display_name, JobFactory, Phase, PhaseCommon};
use crate::options::JobExpansionOptions;
use gantry_core::constants::{
    self, parallel_execution_type, well_known_variables, DEFAULT_JOB_CANCEL_TIMEOUT_MINUTES,
    DEFAULT_JOB_DISPLAY_NAME, DEFAULT_JOB_TIMEOUT_MINUTES,
};
use gantry_core::error::{Error, Result};
use gantry_core::expression::ExpressionValue;
use gantry_core::job::{Job, JobInstance};
use gantry_core::names::is_legal_node_name;
use gantry_core::resources::AgentQueueReference;
use gantry_core::step::{ActionStep, GroupStep, Step, TaskStep};
use gantry_core::target::{AgentQueueTarget, PhaseTarget};
use gantry_core::task::max_agent_version_and_remove;
use gantry_core::variables::{Variable, VariableValue};
use indexmap::IndexMap;
use tracing::{debug, info};

/// One configuration emitted by strategy evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyConfiguration {
    /// Stable identifier for retry/attempt correlation; must be unique
    /// within the strategy.
    pub name: String,
    pub display_name: Option<String>,
    /// Data bound for per-configuration expression evaluation, e.g.
    /// `matrix.*` values.
    pub context_data: IndexMap<String, serde_json::Value>,
}

/// The outcome of evaluating a strategy template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyResult {
    pub fail_fast: bool,
    /// 0 means unlimited.
    pub max_parallel: usize,
    pub configurations: Vec<StrategyConfiguration>,
}

impl StrategyResult {
    /// The strategy used when no template is present: one default job.
    pub fn single_default(display_name: Option<String>) -> Self {
        Self {
            fail_fast: false,
            max_parallel: 0,
            configurations: vec![StrategyConfiguration {
                name: constants::DEFAULT_JOB_NAME.to_string(),
                display_name,
                context_data: IndexMap::new(),
            }],
        }
    }
}

/// Host-supplied interpreter for the strategy/matrix DSL. The expansion
/// engine treats the DSL as a black box returning an ordered configuration
/// list.
pub trait StrategyEvaluator {
    fn evaluate_strategy(
        &self,
        strategy: &serde_json::Value,
        default_display_name: Option<&str>,
    ) -> Result<StrategyResult>;

    /// Evaluates a job-target template against one configuration's bound
    /// context data.
    fn evaluate_job_target(
        &self,
        target: &serde_json::Value,
        context_data: &IndexMap<String, serde_json::Value>,
    ) -> Result<Option<PhaseTarget>>;
}

/// The product of expanding one phase.
#[derive(Debug, Default)]
pub struct ExpandPhaseResult {
    /// Populated job contexts, in emission order. Downstream dispatch must
    /// preserve this order for deterministic numbering, but may execute up
    /// to `max_concurrency` of them in parallel.
    pub contexts: Vec<JobExecutionContext>,
    pub max_concurrency: i64,
    pub fail_fast: bool,
    pub continue_on_error: bool,
}

impl ExpandPhaseResult {
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.contexts.iter().map(|c| &c.definition)
    }
}

/// Expands a job factory per its strategy.
pub fn expand_job_factory(
    context: &mut PhaseExecutionContext<'_>,
    factory: &JobFactory,
    strategy_evaluator: Option<&dyn StrategyEvaluator>,
    options: Option<&JobExpansionOptions>,
) -> Result<ExpandPhaseResult> {
    let strategy = resolve_strategy(factory, strategy_evaluator)?;
    let contexts = expand_factory_contexts(context, factory, strategy_evaluator, &strategy, options)?;

    let max_concurrency = if strategy.max_parallel > 0 {
        strategy.max_parallel as i64
    } else {
        contexts.len() as i64
    };

    let continue_on_error = context.evaluate(
        "continueOnError",
        factory.common.continue_on_error.as_ref(),
        false,
        false,
    )?;

    Ok(ExpandPhaseResult {
        contexts,
        max_concurrency,
        fail_fast: strategy.fail_fast,
        continue_on_error,
    })
}

/// Expands a factory into job contexts without computing result-level
/// concurrency. Used directly when re-creating a single job.
pub fn expand_factory_contexts(
    context: &mut PhaseExecutionContext<'_>,
    factory: &JobFactory,
    strategy_evaluator: Option<&dyn StrategyEvaluator>,
    strategy: &StrategyResult,
    options: Option<&JobExpansionOptions>,
) -> Result<Vec<JobExecutionContext>> {
    let limit = context.execution_options.max_job_expansion;
    if strategy.configurations.len() > limit {
        return Err(Error::MaxJobExpansion {
            count: strategy.configurations.len(),
            limit,
        });
    }

    let total = strategy.configurations.len();
    let mut contexts = Vec::new();
    for (index, configuration) in strategy.configurations.iter().enumerate() {
        let mut attempt = 0;
        if let Some(options) = options
            && !options.is_empty()
        {
            // A filter that omits this configuration skips it entirely.
            match options.attempt_for(&configuration.name) {
                Some(requested) => attempt = requested,
                None => continue,
            }
        }

        // Without an explicit request, a previously attempted configuration
        // continues from its last attempt.
        if attempt < 1
            && let Some(previous) = &context.previous_attempt
            && let Some(previous_job) = previous.job(&configuration.name)
        {
            attempt = previous_job.attempt + 1;
        }
        let attempt = attempt.max(1);

        contexts.push(create_factory_job(
            context,
            factory,
            strategy_evaluator,
            configuration,
            attempt,
            index + 1,
            total,
        )?);
    }

    Ok(contexts)
}

fn resolve_strategy(
    factory: &JobFactory,
    strategy_evaluator: Option<&dyn StrategyEvaluator>,
) -> Result<StrategyResult> {
    // A display-name expression cannot provide per-configuration defaults up
    // front; the per-job evaluation supplies them later.
    let default_display_name = match &factory.job_display_name {
        Some(ExpressionValue::Expr(_)) => None,
        _ => factory.common.display_name.clone(),
    };

    match &factory.strategy {
        None => Ok(StrategyResult::single_default(default_display_name)),
        Some(token) => {
            debug!("Evaluating strategy");
            let evaluator = strategy_evaluator.ok_or_else(|| {
                Error::Expression(
                    "A strategy evaluator is required to expand this job factory".to_string(),
                )
            })?;
            evaluator.evaluate_strategy(token, default_display_name.as_deref())
        }
    }
}

fn create_factory_job(
    context: &mut PhaseExecutionContext<'_>,
    factory: &JobFactory,
    strategy_evaluator: Option<&dyn StrategyEvaluator>,
    configuration: &StrategyConfiguration,
    attempt: u32,
    position_in_phase: usize,
    total_jobs_in_phase: usize,
) -> Result<JobExecutionContext> {
    info!(job = %configuration.name, "Creating job");

    let job_instance = JobInstance::new(configuration.name.clone(), attempt);
    let mut job_context = JobExecutionContext {
        instance_name: context.job_instance_name(&job_instance),
        job: job_instance,
        position_in_phase,
        total_jobs_in_phase,
        variables: context.variables.clone(),
        context_data: configuration.context_data.clone(),
        referenced_resources: Default::default(),
        definition: Job::default(),
    };

    let mut job = Job {
        id: gantry_core::ids::JobId::from_uuid(context.job_instance_id(&job_context.job)),
        name: job_context.job.name.clone(),
        ..Job::default()
    };

    // Display name: an expression wins, then the configuration-supplied
    // name, then the factory's own display name.
    job.display_name = if matches!(&factory.job_display_name, Some(ExpressionValue::Expr(_))) {
        let default = factory.common.display_name.clone().unwrap_or_default();
        Some(job_context.evaluate(
            context.evaluator,
            "jobDisplayName",
            factory.job_display_name.as_ref(),
            default,
            false,
        )?)
    } else if let Some(display_name) = &configuration.display_name
        && !display_name.is_empty()
    {
        Some(display_name.clone())
    } else {
        factory.common.display_name.clone()
    };

    job.timeout_in_minutes = Some(job_context.evaluate(
        context.evaluator,
        "jobTimeout",
        factory.job_timeout.as_ref(),
        DEFAULT_JOB_TIMEOUT_MINUTES,
        true,
    )?);
    job.cancel_timeout_in_minutes = Some(job_context.evaluate(
        context.evaluator,
        "jobCancelTimeout",
        factory.job_cancel_timeout.as_ref(),
        DEFAULT_JOB_CANCEL_TIMEOUT_MINUTES,
        true,
    )?);

    // Target: the per-job template if present, otherwise the factory target.
    debug!("Evaluating target");
    let mut target = match (&factory.job_target, strategy_evaluator) {
        (Some(token), Some(evaluator)) => {
            evaluator.evaluate_job_target(token, &job_context.context_data)?
        }
        _ => None,
    }
    .or_else(|| factory.common.target.clone())
    .unwrap_or_default();

    resolve_queue_by_name(context, &mut target);
    job.target = Some(target);

    add_self_repository(context, &mut job_context, true)?;

    set_job_system_variables(&mut job_context, &job);

    let identifier = context.job_identifier(&job_context.job.name);
    job.steps = convert_steps(context, &job_context, &identifier, &factory.steps)?;

    job_context.definition = job;
    Ok(job_context)
}

/// Expands a phase per its target's slicing semantics.
pub fn expand_phase(
    context: &mut PhaseExecutionContext<'_>,
    phase: &Phase,
    options: Option<&JobExpansionOptions>,
) -> Result<ExpandPhaseResult> {
    let target = phase
        .common
        .target
        .clone()
        .ok_or_else(|| Error::Internal(format!("Phase '{}' has no target", phase.common.name)))?;

    let common = target.common();
    let continue_on_error =
        context.evaluate("continueOnError", common.continue_on_error.as_ref(), false, false)?;
    let timeout = context.evaluate(
        "timeoutInMinutes",
        common.timeout_in_minutes.as_ref(),
        DEFAULT_JOB_TIMEOUT_MINUTES,
        true,
    )?;
    let cancel_timeout = context.evaluate(
        "cancelTimeoutInMinutes",
        common.cancel_timeout_in_minutes.as_ref(),
        DEFAULT_JOB_CANCEL_TIMEOUT_MINUTES,
        true,
    )?;

    match &target {
        PhaseTarget::Queue(queue_target) => {
            let contexts = generate_job_contexts(
                context,
                phase,
                &target,
                queue_target,
                continue_on_error,
                timeout,
                cancel_timeout,
                options,
            )?;

            let requested = context.evaluate(
                "maxConcurrency",
                queue_target
                    .execution
                    .as_ref()
                    .and_then(|e| e.max_concurrency.as_ref()),
                0,
                false,
            )?;

            // 0 or less is shorthand for "no limit": one slot per job.
            let max_concurrency = if requested <= 0 {
                contexts.len() as i64
            } else {
                requested
            };

            Ok(ExpandPhaseResult {
                contexts,
                max_concurrency,
                fail_fast: false,
                continue_on_error,
            })
        }
        PhaseTarget::Pool(_) | PhaseTarget::Server(_) | PhaseTarget::DeploymentGroup(_) => {
            // These targets expand to a single job.
            let mut contexts = Vec::new();
            let configuration = constants::DEFAULT_JOB_NAME;
            if options.is_none_or(|o| o.is_included(configuration)) {
                generate_context(
                    context,
                    phase,
                    &target,
                    continue_on_error,
                    timeout,
                    cancel_timeout,
                    options,
                    GeneratedConfiguration {
                        display_name: phase_display_name(&phase.common, None),
                        configuration: configuration.to_string(),
                        configuration_variables: None,
                        parallel_execution_type: None,
                        position_in_phase: 1,
                        total_jobs_in_phase: 1,
                    },
                    &mut contexts,
                )?;
            }

            Ok(ExpandPhaseResult {
                contexts,
                max_concurrency: 1,
                fail_fast: false,
                continue_on_error,
            })
        }
    }
}

/// Re-creates a single named job from a phase, as used for retries.
pub fn create_phase_job_context(
    context: &mut PhaseExecutionContext<'_>,
    phase: &Phase,
    job_name: &str,
    attempt: u32,
) -> Result<Option<JobExecutionContext>> {
    let options = JobExpansionOptions::single(job_name, attempt);
    let mut result = expand_phase(context, phase, Some(&options))?;
    Ok(if result.contexts.is_empty() {
        None
    } else {
        Some(result.contexts.remove(0))
    })
}

struct GeneratedConfiguration {
    display_name: String,
    configuration: String,
    configuration_variables: Option<IndexMap<String, String>>,
    parallel_execution_type: Option<&'static str>,
    position_in_phase: usize,
    total_jobs_in_phase: usize,
}

#[allow(clippy::too_many_arguments)]
fn generate_job_contexts(
    context: &mut PhaseExecutionContext<'_>,
    phase: &Phase,
    target: &PhaseTarget,
    queue_target: &AgentQueueTarget,
    continue_on_error: bool,
    timeout: u32,
    cancel_timeout: u32,
    options: Option<&JobExpansionOptions>,
) -> Result<Vec<JobExecutionContext>> {
    let mut contexts = Vec::new();
    let execution = queue_target.execution.clone().unwrap_or_default();

    if let Some(matrix) = &execution.matrix {
        let matrix_value = context.evaluate(
            "matrix",
            Some(matrix),
            IndexMap::<String, IndexMap<String, String>>::new(),
            false,
        )?;

        let total = matrix_value.len();
        for (position, (configuration, configuration_variables)) in
            matrix_value.iter().enumerate()
        {
            let position_in_phase = position + 1;

            // Matrix keys are user input and become node names, so illegal
            // keys are renamed (or merely warned about, per policy).
            let mut ref_name = configuration.clone();
            if !is_legal_node_name(&ref_name, context.execution_options.allow_hyphen_names) {
                let legal_name = format!("{DEFAULT_JOB_DISPLAY_NAME}{position_in_phase}");
                info!(
                    "\"{ref_name}\" is not a legal node name; node will be named \"{legal_name}\""
                );
                if context.execution_options.enforce_legal_node_names {
                    ref_name = legal_name;
                }
            }

            if options.is_none_or(|o| o.is_included(&ref_name)) {
                generate_context(
                    context,
                    phase,
                    target,
                    continue_on_error,
                    timeout,
                    cancel_timeout,
                    options,
                    GeneratedConfiguration {
                        display_name: phase_display_name(&phase.common, Some(configuration.as_str())),
                        configuration: ref_name,
                        configuration_variables: Some(configuration_variables.clone()),
                        parallel_execution_type: Some(
                            parallel_execution_type::MULTI_CONFIGURATION,
                        ),
                        position_in_phase,
                        total_jobs_in_phase: total,
                    },
                    &mut contexts,
                )?;
            }
        }
    } else if let Some(max_concurrency) = &execution.max_concurrency {
        let mut requested = context.evaluate("maxConcurrency", Some(max_concurrency), 1, true)?;

        // The hosting ceiling always takes precedence over the user request.
        if let Some(ceiling) = context.execution_options.max_parallelism
            && requested > ceiling
        {
            requested = ceiling;
        }

        if requested > 1 {
            match options {
                None => {
                    generate_all_slices(
                        context,
                        phase,
                        target,
                        continue_on_error,
                        timeout,
                        cancel_timeout,
                        options,
                        requested,
                        &mut contexts,
                    )?;
                }
                Some(filter) if filter.is_empty() => {
                    generate_all_slices(
                        context,
                        phase,
                        target,
                        continue_on_error,
                        timeout,
                        cancel_timeout,
                        options,
                        requested,
                        &mut contexts,
                    )?;
                }
                Some(filter) => {
                    // Re-derive each requested slice index from its name.
                    for configuration in filter.configurations.keys() {
                        let prefix = DEFAULT_JOB_DISPLAY_NAME;
                        let position_in_phase = configuration
                            .get(..prefix.len())
                            .filter(|head| head.eq_ignore_ascii_case(prefix))
                            .and_then(|_| configuration[prefix.len()..].parse::<usize>().ok())
                            .ok_or_else(|| {
                                Error::PipelineNotValid(format!(
                                    "'{configuration}' is not a valid slice configuration name"
                                ))
                            })?;

                        generate_context(
                            context,
                            phase,
                            target,
                            continue_on_error,
                            timeout,
                            cancel_timeout,
                            options,
                            GeneratedConfiguration {
                                display_name: phase_display_name(
                                    &phase.common,
                                    Some(position_in_phase.to_string().as_str()),
                                ),
                                configuration: configuration.clone(),
                                configuration_variables: None,
                                parallel_execution_type: Some(
                                    parallel_execution_type::MULTI_MACHINE,
                                ),
                                position_in_phase,
                                total_jobs_in_phase: requested as usize,
                            },
                            &mut contexts,
                        )?;
                    }
                }
            }
        }
    }

    // If nothing else produced a context, create the default job.
    if contexts.is_empty() {
        let configuration = constants::DEFAULT_JOB_NAME;
        if options.is_none_or(|o| o.is_included(configuration)) {
            generate_context(
                context,
                phase,
                target,
                continue_on_error,
                timeout,
                cancel_timeout,
                options,
                GeneratedConfiguration {
                    display_name: phase_display_name(&phase.common, None),
                    configuration: configuration.to_string(),
                    configuration_variables: None,
                    parallel_execution_type: None,
                    position_in_phase: 1,
                    total_jobs_in_phase: 1,
                },
                &mut contexts,
            )?;
        }
    }

    Ok(contexts)
}

#[allow(clippy::too_many_arguments)]
fn generate_all_slices(
    context: &mut PhaseExecutionContext<'_>,
    phase: &Phase,
    target: &PhaseTarget,
    continue_on_error: bool,
    timeout: u32,
    cancel_timeout: u32,
    options: Option<&JobExpansionOptions>,
    slices: i64,
    contexts: &mut Vec<JobExecutionContext>,
) -> Result<()> {
    for position_in_phase in 1..=slices as usize {
        // For historical reasons the reference name of a slice is "Job"
        // plus the slice number: "Job1".
        generate_context(
            context,
            phase,
            target,
            continue_on_error,
            timeout,
            cancel_timeout,
            options,
            GeneratedConfiguration {
                display_name: phase_display_name(
                    &phase.common,
                    Some(position_in_phase.to_string().as_str()),
                ),
                configuration: format!("{DEFAULT_JOB_DISPLAY_NAME}{position_in_phase}"),
                configuration_variables: None,
                parallel_execution_type: Some(parallel_execution_type::MULTI_MACHINE),
                position_in_phase,
                total_jobs_in_phase: slices as usize,
            },
            contexts,
        )?;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn generate_context(
    context: &mut PhaseExecutionContext<'_>,
    phase: &Phase,
    target: &PhaseTarget,
    continue_on_error: bool,
    timeout: u32,
    cancel_timeout: u32,
    options: Option<&JobExpansionOptions>,
    generated: GeneratedConfiguration,
    contexts: &mut Vec<JobExecutionContext>,
) -> Result<()> {
    let configuration = if generated.configuration.is_empty() {
        constants::DEFAULT_JOB_NAME.to_string()
    } else {
        generated.configuration
    };

    // Attempt number: an explicit request wins; a previously attempted
    // configuration continues from its last attempt; the floor is 1.
    let mut attempt = options
        .and_then(|o| o.attempt_for(&configuration))
        .unwrap_or(0);
    if attempt < 1
        && let Some(previous) = &context.previous_attempt
        && let Some(previous_job) = previous.job(&configuration)
    {
        attempt = previous_job.attempt + 1;
    }
    let attempt = attempt.max(1);

    let job_instance = JobInstance::new(configuration, attempt);
    let mut job_context = JobExecutionContext {
        instance_name: context.job_instance_name(&job_instance),
        job: job_instance,
        position_in_phase: generated.position_in_phase,
        total_jobs_in_phase: generated.total_jobs_in_phase,
        variables: context.variables.clone(),
        context_data: IndexMap::new(),
        referenced_resources: Default::default(),
        definition: Job::default(),
    };

    if let Some(kind) = generated.parallel_execution_type {
        job_context.variables.set_system(
            well_known_variables::PARALLEL_EXECUTION_TYPE,
            VariableValue::new(kind),
        );
    }

    if let Some(configuration_variables) = generated.configuration_variables {
        job_context
            .variables
            .set_user_variables(configuration_variables);
    }

    let job = phase_create_job(
        context,
        &phase.common,
        &phase.steps,
        target,
        &mut job_context,
        continue_on_error,
        timeout,
        cancel_timeout,
        generated.display_name,
    )?;
    job_context.definition = job;

    contexts.push(job_context);

    // Fail fast the moment the running total crosses the ceiling; never
    // build the full oversized list first.
    if contexts.len() > context.execution_options.max_job_expansion {
        return Err(Error::MaxJobExpansion {
            count: contexts.len(),
            limit: context.execution_options.max_job_expansion,
        });
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn phase_create_job(
    context: &mut PhaseExecutionContext<'_>,
    phase: &PhaseCommon,
    steps: &[Step],
    target: &PhaseTarget,
    job_context: &mut JobExecutionContext,
    continue_on_error: bool,
    timeout: u32,
    cancel_timeout: u32,
    display_name: String,
) -> Result<Job> {
    let display_name = if display_name.trim().is_empty() {
        phase_display_name(phase, None)
    } else {
        display_name
    };

    let mut job = Job {
        id: gantry_core::ids::JobId::from_uuid(context.job_instance_id(&job_context.job)),
        name: job_context.job.name.clone(),
        display_name: Some(display_name),
        continue_on_error,
        timeout_in_minutes: Some(timeout),
        cancel_timeout_in_minutes: Some(cancel_timeout),
        ..Job::default()
    };

    let mut job_target = target.clone();
    if context.execution_options.enable_resource_expressions {
        evaluate_queue_expressions(context, job_context, &mut job_target)?;
    }
    resolve_queue_by_name(context, &mut job_target);

    // The workspace travels from the queue target onto every job.
    if let Some(queue_target) = job_target.as_queue() {
        job.workspace = queue_target.workspace.clone();
    }

    add_self_repository(context, job_context, false)?;

    // Containers are resolved from aliases to known container resources.
    if let Some(queue_target) = job_target.as_queue() {
        if let Some(container) = &queue_target.container {
            let alias = job_context.evaluate(
                context.evaluator,
                "container",
                Some(container),
                String::new(),
                false,
            )?;
            job.container = Some(resolve_container(context, job_context, &alias)?);
        }

        for (service, sidecar) in &queue_target.sidecar_containers {
            let alias = job_context.evaluate(
                context.evaluator,
                "sidecarContainer",
                Some(sidecar),
                String::new(),
                false,
            )?;
            let resolved = resolve_container(context, job_context, &alias)?;
            job.sidecar_containers.insert(service.clone(), resolved);
        }
    }

    set_job_system_variables(job_context, &job);

    let identifier = context.job_identifier(&job_context.job.name);
    job.steps = convert_steps(context, job_context, &identifier, steps)?;

    // Phase demands, with macros expanded against the job's variables.
    for demand in target.demands() {
        let mut resolved = demand.clone();
        if let Some(value) = &resolved.value {
            resolved.value = Some(job_context.variables.expand_macros(value, true));
        }
        job.add_demand(resolved);
    }
    if let Some(minimum) = max_agent_version_and_remove(&mut job.demands) {
        job.demands.push(minimum);
    }

    job.target = Some(job_target);

    // The job is persisted and read back before its request message is
    // produced, so the context variables are copied into it. Secret values
    // are never serialized.
    for (name, value) in job_context.variables.iter() {
        job.variables.push(Variable {
            name: name.clone(),
            value: if value.is_secret {
                None
            } else {
                value.value.clone()
            },
            secret: value.is_secret,
        });
    }

    Ok(job)
}

/// Resolves a literal queue name into a stable `{id, name}` pair; the
/// orchestration engine requires numeric stability.
fn resolve_queue_by_name(context: &mut PhaseExecutionContext<'_>, target: &mut PhaseTarget) {
    if let Some(queue_target) = target.as_queue_mut()
        && let Some(queue) = &queue_target.queue
        && queue.id == 0
        && let Some(ExpressionValue::Literal(name)) = &queue.name
        && !name.is_empty()
        && let Some(resolved) = context.resource_store.queues.get_by_name(name)
    {
        queue_target.queue = Some(AgentQueueReference {
            id: resolved.id,
            name: Some(ExpressionValue::Literal(resolved.name)),
        });
    }
}

/// Resolves queue-name expressions and macros into literals for this job.
fn evaluate_queue_expressions(
    context: &PhaseExecutionContext<'_>,
    job_context: &JobExecutionContext,
    target: &mut PhaseTarget,
) -> Result<()> {
    if let Some(queue_target) = target.as_queue_mut()
        && let Some(queue) = &mut queue_target.queue
        && let Some(name) = &queue.name
    {
        let literal = match name {
            ExpressionValue::Literal(literal) => {
                job_context.variables.expand_macros(literal, false)
            }
            ExpressionValue::Expr(_) => job_context.evaluate(
                context.evaluator,
                "queueName",
                Some(name),
                String::new(),
                false,
            )?,
        };
        queue.name = Some(ExpressionValue::Literal(literal));
    }

    Ok(())
}

/// Registers the pipeline's own repository (and its endpoint) with the job.
/// Factories require the `self` alias; phases fall back to the designer
/// repository.
fn add_self_repository(
    context: &mut PhaseExecutionContext<'_>,
    job_context: &mut JobExecutionContext,
    require_self: bool,
) -> Result<()> {
    let repository = match context.resource_store.repositories.get(constants::SELF_ALIAS) {
        Some(repository) => repository.clone(),
        None if require_self => {
            return Err(Error::ResourceNotFound(format!(
                "Repository '{}' not found",
                constants::SELF_ALIAS
            )));
        }
        None => match context
            .resource_store
            .repositories
            .get(constants::DESIGNER_REPO_ALIAS)
        {
            Some(repository) => repository.clone(),
            None => {
                return Err(Error::ResourceNotFound(format!(
                    "Repository '{}' not found",
                    constants::SELF_ALIAS
                )));
            }
        },
    };

    job_context.referenced_resources.add_repository(&repository);

    if let Some(endpoint) = repository.endpoint() {
        job_context
            .referenced_resources
            .add_endpoint_reference(&endpoint);
        let resolved = context.resource_store.endpoints.get(&endpoint);
        if resolved.is_none() {
            return Err(Error::ResourceNotFound(format!(
                "Service endpoint for repository '{}' not found",
                repository.alias
            )));
        }
    }

    Ok(())
}

fn resolve_container(
    context: &mut PhaseExecutionContext<'_>,
    job_context: &mut JobExecutionContext,
    alias: &str,
) -> Result<String> {
    let container = context
        .resource_store
        .containers
        .get(alias)
        .cloned()
        .ok_or_else(|| Error::ResourceNotFound(format!("Container '{alias}' not found")))?;

    if !job_context
        .referenced_resources
        .containers
        .iter()
        .any(|c| c.alias.eq_ignore_ascii_case(&container.alias))
    {
        job_context.referenced_resources.containers.push(container);
    }

    Ok(alias.to_string())
}

/// Job-scoped system variables, set before step materialization so step
/// input macro expansion can see them.
fn set_job_system_variables(job_context: &mut JobExecutionContext, job: &Job) {
    job_context.variables.set_system(
        well_known_variables::JOB_DISPLAY_NAME,
        VariableValue {
            value: job.display_name.clone(),
            is_secret: false,
        },
    );
    job_context.variables.set_system(
        well_known_variables::JOB_ID,
        VariableValue::new(job.id.to_string()),
    );
    job_context.variables.set_system(
        well_known_variables::JOB_NAME,
        VariableValue::new(job.name.clone()),
    );
}

/// Converts template steps into job steps, branching on step type. Template
/// steps must already have been resolved away by the build.
fn convert_steps(
    context: &PhaseExecutionContext<'_>,
    job_context: &JobExecutionContext,
    job_identifier: &str,
    steps: &[Step],
) -> Result<Vec<Step>> {
    let mut converted = Vec::with_capacity(steps.len());
    for step in steps {
        match step {
            Step::Task(task) => converted.push(Step::Task(create_job_task_step(
                context,
                job_context,
                job_identifier,
                task,
            )?)),
            Step::Group(group) => converted.push(Step::Group(create_job_group_step(
                context,
                job_context,
                job_identifier,
                group,
            )?)),
            Step::Action(action) => converted.push(Step::Action(create_job_action_step(
                context,
                job_identifier,
                action,
            ))),
            Step::TaskTemplate(template) => {
                return Err(Error::Internal(format!(
                    "Unexpected unresolved template step '{}'",
                    template.name
                )));
            }
        }
    }

    Ok(converted)
}

fn create_job_task_step(
    context: &PhaseExecutionContext<'_>,
    job_context: &JobExecutionContext,
    job_identifier: &str,
    task: &TaskStep,
) -> Result<TaskStep> {
    let mut step = task.clone();
    let task_identifier = context
        .id_generator
        .instance_name(&[job_identifier, &task.name]);
    step.id = context.id_generator.instance_id(&task_identifier);
    if let Some(display_name) = &step.display_name {
        step.display_name = Some(job_context.variables.expand_macros(display_name, true));
    }

    // A task whose definition has disappeared since validation cannot be
    // dispatched.
    if let Some(task_store) = context.task_store
        && let Some(reference) = &step.reference
    {
        let spec = if !reference.id.is_nil() {
            gantry_stores::TaskSpec::Id(reference.id)
        } else {
            gantry_stores::TaskSpec::Name(&reference.name)
        };
        if task_store.resolve_task(spec, &reference.version).is_none() {
            return Err(Error::TaskDefinitionNotFound(format!(
                "{}@{}",
                reference.name, reference.version
            )));
        }
    }

    Ok(step)
}

fn create_job_group_step(
    context: &PhaseExecutionContext<'_>,
    job_context: &JobExecutionContext,
    job_identifier: &str,
    group: &GroupStep,
) -> Result<GroupStep> {
    let mut step = group.clone();
    let group_identifier = context
        .id_generator
        .instance_name(&[job_identifier, &group.name]);
    step.id = context.id_generator.instance_id(&group_identifier);
    if let Some(display_name) = &step.display_name {
        step.display_name = Some(job_context.variables.expand_macros(display_name, true));
    }

    step.steps = group
        .steps
        .iter()
        .map(|task| create_job_task_step(context, job_context, &group_identifier, task))
        .collect::<Result<Vec<_>>>()?;
    Ok(step)
}

fn create_job_action_step(
    context: &PhaseExecutionContext<'_>,
    job_identifier: &str,
    action: &ActionStep,
) -> ActionStep {
    let mut step = action.clone();
    let action_identifier = context
        .id_generator
        .instance_name(&[job_identifier, &action.name]);
    step.id = context.id_generator.instance_id(&action_identifier);
    step
}
