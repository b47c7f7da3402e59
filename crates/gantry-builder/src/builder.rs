//! Top-level pipeline construction.

use crate::context::{PhaseAttempt, PhaseExecutionContext, PhaseInstance, StageInstance};
use crate::environment::{PipelineBuildResult, PipelineEnvironment};
use crate::nodes::{PhaseNode, PipelineProcess, Stage};
use crate::options::{BuildOptions, ExecutionOptions};
use crate::validation::{validate_process, PipelineValidationError, ValidationResult, ValidationServices};
use gantry_core::error::{Error, Result};
use gantry_core::expression::{ExpressionEvaluator, UnsupportedEvaluator};
use gantry_core::ids::{DeterministicIdGenerator, PipelineIdGenerator};
use gantry_core::job::WorkspaceOptions;
use gantry_core::resources::{AgentQueueReference, CheckoutOptions};
use gantry_core::step::Step;
use gantry_core::target::{AgentQueueTarget, PhaseTarget};
use gantry_core::variables::{Variable, VariablesMap};
use gantry_stores::{CounterStore, InMemoryCounterStore, ResourceStore, TaskStore, TaskTemplateStore};

/// Defaults the hosting environment applies while building. Immutable for
/// the lifetime of a builder.
#[derive(Default)]
pub struct BuilderConfig {
    /// Assigned to queue targets which do not specify a queue.
    pub default_queue: Option<AgentQueueReference>,
    /// Paired with the default queue when the target has no specification.
    pub default_agent_specification: Option<serde_json::Value>,
    /// Propagated onto repository resources lacking explicit options.
    pub default_checkout_options: Option<CheckoutOptions>,
    /// Propagated onto queue targets lacking explicit workspace options.
    pub default_workspace_options: Option<WorkspaceOptions>,
    pub execution_options: ExecutionOptions,
    pub environment_version: Option<i32>,
}

/// Builds validated, resource-resolved pipeline processes.
///
/// The builder owns the stores for one build scope. Validation errors are
/// data on the returned result, never panics or errors; only
/// impossible-to-continue configuration states (a template step without a
/// template store, expansion past the job ceiling, a missing `self`
/// repository) surface as [`Error`].
pub struct PipelineBuilder {
    config: BuilderConfig,
    pub resource_store: ResourceStore,
    task_store: Option<Box<dyn TaskStore>>,
    template_store: Option<Box<dyn TaskTemplateStore>>,
    counter_store: Box<dyn CounterStore>,
    id_generator: Box<dyn PipelineIdGenerator>,
    evaluator: Box<dyn ExpressionEvaluator>,
    user_variables: Vec<Variable>,
    system_variables: Vec<Variable>,
}

impl PipelineBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        Self {
            config,
            resource_store: ResourceStore::new(),
            task_store: None,
            template_store: None,
            counter_store: Box::new(InMemoryCounterStore::new()),
            id_generator: Box::new(DeterministicIdGenerator),
            evaluator: Box::new(UnsupportedEvaluator),
            user_variables: Vec::new(),
            system_variables: Vec::new(),
        }
    }

    pub fn with_task_store(mut self, store: Box<dyn TaskStore>) -> Self {
        self.task_store = Some(store);
        self
    }

    pub fn with_template_store(mut self, store: Box<dyn TaskTemplateStore>) -> Self {
        self.template_store = Some(store);
        self
    }

    pub fn with_counter_store(mut self, store: Box<dyn CounterStore>) -> Self {
        self.counter_store = store;
        self
    }

    pub fn with_id_generator(mut self, generator: Box<dyn PipelineIdGenerator>) -> Self {
        self.id_generator = generator;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Box<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn add_user_variable(&mut self, variable: Variable) {
        self.user_variables.push(variable);
    }

    pub fn add_system_variable(&mut self, variable: Variable) {
        self.system_variables.push(variable);
    }

    /// Builds a process from bare phases, wrapped in the implicit stage.
    pub fn build_phases(
        &mut self,
        phases: Vec<PhaseNode>,
        options: &BuildOptions,
    ) -> Result<PipelineBuildResult> {
        if phases.is_empty() {
            return Err(Error::InvalidPipeline("No phases were provided".to_string()));
        }
        self.build(vec![Stage::implicit(phases)], options)
    }

    /// Builds a validated process plus its output environment.
    pub fn build(
        &mut self,
        stages: Vec<Stage>,
        options: &BuildOptions,
    ) -> Result<PipelineBuildResult> {
        if stages.is_empty() {
            return Err(Error::InvalidPipeline("No stages were provided".to_string()));
        }

        // Propagate default checkout options onto repositories that do not
        // set their own. First wins; existing options are never replaced.
        if let Some(default_checkout) = &self.config.default_checkout_options {
            for repository in self.resource_store.repositories.get_all_mut() {
                if repository.checkout_options().is_none() {
                    repository.set_checkout_options(default_checkout);
                }
            }
        }

        let mut process = self.create_process(stages)?;

        let mut result = ValidationResult::new();
        let mut services = ValidationServices {
            resource_store: &mut self.resource_store,
            task_store: self.task_store.as_deref(),
        };
        validate_process(&mut services, &mut process, options, &mut result);

        // Materialize the output environment: counters, every authorized
        // resource, then user variables before system variables so the
        // system wins on collision in downstream merges.
        let mut environment = PipelineEnvironment::default();
        if let Some(version) = self.config.environment_version {
            environment.version = version;
        }
        environment.options = Some(self.config.execution_options.clone());
        environment.counters = self.counter_store.counters();
        environment
            .resources
            .merge_with(&self.resource_store.get_authorized_resources());
        environment.user_variables = self.user_variables.clone();
        environment.system_variables = self.system_variables.clone();

        result.environment = Some(environment.clone());

        Ok(PipelineBuildResult {
            environment,
            process,
            result,
        })
    }

    /// Validates an existing process without producing an environment.
    pub fn validate(
        &mut self,
        process: &mut PipelineProcess,
        options: &BuildOptions,
    ) -> Vec<PipelineValidationError> {
        let mut result = ValidationResult::new();
        let mut services = ValidationServices {
            resource_store: &mut self.resource_store,
            task_store: self.task_store.as_deref(),
        };
        validate_process(&mut services, process, options, &mut result);
        result.errors
    }

    /// Collects the resources referenced by a bare step list, without
    /// building a full process.
    pub fn referenced_resources(
        &mut self,
        steps: Vec<Step>,
        target: Option<PhaseTarget>,
    ) -> gantry_core::resources::PipelineResources {
        let phase = PhaseNode::Phase(crate::nodes::Phase {
            common: crate::nodes::PhaseCommon {
                name: gantry_core::constants::DEFAULT_JOB_NAME.to_string(),
                target,
                ..crate::nodes::PhaseCommon::default()
            },
            steps,
        });

        let mut process = PipelineProcess {
            stages: vec![Stage::implicit(vec![phase])],
        };

        let mut result = ValidationResult::new();
        let mut services = ValidationServices {
            resource_store: &mut self.resource_store,
            task_store: self.task_store.as_deref(),
        };
        validate_process(&mut services, &mut process, &BuildOptions::default(), &mut result);
        result.referenced_resources
    }

    /// Creates an execution context for expanding one phase of the process.
    pub fn create_phase_execution_context(
        &mut self,
        stage: StageInstance,
        phase: PhaseInstance,
        previous_attempt: Option<PhaseAttempt>,
    ) -> PhaseExecutionContext<'_> {
        let mut variables = VariablesMap::new();
        for variable in &self.user_variables {
            variables.set_user(
                &variable.name,
                gantry_core::variables::VariableValue {
                    value: variable.value.clone(),
                    is_secret: variable.secret,
                },
            );
        }
        for variable in &self.system_variables {
            variables.set_system(
                &variable.name,
                gantry_core::variables::VariableValue {
                    value: variable.value.clone(),
                    is_secret: variable.secret,
                },
            );
        }

        PhaseExecutionContext {
            stage,
            phase,
            previous_attempt,
            execution_options: self.config.execution_options.clone(),
            resource_store: &mut self.resource_store,
            task_store: self.task_store.as_deref(),
            evaluator: self.evaluator.as_ref(),
            id_generator: self.id_generator.as_ref(),
            variables,
        }
    }

    /// Applies builder defaults and resolves template steps, producing the
    /// process that validation runs against.
    fn create_process(&mut self, mut stages: Vec<Stage>) -> Result<PipelineProcess> {
        for stage in &mut stages {
            for phase in &mut stage.phases {
                self.apply_target_defaults(phase);
                self.resolve_steps(phase)?;
            }
        }

        Ok(PipelineProcess { stages })
    }

    fn apply_target_defaults(&self, phase: &mut PhaseNode) {
        let common = phase.common_mut();

        // Agent queues are the default target kind; the hosting environment
        // supplies the queue itself via the configured default.
        if common.target.is_none() {
            common.target = Some(PhaseTarget::Queue(AgentQueueTarget::default()));
        }

        let Some(PhaseTarget::Queue(queue_target)) = common.target.as_mut() else {
            return;
        };

        if let Some(default_queue) = &self.config.default_queue {
            let use_default = match &queue_target.queue {
                None => true,
                Some(queue) => queue.is_empty(),
            };

            if use_default {
                queue_target.queue = Some(default_queue.clone());
                if queue_target.agent_specification.is_none() {
                    queue_target.agent_specification =
                        self.config.default_agent_specification.clone();
                }
            }
        }

        if queue_target.workspace.is_none()
            && let Some(default_workspace) = &self.config.default_workspace_options
        {
            queue_target.workspace = Some(default_workspace.clone());
        }
    }

    /// Drops disabled steps and expands template steps. A template step
    /// without a configured template store is a configuration error, not a
    /// validation warning.
    fn resolve_steps(&self, phase: &mut PhaseNode) -> Result<()> {
        let steps = phase.steps_mut();
        let mut resolved: Vec<Step> = Vec::with_capacity(steps.len());

        for step in steps.drain(..) {
            if !step.enabled() {
                continue;
            }

            match step {
                Step::TaskTemplate(template) => {
                    let store = self.template_store.as_deref().ok_or_else(|| {
                        Error::TemplateStoreNotProvided(template.name.clone())
                    })?;
                    resolved.extend(store.resolve_tasks(&template));
                }
                step => resolved.push(step),
            }
        }

        *steps = resolved;
        Ok(())
    }
}
