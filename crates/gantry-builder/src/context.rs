//! Build- and execution-time contexts.

use crate::options::ExecutionOptions;
use gantry_core::constants;
use gantry_core::error::Result;
use gantry_core::expression::{EvaluationData, ExpressionValue, ExpressionEvaluator};
use gantry_core::ids::{instance_name_with_attempt, PipelineIdGenerator};
use gantry_core::job::{Job, JobInstance};
use gantry_core::resources::PipelineResources;
use gantry_core::variables::VariablesMap;
use gantry_stores::{ResourceStore, TaskStore};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;
use uuid::Uuid;

/// Identity of a stage within a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInstance {
    pub name: String,
    pub attempt: u32,
}

impl StageInstance {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attempt: 1,
        }
    }
}

/// Identity of a phase within a stage attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseInstance {
    pub name: String,
    pub attempt: u32,
}

impl PhaseInstance {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attempt: 1,
        }
    }
}

/// The jobs produced by a previous attempt of this phase, used for attempt
/// continuity on re-expansion.
#[derive(Debug, Clone, Default)]
pub struct PhaseAttempt {
    pub jobs: Vec<JobInstance>,
}

impl PhaseAttempt {
    pub fn job(&self, name: &str) -> Option<&JobInstance> {
        self.jobs.iter().find(|j| j.name.eq_ignore_ascii_case(name))
    }
}

/// The single chokepoint for resolving an [`ExpressionValue`]: literals are
/// traced and returned on the cheap path; expressions go to the injected
/// evaluator; an absent value yields the stated default.
pub fn evaluate_value<T>(
    evaluator: &dyn ExpressionEvaluator,
    variables: &VariablesMap,
    context_data: &IndexMap<String, serde_json::Value>,
    name: &str,
    expression: Option<&ExpressionValue<T>>,
    default: T,
    trace_default: bool,
) -> Result<T>
where
    T: Clone + Debug + Serialize + DeserializeOwned,
{
    match expression {
        None => {
            if trace_default {
                debug!(property = name, value = ?default, "Using default value");
            }
            Ok(default)
        }
        Some(ExpressionValue::Literal(value)) => {
            debug!(property = name, value = ?value, "Using literal value");
            Ok(value.clone())
        }
        Some(ExpressionValue::Expr(expression)) => {
            debug!(property = name, %expression, "Evaluating expression");
            let data = EvaluationData {
                variables,
                context_data,
            };
            let raw = evaluator.evaluate(
                gantry_core::expression::trim_expression(expression),
                &data,
            )?;
            let value: T = serde_json::from_value(raw)?;
            debug!(property = name, value = ?value, "Evaluated expression");
            Ok(value)
        }
    }
}

/// Execution-time context for expanding one phase into jobs.
pub struct PhaseExecutionContext<'a> {
    pub stage: StageInstance,
    pub phase: PhaseInstance,
    pub previous_attempt: Option<PhaseAttempt>,
    pub execution_options: ExecutionOptions,
    pub resource_store: &'a mut ResourceStore,
    pub task_store: Option<&'a dyn TaskStore>,
    pub evaluator: &'a dyn ExpressionEvaluator,
    pub id_generator: &'a dyn PipelineIdGenerator,
    pub variables: VariablesMap,
}

impl<'a> PhaseExecutionContext<'a> {
    /// Evaluates a phase-scoped expression value (no configuration data).
    pub fn evaluate<T>(
        &self,
        name: &str,
        expression: Option<&ExpressionValue<T>>,
        default: T,
        trace_default: bool,
    ) -> Result<T>
    where
        T: Clone + Debug + Serialize + DeserializeOwned,
    {
        evaluate_value(
            self.evaluator,
            &self.variables,
            empty_context_data(),
            name,
            expression,
            default,
            trace_default,
        )
    }

    /// The dotted identifier for a job within this phase, without attempt.
    pub fn job_identifier(&self, job_name: &str) -> String {
        let stage = stage_segment(&self.stage.name);
        self.id_generator
            .instance_name(&[&stage, &self.phase.name, job_name])
    }

    /// The dotted instance name for a job attempt within this phase.
    pub fn job_instance_name(&self, job: &JobInstance) -> String {
        instance_name_with_attempt(&self.job_identifier(&job.name), job.attempt)
    }

    pub fn job_instance_id(&self, job: &JobInstance) -> Uuid {
        self.id_generator.instance_id(&self.job_instance_name(job))
    }
}

/// The default stage name is elided from instance identifiers.
fn stage_segment(stage_name: &str) -> String {
    if stage_name.eq_ignore_ascii_case(constants::DEFAULT_JOB_NAME) {
        String::new()
    } else {
        stage_name.to_string()
    }
}

/// Shared empty context-data map for phase-level evaluation.
fn empty_context_data() -> &'static IndexMap<String, serde_json::Value> {
    static MAP: std::sync::OnceLock<IndexMap<String, serde_json::Value>> =
        std::sync::OnceLock::new();
    MAP.get_or_init(IndexMap::new)
}

/// Ephemeral per-job context produced during expansion. Wraps the job
/// instance plus its position within the phase and a child variable scope;
/// discarded once the job definition is fully populated.
#[derive(Debug)]
pub struct JobExecutionContext {
    pub job: JobInstance,
    pub position_in_phase: usize,
    pub total_jobs_in_phase: usize,
    pub instance_name: String,
    pub variables: VariablesMap,
    pub context_data: IndexMap<String, serde_json::Value>,
    pub referenced_resources: PipelineResources,
    pub definition: Job,
}

impl JobExecutionContext {
    /// Evaluates a job-scoped expression value against this configuration's
    /// bound context data.
    pub fn evaluate<T>(
        &self,
        evaluator: &dyn ExpressionEvaluator,
        name: &str,
        expression: Option<&ExpressionValue<T>>,
        default: T,
        trace_default: bool,
    ) -> Result<T>
    where
        T: Clone + Debug + Serialize + DeserializeOwned,
    {
        evaluate_value(
            evaluator,
            &self.variables,
            &self.context_data,
            name,
            expression,
            default,
            trace_default,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::expression::UnsupportedEvaluator;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_evaluate_literal_and_default() {
        let evaluator = UnsupportedEvaluator;
        let variables = VariablesMap::new();
        let data = IndexMap::new();

        let literal: ExpressionValue<u32> = ExpressionValue::Literal(30);
        let value =
            evaluate_value(&evaluator, &variables, &data, "timeout", Some(&literal), 60, true)
                .unwrap();
        assert_eq!(value, 30);

        let value: u32 =
            evaluate_value::<u32>(&evaluator, &variables, &data, "timeout", None, 60, true)
                .unwrap();
        assert_eq!(value, 60);
    }

    #[test]
    fn test_evaluate_expression_without_evaluator_errors() {
        let evaluator = UnsupportedEvaluator;
        let variables = VariablesMap::new();
        let data = IndexMap::new();

        let expression: ExpressionValue<u32> = ExpressionValue::expr("$[ variables.timeout ]");
        let result = evaluate_value(
            &evaluator,
            &variables,
            &data,
            "timeout",
            Some(&expression),
            60,
            false,
        );
        assert!(result.is_err());
    }
}
