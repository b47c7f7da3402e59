//! Pipeline steps.
//!
//! Steps are a tagged union over task, group, action, and task-template
//! variants. The JSON discriminator is the `type` field; for compatibility
//! with documents produced before the discriminator existed, a step object
//! with no `type` is treated as a task-template step when it carries a
//! `parameters` map and as a plain task step otherwise.

use crate::constants::checkout_task;
use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

/// Reference to the task definition backing a task step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStepDefinitionReference {
    #[serde(default, skip_serializing_if = "Uuid::is_nil")]
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

/// A step which runs a task on the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStep {
    #[serde(default, skip_serializing_if = "Uuid::is_nil")]
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<TaskStepDefinitionReference>,
}

impl Default for TaskStep {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            name: String::new(),
            display_name: None,
            enabled: true,
            condition: None,
            continue_on_error: false,
            timeout_in_minutes: None,
            inputs: IndexMap::new(),
            environment: IndexMap::new(),
            reference: None,
        }
    }
}

impl TaskStep {
    /// True when this step references the well-known checkout task.
    pub fn is_checkout_task(&self) -> bool {
        match &self.reference {
            Some(reference) => {
                reference.id == checkout_task::ID
                    || reference.name.eq_ignore_ascii_case(checkout_task::NAME)
            }
            None => false,
        }
    }

    pub fn input(&self, name: &str) -> Option<&str> {
        self.inputs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A named group of task steps executed as a unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStep {
    #[serde(default, skip_serializing_if = "Uuid::is_nil")]
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub continue_on_error: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<TaskStep>,
}

/// Where an action step's implementation comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActionStepDefinitionReference {
    #[serde(rename_all = "camelCase")]
    Repository {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        r#ref: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ContainerRegistry { image: String },
    Script,
    #[serde(rename_all = "camelCase")]
    AgentPlugin { plugin: String },
}

/// A step which runs an action (repository, container, script, or plugin
/// sourced).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStep {
    #[serde(default, skip_serializing_if = "Uuid::is_nil")]
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ActionStepDefinitionReference>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub inputs: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub environment: IndexMap<String, String>,
}

/// A step expanded into tasks by a task-template store before execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplateStep {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, String>,
}

/// A pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Step {
    Task(TaskStep),
    Group(GroupStep),
    Action(ActionStep),
    TaskTemplate(TaskTemplateStep),
}

impl Step {
    pub fn name(&self) -> &str {
        match self {
            Step::Task(step) => &step.name,
            Step::Group(step) => &step.name,
            Step::Action(step) => &step.name,
            Step::TaskTemplate(step) => &step.name,
        }
    }

    pub fn set_name(&mut self, name: String) {
        match self {
            Step::Task(step) => step.name = name,
            Step::Group(step) => step.name = name,
            Step::Action(step) => step.name = name,
            Step::TaskTemplate(step) => step.name = name,
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        match self {
            Step::Task(step) => step.display_name.as_deref(),
            Step::Group(step) => step.display_name.as_deref(),
            Step::Action(step) => step.display_name.as_deref(),
            Step::TaskTemplate(step) => step.display_name.as_deref(),
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            Step::Task(step) => step.enabled,
            Step::Group(step) => step.enabled,
            Step::Action(step) => step.enabled,
            Step::TaskTemplate(step) => step.enabled,
        }
    }

    pub fn is_checkout_task(&self) -> bool {
        matches!(self, Step::Task(step) if step.is_checkout_task())
    }
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        let object = raw
            .as_object()
            .ok_or_else(|| D::Error::custom("step must be an object"))?;

        let discriminator = object
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("type"))
            .and_then(|(_, v)| v.as_str())
            .map(str::to_string);

        let kind = match discriminator {
            Some(value) => value,
            // Historical documents carry no discriminator: the presence of
            // a parameters map marks a task-template step.
            None if object.keys().any(|k| k.eq_ignore_ascii_case("parameters")) => {
                "taskTemplate".to_string()
            }
            None => "task".to_string(),
        };

        let step = if kind.eq_ignore_ascii_case("task") {
            Step::Task(serde_json::from_value(raw).map_err(D::Error::custom)?)
        } else if kind.eq_ignore_ascii_case("group") {
            Step::Group(serde_json::from_value(raw).map_err(D::Error::custom)?)
        } else if kind.eq_ignore_ascii_case("action") {
            Step::Action(serde_json::from_value(raw).map_err(D::Error::custom)?)
        } else if kind.eq_ignore_ascii_case("taskTemplate") {
            Step::TaskTemplate(serde_json::from_value(raw).map_err(D::Error::custom)?)
        } else {
            return Err(D::Error::custom(format!("unknown step type '{kind}'")));
        };

        Ok(step)
    }
}

/// Builds the well-known checkout task step for a repository alias.
pub fn checkout_step(repository_alias: &str) -> TaskStep {
    let mut step = TaskStep {
        display_name: Some(checkout_task::FRIENDLY_NAME.to_string()),
        reference: Some(TaskStepDefinitionReference {
            id: checkout_task::ID,
            name: checkout_task::NAME.to_string(),
            version: checkout_task::VERSION.to_string(),
        }),
        ..TaskStep::default()
    };
    step.inputs.insert(
        crate::constants::checkout_inputs::REPOSITORY.to_string(),
        repository_alias.to_string(),
    );
    step
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_checkout_detection() {
        let step = checkout_step("self");
        assert!(step.is_checkout_task());

        let other = TaskStep {
            reference: Some(TaskStepDefinitionReference {
                id: Uuid::new_v4(),
                name: "CmdLine".to_string(),
                version: "2.0.0".to_string(),
            }),
            ..TaskStep::default()
        };
        assert!(!other.is_checkout_task());
    }

    #[test]
    fn test_step_discriminator_round_trip() {
        let step = Step::Task(TaskStep {
            name: "build".to_string(),
            ..TaskStep::default()
        });
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["type"], "task");
        let back: Step = serde_json::from_value(json).unwrap();
        assert_eq!(back, step);
    }

    #[test]
    fn test_untyped_step_defaults_to_task() {
        let back: Step = serde_json::from_str(r#"{"name":"run"}"#).unwrap();
        assert!(matches!(back, Step::Task(_)));
    }

    #[test]
    fn test_untyped_step_with_parameters_is_template() {
        let back: Step =
            serde_json::from_str(r#"{"name":"shared","parameters":{"env":"prod"}}"#).unwrap();
        assert!(matches!(back, Step::TaskTemplate(_)));
    }

    #[test]
    fn test_disabled_default() {
        let step: TaskStep = serde_json::from_str(r#"{"name":"x"}"#).unwrap();
        assert!(step.enabled);
    }
}
