//! Task and task-template store ports.

use gantry_core::step::{Step, TaskTemplateStep};
use gantry_core::task::TaskDefinition;
use uuid::Uuid;

/// How a task step names its definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSpec<'a> {
    Id(Uuid),
    Name(&'a str),
}

/// Port for resolving task definitions referenced by steps.
pub trait TaskStore: Send + Sync {
    /// Resolves a task by id or name at a specific version. `None` when no
    /// matching definition exists.
    fn resolve_task(&self, spec: TaskSpec<'_>, version: &str) -> Option<TaskDefinition>;
}

/// Port for expanding task-template steps into concrete steps. A pipeline
/// containing template steps cannot build without one.
pub trait TaskTemplateStore: Send + Sync {
    fn resolve_tasks(&self, template: &TaskTemplateStep) -> Vec<Step>;
}

/// Task store backed by a fixed definition list.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    definitions: Vec<TaskDefinition>,
}

impl InMemoryTaskStore {
    pub fn new(definitions: Vec<TaskDefinition>) -> Self {
        Self { definitions }
    }

    pub fn add(&mut self, definition: TaskDefinition) {
        self.definitions.push(definition);
    }
}

impl TaskStore for InMemoryTaskStore {
    fn resolve_task(&self, spec: TaskSpec<'_>, version: &str) -> Option<TaskDefinition> {
        self.definitions
            .iter()
            .find(|task| {
                let matches = match &spec {
                    TaskSpec::Id(id) => task.id == *id,
                    TaskSpec::Name(name) => task.name.eq_ignore_ascii_case(name),
                };
                matches && version_matches(&task.version, version)
            })
            .cloned()
    }
}

/// A version spec matches when equal, or when the spec pins only a major
/// version ("2" or "2.*") and the definition's major agrees.
fn version_matches(definition: &str, spec: &str) -> bool {
    if definition.eq_ignore_ascii_case(spec) {
        return true;
    }

    let major = spec.strip_suffix(".*").unwrap_or(spec);
    if major.chars().all(|c| c.is_ascii_digit()) {
        return definition.split('.').next() == Some(major);
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(name: &str, version: &str) -> TaskDefinition {
        TaskDefinition {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()),
            name: name.to_string(),
            version: version.to_string(),
            ..TaskDefinition::default()
        }
    }

    #[test]
    fn test_resolve_by_name_and_major_version() {
        let store = InMemoryTaskStore::new(vec![definition("CmdLine", "2.212.0")]);
        assert!(store.resolve_task(TaskSpec::Name("cmdline"), "2.*").is_some());
        assert!(store.resolve_task(TaskSpec::Name("CmdLine"), "2").is_some());
        assert!(store.resolve_task(TaskSpec::Name("CmdLine"), "1.*").is_none());
        assert!(store.resolve_task(TaskSpec::Name("Other"), "2.*").is_none());
    }
}
