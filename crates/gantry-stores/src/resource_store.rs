//! The aggregate resource store used for one pipeline build or agent session.

use crate::collection::{
    BuildResourceStore, ContainerResourceStore, PipelineResourceStore, RepositoryResourceStore,
};
use crate::reference_store::{
    AgentPoolStore, AgentQueueStore, EnvironmentStore, SecureFileStore, ServiceEndpointStore,
    VariableGroupStore,
};
use gantry_core::constants::{self, checkout_inputs};
use gantry_core::resources::{
    CheckoutOptions, PipelineResources, SecureFile, ServiceEndpoint, TaskAgentQueue,
    VariableGroup,
};
use gantry_core::step::{checkout_step, Step, TaskStep};
use uuid::Uuid;

/// Holds every category of resource available to a build. Not thread-safe
/// by contract: each store is scoped to a single build or agent session and
/// used from one logical flow.
#[derive(Default)]
pub struct ResourceStore {
    pub queues: AgentQueueStore,
    pub pools: AgentPoolStore,
    pub endpoints: ServiceEndpointStore,
    pub files: SecureFileStore,
    pub variable_groups: VariableGroupStore,
    pub environments: EnvironmentStore,
    pub repositories: RepositoryResourceStore,
    pub containers: ContainerResourceStore,
    pub builds: BuildResourceStore,
    pub pipelines: PipelineResourceStore,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything currently cached or pre-authorized, for the environment
    /// output contract. Inline resources (repositories, containers, builds,
    /// pipelines) are included whole; external entities as references.
    pub fn get_authorized_resources(&self) -> PipelineResources {
        let mut resources = PipelineResources::new();
        resources.builds.extend(self.builds.get_all().cloned());
        resources
            .containers
            .extend(self.containers.get_all().cloned());
        resources
            .endpoints
            .extend(self.endpoints.authorized_references());
        resources
            .environments
            .extend(self.environments.authorized_references());
        resources.files.extend(self.files.authorized_references());
        resources
            .pipelines
            .extend(self.pipelines.get_all().cloned());
        resources.queues.extend(self.queues.authorized_references());
        resources.pools.extend(self.pools.authorized_references());
        resources
            .repositories
            .extend(self.repositories.get_all().cloned());
        resources
            .variable_groups
            .extend(self.variable_groups.authorized_references());
        resources
    }

    /// Looks up an endpoint by a string carrying either a GUID or a name.
    pub fn get_endpoint(&mut self, endpoint_id: &str) -> Option<ServiceEndpoint> {
        if let Ok(id) = Uuid::parse_str(endpoint_id)
            && let Some(endpoint) = self.endpoints.get_by_id(id)
        {
            return Some(endpoint);
        }

        self.endpoints.get_by_name(endpoint_id)
    }

    /// Looks up a queue by a string carrying either a numeric id or a name.
    pub fn get_queue(&mut self, queue_id: &str) -> Option<TaskAgentQueue> {
        if let Ok(id) = queue_id.parse::<i32>()
            && let Some(queue) = self.queues.get_by_id(id)
        {
            return Some(queue);
        }

        self.queues.get_by_name(queue_id)
    }

    /// Looks up a variable group by a string carrying either a numeric id
    /// or a name.
    pub fn get_variable_group(&mut self, group_id: &str) -> Option<VariableGroup> {
        if let Ok(id) = group_id.parse::<i32>()
            && let Some(group) = self.variable_groups.get_by_id(id)
        {
            return Some(group);
        }

        self.variable_groups.get_by_name(group_id)
    }

    /// Looks up a secure file by a string carrying either a GUID or a name.
    pub fn get_file(&mut self, file_id: &str) -> Option<SecureFile> {
        if let Ok(id) = Uuid::parse_str(file_id)
            && let Some(file) = self.files.get_by_id(id)
        {
            return Some(file);
        }

        self.files.get_by_name(file_id)
    }

    /// Applies repository checkout options to the job's checkout steps and
    /// returns any steps to prepend.
    ///
    /// Existing checkout tasks get their repository's default checkout
    /// options merged into unset inputs. When no checkout step is present
    /// and a `self` repository exists, a `checkout: self` task is
    /// synthesized; designer builds always author their own checkout task.
    pub fn checkout_pre_steps(&self, steps: &mut [Step]) -> Vec<TaskStep> {
        let mut has_checkout = false;
        for step in steps.iter_mut() {
            if let Step::Task(task) = step
                && task.is_checkout_task()
            {
                has_checkout = true;
                let repository_alias = task.input(checkout_inputs::REPOSITORY).map(str::to_string);
                if let Some(alias) = repository_alias
                    && let Some(repository) = self.repositories.get(&alias)
                    && let Some(options) = repository.checkout_options()
                {
                    merge_checkout_options(&options, task);
                }
            }
        }

        if has_checkout {
            return Vec::new();
        }

        let Some(self_repo) = self.repositories.get(constants::SELF_ALIAS) else {
            return Vec::new();
        };

        let mut injected = checkout_step(&self_repo.alias);
        if let Some(options) = self_repo.checkout_options() {
            merge_checkout_options(&options, &mut injected);
        }

        vec![injected]
    }
}

/// Copies checkout options into task inputs that are not already set.
fn merge_checkout_options(options: &CheckoutOptions, task: &mut TaskStep) {
    let pairs = [
        (checkout_inputs::CLEAN, options.clean.as_deref()),
        (checkout_inputs::FETCH_DEPTH, options.fetch_depth.as_deref()),
        (checkout_inputs::LFS, options.lfs.as_deref()),
        (
            checkout_inputs::PERSIST_CREDENTIALS,
            options.persist_credentials.as_deref(),
        ),
        (checkout_inputs::SUBMODULES, options.submodules.as_deref()),
    ];

    for (input, value) in pairs {
        if let Some(value) = value
            && !value.is_empty()
            && task.input(input).is_none()
        {
            task.inputs.insert(input.to_string(), value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::resources::RepositoryResource;
    use pretty_assertions::assert_eq;

    fn self_repo_with_options() -> RepositoryResource {
        let mut repository = RepositoryResource::new("self");
        repository.set_checkout_options(&CheckoutOptions {
            clean: Some("true".to_string()),
            fetch_depth: Some("1".to_string()),
            ..CheckoutOptions::default()
        });
        repository
    }

    #[test]
    fn test_checkout_injected_when_absent() {
        let mut store = ResourceStore::new();
        store
            .repositories
            .add("self".to_string(), self_repo_with_options());

        let mut steps: Vec<Step> = Vec::new();
        let injected = store.checkout_pre_steps(&mut steps);

        assert_eq!(injected.len(), 1);
        assert!(injected[0].is_checkout_task());
        assert_eq!(injected[0].input(checkout_inputs::REPOSITORY), Some("self"));
        assert_eq!(injected[0].input(checkout_inputs::CLEAN), Some("true"));
        assert_eq!(injected[0].input(checkout_inputs::FETCH_DEPTH), Some("1"));
    }

    #[test]
    fn test_existing_checkout_gets_unset_options_merged() {
        let mut store = ResourceStore::new();
        store
            .repositories
            .add("self".to_string(), self_repo_with_options());

        let mut authored = checkout_step("self");
        authored
            .inputs
            .insert(checkout_inputs::CLEAN.to_string(), "false".to_string());
        let mut steps = vec![Step::Task(authored)];

        let injected = store.checkout_pre_steps(&mut steps);
        assert!(injected.is_empty());

        let Step::Task(task) = &steps[0] else {
            panic!("expected task step");
        };
        // Authored value wins; unset option is filled in.
        assert_eq!(task.input(checkout_inputs::CLEAN), Some("false"));
        assert_eq!(task.input(checkout_inputs::FETCH_DEPTH), Some("1"));
    }

    #[test]
    fn test_no_injection_without_self_repo() {
        let store = ResourceStore::new();
        let mut steps: Vec<Step> = Vec::new();
        assert!(store.checkout_pre_steps(&mut steps).is_empty());
    }

    #[test]
    fn test_get_queue_by_id_string_then_name() {
        let mut store = ResourceStore::new();
        store.queues.add(TaskAgentQueue {
            id: 12,
            name: "hosted".to_string(),
            pool: None,
        });

        assert_eq!(store.get_queue("12").unwrap().name, "hosted");
        assert_eq!(store.get_queue("hosted").unwrap().id, 12);
        assert!(store.get_queue("99").is_none());
    }
}
