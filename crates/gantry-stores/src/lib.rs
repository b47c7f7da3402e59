//! Gantry resource stores.
//!
//! Stores cache resolved external entities (queues, pools, endpoints,
//! secure files, variable groups, environments) by id and by name for the
//! lifetime of one pipeline build or one agent session. Cache misses are
//! delegated to host-supplied resolvers; once an entity is cached it is
//! never evicted within that scope, so repeated lookups are stable and a
//! resolver is invoked at most once per distinct reference.

pub mod collection;
pub mod counters;
pub mod reference_store;
pub mod resolver;
pub mod resource_store;
pub mod tasks;

pub use collection::{
    BuildResourceStore, ContainerResourceStore, PipelineResourceStore, RepositoryResourceStore,
    ResourceCollectionStore,
};
pub use counters::{Counter, CounterStore, InMemoryCounterStore};
pub use reference_store::{
    AgentPoolStore, AgentQueueStore, EnvironmentStore, SecureFileStore, ServiceEndpointStore,
    VariableGroupStore,
};
pub use resolver::{
    AgentPoolResolver, AgentQueueResolver, EnvironmentResolver, SecureFileResolver,
    ServiceEndpointResolver, VariableGroupResolver,
};
pub use resource_store::ResourceStore;
pub use tasks::{InMemoryTaskStore, TaskSpec, TaskStore, TaskTemplateStore};
