//! Resolver ports.
//!
//! Resolvers turn a resource reference into a resolved entity. They are
//! supplied by the hosting environment and may perform I/O; the stores call
//! them synchronously from within a build, so timeout and cancellation are
//! the resolver's own responsibility. Returning `None` means the reference
//! is unknown or not authorized for the caller; the store surfaces that as
//! a cache miss and the call site decides whether it is an error.

use gantry_core::resources::{
    AgentPoolReference, AgentQueueReference, EnvironmentInstance, EnvironmentReference,
    SecureFile, SecureFileReference, ServiceEndpoint, ServiceEndpointReference, TaskAgentPool,
    TaskAgentQueue, VariableGroup, VariableGroupReference,
};

pub trait AgentQueueResolver: Send + Sync {
    fn resolve(&self, reference: &AgentQueueReference) -> Option<TaskAgentQueue>;
}

pub trait AgentPoolResolver: Send + Sync {
    fn resolve(&self, reference: &AgentPoolReference) -> Option<TaskAgentPool>;
}

pub trait ServiceEndpointResolver: Send + Sync {
    fn resolve(&self, reference: &ServiceEndpointReference) -> Option<ServiceEndpoint>;
}

pub trait SecureFileResolver: Send + Sync {
    fn resolve(&self, reference: &SecureFileReference) -> Option<SecureFile>;
}

pub trait VariableGroupResolver: Send + Sync {
    fn resolve(&self, reference: &VariableGroupReference) -> Option<VariableGroup>;
}

pub trait EnvironmentResolver: Send + Sync {
    fn resolve(&self, reference: &EnvironmentReference) -> Option<EnvironmentInstance>;
}
