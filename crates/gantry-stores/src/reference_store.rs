//! Reference-keyed stores with lazy resolve-then-cache semantics.

use crate::resolver::{
    AgentPoolResolver, AgentQueueResolver, EnvironmentResolver, SecureFileResolver,
    ServiceEndpointResolver, VariableGroupResolver,
};
use gantry_core::expression::ExpressionValue;
use gantry_core::resources::{
    AgentPoolReference, AgentQueueReference, EnvironmentInstance, EnvironmentReference,
    SecureFile, SecureFileReference, ServiceEndpoint, ServiceEndpointReference, TaskAgentPool,
    TaskAgentQueue, VariableGroup, VariableGroupReference,
};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

fn literal_name(name: &Option<ExpressionValue<String>>) -> Option<&str> {
    match name {
        Some(ExpressionValue::Literal(literal)) if !literal.is_empty() => Some(literal),
        _ => None,
    }
}

macro_rules! define_reference_store {
    (
        $(#[$meta:meta])*
        $store:ident,
        resolver: $resolver:ident,
        reference: $reference:ty,
        entity: $entity:ty,
        id: $id:ty,
        default_id: $default_id:expr
    ) => {
        $(#[$meta])*
        pub struct $store {
            entities: Vec<$entity>,
            by_id: HashMap<$id, usize>,
            by_name: HashMap<String, usize>,
            resolver: Option<Box<dyn $resolver>>,
        }

        impl Default for $store {
            fn default() -> Self {
                Self::new()
            }
        }

        impl $store {
            pub fn new() -> Self {
                Self {
                    entities: Vec::new(),
                    by_id: HashMap::new(),
                    by_name: HashMap::new(),
                    resolver: None,
                }
            }

            pub fn with_entities(entities: impl IntoIterator<Item = $entity>) -> Self {
                let mut store = Self::new();
                for entity in entities {
                    store.add(entity);
                }
                store
            }

            pub fn set_resolver(&mut self, resolver: Box<dyn $resolver>) {
                self.resolver = Some(resolver);
            }

            /// Inserts an entity into both indices. An id or name already
            /// present keeps its existing entry (first write wins).
            pub fn add(&mut self, entity: $entity) {
                let id = entity.id;
                let name = entity.name.to_lowercase();
                if (id != $default_id && self.by_id.contains_key(&id))
                    || (!name.is_empty() && self.by_name.contains_key(&name))
                {
                    return;
                }

                let index = self.entities.len();
                self.entities.push(entity);
                if id != $default_id {
                    self.by_id.insert(id, index);
                }
                if !name.is_empty() {
                    self.by_name.insert(name, index);
                }
            }

            /// Resolves a reference. Lookup order: by-id when the reference
            /// carries an id, otherwise by literal name; on a cache miss the
            /// configured resolver is consulted and its result cached.
            pub fn get(&mut self, reference: &$reference) -> Option<$entity> {
                if reference.is_empty() {
                    return None;
                }

                if reference.id != $default_id {
                    if let Some(&index) = self.by_id.get(&reference.id) {
                        return Some(self.entities[index].clone());
                    }
                } else if let Some(name) = literal_name(&reference.name)
                    && let Some(&index) = self.by_name.get(&name.to_lowercase())
                {
                    return Some(self.entities[index].clone());
                }

                let resolver = self.resolver.as_ref()?;
                debug!(store = stringify!($store), "Cache miss, invoking resolver");
                let resolved = resolver.resolve(reference)?;
                self.add(resolved.clone());
                Some(resolved)
            }

            pub fn get_by_id(&mut self, id: $id) -> Option<$entity> {
                self.get(&<$reference>::from_id(id))
            }

            pub fn get_by_name(&mut self, name: &str) -> Option<$entity> {
                self.get(&<$reference>::from_name(name))
            }

            /// Eagerly resolves and caches a batch of references so later
            /// lookups during validation never re-invoke the resolver.
            pub fn authorize(&mut self, references: &[$reference]) {
                for reference in references {
                    let _ = self.get(reference);
                }
            }

            /// Lightweight id/name pairs for everything currently cached.
            pub fn authorized_references(&self) -> Vec<$reference> {
                self.entities
                    .iter()
                    .map(|entity| <$reference>::from_entity(entity.id, &entity.name))
                    .collect()
            }

            pub fn entities(&self) -> &[$entity] {
                &self.entities
            }

            pub fn len(&self) -> usize {
                self.entities.len()
            }

            pub fn is_empty(&self) -> bool {
                self.entities.is_empty()
            }
        }
    };
}

/// Reference construction shared by the store implementations.
trait ReferenceCtor<I> {
    fn from_id(id: I) -> Self;
    fn from_name(name: &str) -> Self;
    fn from_entity(id: I, name: &str) -> Self;
}

macro_rules! impl_reference_ctor {
    ($reference:ty, $id:ty, $default_id:expr) => {
        impl ReferenceCtor<$id> for $reference {
            fn from_id(id: $id) -> Self {
                Self { id, name: None }
            }

            fn from_name(name: &str) -> Self {
                Self {
                    id: $default_id,
                    name: Some(ExpressionValue::Literal(name.to_string())),
                }
            }

            fn from_entity(id: $id, name: &str) -> Self {
                Self {
                    id,
                    name: Some(ExpressionValue::Literal(name.to_string())),
                }
            }
        }
    };
}

impl_reference_ctor!(AgentQueueReference, i32, 0);
impl_reference_ctor!(AgentPoolReference, i32, 0);
impl_reference_ctor!(ServiceEndpointReference, Uuid, Uuid::nil());
impl_reference_ctor!(SecureFileReference, Uuid, Uuid::nil());
impl_reference_ctor!(VariableGroupReference, i32, 0);
impl_reference_ctor!(EnvironmentReference, i32, 0);

define_reference_store!(
    /// Store for agent queues.
    AgentQueueStore,
    resolver: AgentQueueResolver,
    reference: AgentQueueReference,
    entity: TaskAgentQueue,
    id: i32,
    default_id: 0
);

define_reference_store!(
    /// Store for agent pools.
    AgentPoolStore,
    resolver: AgentPoolResolver,
    reference: AgentPoolReference,
    entity: TaskAgentPool,
    id: i32,
    default_id: 0
);

define_reference_store!(
    /// Store for service endpoints.
    ServiceEndpointStore,
    resolver: ServiceEndpointResolver,
    reference: ServiceEndpointReference,
    entity: ServiceEndpoint,
    id: Uuid,
    default_id: Uuid::nil()
);

define_reference_store!(
    /// Store for secure files.
    SecureFileStore,
    resolver: SecureFileResolver,
    reference: SecureFileReference,
    entity: SecureFile,
    id: Uuid,
    default_id: Uuid::nil()
);

define_reference_store!(
    /// Store for variable groups.
    VariableGroupStore,
    resolver: VariableGroupResolver,
    reference: VariableGroupReference,
    entity: VariableGroup,
    id: i32,
    default_id: 0
);

define_reference_store!(
    /// Store for deployment environments.
    EnvironmentStore,
    resolver: EnvironmentResolver,
    reference: EnvironmentReference,
    entity: EnvironmentInstance,
    id: i32,
    default_id: 0
);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingQueueResolver {
        calls: Arc<AtomicUsize>,
    }

    impl AgentQueueResolver for CountingQueueResolver {
        fn resolve(&self, reference: &AgentQueueReference) -> Option<TaskAgentQueue> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &reference.name {
                Some(ExpressionValue::Literal(name)) if name == "hosted-linux" => {
                    Some(TaskAgentQueue {
                        id: 7,
                        name: "hosted-linux".to_string(),
                        pool: None,
                    })
                }
                _ => None,
            }
        }
    }

    #[test]
    fn test_resolver_invoked_at_most_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut store = AgentQueueStore::new();
        store.set_resolver(Box::new(CountingQueueResolver {
            calls: Arc::clone(&calls),
        }));

        let reference = AgentQueueReference::by_name("hosted-linux");
        let first = store.get(&reference).unwrap();
        let second = store.get(&reference).unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The resolved entity is also reachable by id now.
        assert!(store.get(&AgentQueueReference::by_id(7)).is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_reference_resolves_to_none_without_resolver_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut store = AgentQueueStore::new();
        store.set_resolver(Box::new(CountingQueueResolver {
            calls: Arc::clone(&calls),
        }));

        assert!(store.get(&AgentQueueReference::default()).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unresolvable_reference_is_a_miss() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut store = AgentQueueStore::new();
        store.set_resolver(Box::new(CountingQueueResolver {
            calls: Arc::clone(&calls),
        }));

        assert!(store.get(&AgentQueueReference::by_name("unknown")).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_first_write_wins() {
        let mut store = AgentQueueStore::with_entities([TaskAgentQueue {
            id: 1,
            name: "default".to_string(),
            pool: None,
        }]);

        store.add(TaskAgentQueue {
            id: 1,
            name: "renamed".to_string(),
            pool: None,
        });

        assert_eq!(store.get_by_id(1).unwrap().name, "default");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_authorize_pre_seeds_references() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut store = AgentQueueStore::new();
        store.set_resolver(Box::new(CountingQueueResolver {
            calls: Arc::clone(&calls),
        }));

        store.authorize(&[AgentQueueReference::by_name("hosted-linux")]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let references = store.authorized_references();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].id, 7);

        // Validation-time lookups are now cache hits.
        let _ = store.get_by_name("hosted-linux");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
