//! Alias-keyed stores for resources authored inline in the pipeline.

use gantry_core::resources::{
    BuildResource, ContainerResource, PipelineResource, RepositoryResource,
};
use indexmap::IndexMap;

/// Resources keyed by alias (repositories, containers, builds, pipelines).
/// Aliases are unique within a store, compared case-insensitively.
#[derive(Debug, Clone)]
pub struct ResourceCollectionStore<T> {
    resources: IndexMap<String, T>,
}

impl<T: Clone> ResourceCollectionStore<T> {
    pub fn new() -> Self {
        Self {
            resources: IndexMap::new(),
        }
    }

    pub fn with_resources(resources: impl IntoIterator<Item = (String, T)>) -> Self {
        let mut store = Self::new();
        for (alias, resource) in resources {
            store.add(alias, resource);
        }
        store
    }

    /// Adds a resource; an alias already present keeps its existing entry.
    pub fn add(&mut self, alias: String, resource: T) {
        let key = alias.to_lowercase();
        self.resources.entry(key).or_insert(resource);
    }

    pub fn get(&self, alias: &str) -> Option<&T> {
        self.resources.get(&alias.to_lowercase())
    }

    pub fn get_mut(&mut self, alias: &str) -> Option<&mut T> {
        self.resources.get_mut(&alias.to_lowercase())
    }

    pub fn get_all(&self) -> impl Iterator<Item = &T> {
        self.resources.values()
    }

    pub fn get_all_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.resources.values_mut()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl<T: Clone> Default for ResourceCollectionStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub type RepositoryResourceStore = ResourceCollectionStore<RepositoryResource>;
pub type ContainerResourceStore = ResourceCollectionStore<ContainerResource>;
pub type BuildResourceStore = ResourceCollectionStore<BuildResource>;
pub type PipelineResourceStore = ResourceCollectionStore<PipelineResource>;
