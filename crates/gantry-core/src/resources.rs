//! Pipeline resources, resource references, and resolved resource entities.

use crate::expression::ExpressionValue;
use crate::variables::VariableValue;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Untyped property bag backing the resource model. Keys are compared
/// case-insensitively; the key's original casing is preserved for output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceProperties {
    values: IndexMap<String, serde_json::Value>,
}

impl ResourceProperties {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_key(&self, name: &str) -> Option<String> {
        self.values
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find_key(name).is_some()
    }

    pub fn get_value(&self, name: &str) -> Option<&serde_json::Value> {
        self.values
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Typed read; `None` when the property is absent or not convertible.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.try_get(name).ok().flatten()
    }

    /// Typed read that surfaces conversion failures.
    pub fn try_get<T: DeserializeOwned>(&self, name: &str) -> crate::Result<Option<T>> {
        match self.get_value(name) {
            None => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }

    /// Stores a value under the given name. A value serializing to JSON null
    /// is stored as an explicit null token; on read this is indistinguishable
    /// from "never set". Consumers depend on this behavior, so it is kept.
    pub fn set<T: Serialize>(&mut self, name: &str, value: &T) {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        match self.find_key(name) {
            Some(existing) => {
                self.values.insert(existing, value);
            }
            None => {
                self.values.insert(name.to_string(), value);
            }
        }
    }

    /// Merges another bag into this one. Conflicting keys keep the existing
    /// value unless `overwrite` is set.
    pub fn union_with(&mut self, other: &ResourceProperties, overwrite: bool) {
        for (key, value) in &other.values {
            if overwrite || !self.contains(key) {
                self.set(key, value);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Property names understood on a repository resource.
pub mod repository_properties {
    pub const ID: &str = "id";
    pub const TYPE: &str = "type";
    pub const URL: &str = "url";
    pub const VERSION: &str = "version";
    pub const REF: &str = "ref";
    pub const NAME: &str = "name";
    pub const ENDPOINT: &str = "endpoint";
    pub const CHECKOUT_OPTIONS: &str = "checkoutOptions";
    pub const MAPPINGS: &str = "mappings";
    pub const SHELVESET: &str = "shelveset";
    pub const VERSION_INFO: &str = "versionInfo";
}

/// Repository type values carried on repository resources.
pub mod repository_types {
    pub const GIT: &str = "git";
    pub const GITHUB: &str = "gitHub";
    pub const GITHUB_ENTERPRISE: &str = "gitHubEnterprise";
    pub const BITBUCKET: &str = "bitbucket";
    pub const EXTERNAL_GIT: &str = "externalGit";
    pub const SVN: &str = "svn";
    pub const TFVC: &str = "tfsVersionControl";
}

/// Options controlling how a repository is checked out. All values are kept
/// as strings since they flow verbatim into checkout task inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_depth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lfs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_credentials: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submodules: Option<String>,
}

/// A single entry in a TFVC or SVN workspace mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub exclude: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<i32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ignore_externals: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

/// Commit metadata attached to a repository resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

macro_rules! define_resource {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            #[serde(default)]
            pub alias: String,
            #[serde(default, skip_serializing_if = "ResourceProperties::is_empty")]
            pub properties: ResourceProperties,
        }

        impl $name {
            pub fn new(alias: impl Into<String>) -> Self {
                Self {
                    alias: alias.into(),
                    properties: ResourceProperties::new(),
                }
            }

            pub fn type_name(&self) -> Option<String> {
                self.properties.get(repository_properties::TYPE)
            }

            pub fn set_type_name(&mut self, value: &str) {
                self.properties.set(repository_properties::TYPE, &value);
            }

            pub fn version(&self) -> Option<String> {
                self.properties.get(repository_properties::VERSION)
            }

            pub fn set_version(&mut self, value: &str) {
                self.properties.set(repository_properties::VERSION, &value);
            }
        }
    };
}

define_resource!(
    /// A build artifact resource available to the pipeline.
    BuildResource
);
define_resource!(
    /// Another pipeline whose artifacts this pipeline consumes.
    PipelineResource
);
define_resource!(
    /// A container image resource.
    ContainerResource
);
define_resource!(
    /// A source repository resource.
    RepositoryResource
);

impl RepositoryResource {
    pub fn id(&self) -> Option<String> {
        self.properties.get(repository_properties::ID)
    }

    pub fn set_id(&mut self, value: &str) {
        self.properties.set(repository_properties::ID, &value);
    }

    pub fn url(&self) -> Option<String> {
        self.properties.get(repository_properties::URL)
    }

    pub fn set_url(&mut self, value: &str) {
        self.properties.set(repository_properties::URL, &value);
    }

    pub fn endpoint(&self) -> Option<ServiceEndpointReference> {
        self.properties.get(repository_properties::ENDPOINT)
    }

    pub fn set_endpoint(&mut self, value: &ServiceEndpointReference) {
        self.properties.set(repository_properties::ENDPOINT, value);
    }

    pub fn checkout_options(&self) -> Option<CheckoutOptions> {
        self.properties.get(repository_properties::CHECKOUT_OPTIONS)
    }

    pub fn set_checkout_options(&mut self, value: &CheckoutOptions) {
        self.properties
            .set(repository_properties::CHECKOUT_OPTIONS, value);
    }
}

/// Reference to an agent queue by id or name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentQueueReference {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ExpressionValue<String>>,
}

impl AgentQueueReference {
    pub fn by_id(id: i32) -> Self {
        Self { id, name: None }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: Some(ExpressionValue::Literal(name.into())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id == 0 && literal_is_empty(&self.name)
    }
}

/// Reference to an agent pool by id or name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPoolReference {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ExpressionValue<String>>,
}

impl AgentPoolReference {
    pub fn is_empty(&self) -> bool {
        self.id == 0 && literal_is_empty(&self.name)
    }
}

/// Reference to a service endpoint by id or name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpointReference {
    #[serde(default, skip_serializing_if = "Uuid::is_nil")]
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ExpressionValue<String>>,
}

impl ServiceEndpointReference {
    pub fn by_id(id: Uuid) -> Self {
        Self { id, name: None }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::nil(),
            name: Some(ExpressionValue::Literal(name.into())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_nil() && literal_is_empty(&self.name)
    }
}

/// Reference to a secure file by id or name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureFileReference {
    #[serde(default, skip_serializing_if = "Uuid::is_nil")]
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ExpressionValue<String>>,
}

impl SecureFileReference {
    pub fn is_empty(&self) -> bool {
        self.id.is_nil() && literal_is_empty(&self.name)
    }
}

/// Reference to a variable group by id or name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableGroupReference {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ExpressionValue<String>>,
}

impl VariableGroupReference {
    pub fn is_empty(&self) -> bool {
        self.id == 0 && literal_is_empty(&self.name)
    }
}

/// Reference to a deployment environment by id or name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentReference {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ExpressionValue<String>>,
}

impl EnvironmentReference {
    pub fn is_empty(&self) -> bool {
        self.id == 0 && literal_is_empty(&self.name)
    }
}

fn is_zero(value: &i32) -> bool {
    *value == 0
}

fn literal_is_empty(name: &Option<ExpressionValue<String>>) -> bool {
    match name {
        None => true,
        Some(ExpressionValue::Literal(literal)) => literal.is_empty(),
        Some(ExpressionValue::Expr(_)) => false,
    }
}

/// Endpoint authorization schemes with special handling in the SDK.
pub mod authorization_schemes {
    pub const TOKEN: &str = "Token";
    pub const PERSONAL_ACCESS_TOKEN: &str = "PersonalAccessToken";
    pub const USERNAME_PASSWORD: &str = "UsernamePassword";
    pub const OAUTH: &str = "OAuth";
}

/// Parameter names within an endpoint authorization.
pub mod authorization_parameters {
    pub const ACCESS_TOKEN: &str = "AccessToken";
    pub const API_TOKEN: &str = "apitoken";
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
}

/// Credential material attached to a service endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointAuthorization {
    #[serde(default)]
    pub scheme: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, String>,
}

impl EndpointAuthorization {
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A resolved service endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    #[serde(default, skip_serializing_if = "Uuid::is_nil")]
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub endpoint_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<EndpointAuthorization>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub data: IndexMap<String, Option<String>>,
}

impl ServiceEndpoint {
    /// Reads a data entry, flattening explicit nulls to `None`.
    pub fn data_value(&self, key: &str) -> Option<&str> {
        self.data
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn set_data(&mut self, key: &str, value: impl Into<Option<String>>) {
        self.data.insert(key.to_string(), value.into());
    }
}

/// A resolved secure file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureFile {
    #[serde(default, skip_serializing_if = "Uuid::is_nil")]
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    /// Short-lived download ticket; must be masked anywhere it could be
    /// echoed to logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<String>,
}

/// A resolved agent queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAgentQueue {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<TaskAgentPoolReference>,
}

/// The pool behind a queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAgentPoolReference {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_hosted: bool,
}

/// A resolved agent pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAgentPool {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_hosted: bool,
}

/// A resolved variable group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableGroup {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, VariableValue>,
}

/// A resolved deployment environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentInstance {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub name: String,
}

/// All resources referenced or authorized during a pipeline build, grouped
/// by category. Collections are omitted from serialized output when empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResources {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub builds: Vec<BuildResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<ServiceEndpointReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<EnvironmentReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<SecureFileReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pipelines: Vec<PipelineResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pools: Vec<AgentPoolReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queues: Vec<AgentQueueReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<RepositoryResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variable_groups: Vec<VariableGroupReference>,
}

impl PipelineResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an endpoint reference, deduplicating by id (or by name when
    /// the reference has no id).
    pub fn add_endpoint_reference(&mut self, endpoint: &ServiceEndpointReference) {
        let exists = self.endpoints.iter().any(|e| {
            if !endpoint.id.is_nil() {
                e.id == endpoint.id
            } else {
                match (&e.name, &endpoint.name) {
                    (
                        Some(ExpressionValue::Literal(a)),
                        Some(ExpressionValue::Literal(b)),
                    ) => a.eq_ignore_ascii_case(b),
                    _ => false,
                }
            }
        });

        if !exists {
            self.endpoints.push(endpoint.clone());
        }
    }

    pub fn add_queue_reference(&mut self, id: i32, name: Option<String>) {
        let exists = self
            .queues
            .iter()
            .any(|q| (id != 0 && q.id == id) || (id == 0 && q.is_empty()));
        if !exists {
            self.queues.push(AgentQueueReference {
                id,
                name: name.map(ExpressionValue::Literal),
            });
        }
    }

    pub fn add_repository(&mut self, repository: &RepositoryResource) {
        if !self
            .repositories
            .iter()
            .any(|r| r.alias.eq_ignore_ascii_case(&repository.alias))
        {
            self.repositories.push(repository.clone());
        }
    }

    /// Merges another resource set into this one, deduplicating endpoints
    /// and repositories; other categories append.
    pub fn merge_with(&mut self, other: &PipelineResources) {
        self.builds.extend(other.builds.iter().cloned());
        self.containers.extend(other.containers.iter().cloned());
        for endpoint in &other.endpoints {
            self.add_endpoint_reference(endpoint);
        }
        self.environments.extend(other.environments.iter().cloned());
        self.files.extend(other.files.iter().cloned());
        self.pipelines.extend(other.pipelines.iter().cloned());
        self.pools.extend(other.pools.iter().cloned());
        self.queues.extend(other.queues.iter().cloned());
        for repository in &other.repositories {
            self.add_repository(repository);
        }
        self.variable_groups
            .extend(other.variable_groups.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.builds.is_empty()
            && self.containers.is_empty()
            && self.endpoints.is_empty()
            && self.environments.is_empty()
            && self.files.is_empty()
            && self.pipelines.is_empty()
            && self.pools.is_empty()
            && self.queues.is_empty()
            && self.repositories.is_empty()
            && self.variable_groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Custom {
        retries: u32,
        label: String,
    }

    #[test]
    fn test_property_bag_round_trip() {
        let mut properties = ResourceProperties::new();
        properties.set("text", &"hello");
        properties.set("count", &42);
        properties.set("flag", &true);
        properties.set(
            "custom",
            &Custom {
                retries: 3,
                label: "x".to_string(),
            },
        );

        assert_eq!(properties.get::<String>("text").as_deref(), Some("hello"));
        assert_eq!(properties.get::<i32>("count"), Some(42));
        assert_eq!(properties.get::<bool>("flag"), Some(true));
        assert_eq!(
            properties.get::<Custom>("custom"),
            Some(Custom {
                retries: 3,
                label: "x".to_string()
            })
        );
    }

    #[test]
    fn test_property_bag_is_case_insensitive_and_keeps_original_key() {
        let mut properties = ResourceProperties::new();
        properties.set("FetchDepth", &"5");
        properties.set("fetchdepth", &"9");
        assert_eq!(properties.len(), 1);
        assert_eq!(properties.get::<String>("FETCHDEPTH").as_deref(), Some("9"));
        assert!(properties.get_value("FetchDepth").is_some());
    }

    #[test]
    fn test_property_bag_clone_is_deep() {
        let mut original = ResourceProperties::new();
        original.set("key", &"value");

        let mut cloned = original.clone();
        cloned.set("key", &"changed");

        assert_eq!(original.get::<String>("key").as_deref(), Some("value"));
        assert_eq!(cloned.get::<String>("key").as_deref(), Some("changed"));
    }

    #[test]
    fn test_explicit_null_reads_as_absent() {
        let mut properties = ResourceProperties::new();
        let cleared: Option<String> = None;
        properties.set("shelveset", &cleared);

        // The null token is stored, but a typed read cannot tell it apart
        // from a property that was never present.
        assert!(properties.contains("shelveset"));
        assert_eq!(properties.get::<String>("shelveset"), None);
    }

    #[test]
    fn test_union_with_first_wins() {
        let mut left = ResourceProperties::new();
        left.set("clean", &"true");

        let mut right = ResourceProperties::new();
        right.set("clean", &"false");
        right.set("lfs", &"true");

        left.union_with(&right, false);
        assert_eq!(left.get::<String>("clean").as_deref(), Some("true"));
        assert_eq!(left.get::<String>("lfs").as_deref(), Some("true"));
    }

    #[test]
    fn test_endpoint_reference_dedup() {
        let mut resources = PipelineResources::new();
        let id = Uuid::new_v4();
        resources.add_endpoint_reference(&ServiceEndpointReference::by_id(id));
        resources.add_endpoint_reference(&ServiceEndpointReference::by_id(id));
        resources.add_endpoint_reference(&ServiceEndpointReference::by_name("github"));
        resources.add_endpoint_reference(&ServiceEndpointReference::by_name("GitHub"));
        assert_eq!(resources.endpoints.len(), 2);
    }

    #[test]
    fn test_empty_reference() {
        assert!(AgentQueueReference::default().is_empty());
        assert!(!AgentQueueReference::by_id(12).is_empty());
        assert!(!AgentQueueReference::by_name("pool").is_empty());
        assert!(
            AgentQueueReference {
                id: 0,
                name: Some(ExpressionValue::Literal(String::new()))
            }
            .is_empty()
        );
    }
}
