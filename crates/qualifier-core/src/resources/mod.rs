//! Resource pools: construction, lookup and projection.
//!
//! - [`Resource`]: constructed, shareable dependency consumed by actions
//! - [`ResourceTypeRegistry`]: resource type name → constructor
//! - [`ResourcePool`]: resources keyed by ID, built in dependency order
//! - [`graph`]: deterministic dependency ordering with cycle reporting
//! - [`builtin`]: resource types every run can declare

pub mod builtin;
pub mod graph;

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use qualifier_domain::{split_optional, ResourceBindings, ResourceDeclaration, ResourceId};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::error::ResourceError;
use crate::generators::combinations::CombinationSelector;

pub use builtin::{CleanupToken, ConfigurationPayload, Participant, ParticipantList};

/// A constructed resource.
///
/// Resources are shared by reference between every action bound to them and
/// are never mutated by the orchestrator after construction.
pub trait Resource: Any + Send + Sync + fmt::Debug {
    /// Registered type name this resource was constructed as.
    fn resource_type(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    /// Ordered homogeneous sub-instances, for resources that are lists.
    fn sub_instances(&self) -> Option<Vec<Arc<dyn Resource>>> {
        None
    }

    /// Selector used to filter role combinations, for selector resources.
    fn as_combination_selector(&self) -> Option<&dyn CombinationSelector> {
        None
    }
}

/// Downcast a resource to its concrete type.
pub fn downcast<T: Resource>(resource: &dyn Resource) -> Option<&T> {
    resource.as_any().downcast_ref::<T>()
}

/// Everything a constructor receives for one declaration.
pub struct ResourceContext<'a> {
    pub resource_id: &'a str,
    pub specification: &'a serde_json::Value,
    pub dependencies: BTreeMap<String, Arc<dyn Resource>>,
}

impl ResourceContext<'_> {
    fn subject(&self) -> String {
        format!("resource '{}'", self.resource_id)
    }

    /// Deserialize the specification into a typed structure.
    pub fn specification_as<T: DeserializeOwned>(&self) -> Result<T, ResourceError> {
        serde_json::from_value(self.specification.clone()).map_err(|e| {
            ResourceError::InvalidSpecification {
                subject: self.subject(),
                reason: e.to_string(),
            }
        })
    }

    /// Dependency bound to constructor parameter `param`.
    pub fn dependency(&self, param: &str) -> Result<&Arc<dyn Resource>, ResourceError> {
        self.dependencies
            .get(param)
            .ok_or_else(|| ResourceError::MissingResource {
                subject: self.subject(),
                resource_id: param.to_string(),
            })
    }

    /// Dependency bound to `param`, downcast to its concrete type.
    pub fn dependency_as<T: Resource>(&self, param: &str) -> Result<&T, ResourceError> {
        let resource = self.dependency(param)?;
        downcast::<T>(resource.as_ref()).ok_or_else(|| ResourceError::TypeMismatch {
            subject: self.subject(),
            resource_id: param.to_string(),
            expected: std::any::type_name::<T>().to_string(),
            actual: resource.resource_type().to_string(),
        })
    }
}

/// Constructor for one resource type.
pub type ResourceFactory =
    Arc<dyn Fn(&ResourceContext<'_>) -> Result<Arc<dyn Resource>, ResourceError> + Send + Sync>;

/// Explicit mapping from resource type names to constructors.
#[derive(Clone, Default)]
pub struct ResourceTypeRegistry {
    factories: HashMap<String, ResourceFactory>,
}

impl fmt::Debug for ResourceTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.factories.keys().collect();
        types.sort();
        f.debug_struct("ResourceTypeRegistry")
            .field("types", &types)
            .finish()
    }
}

impl ResourceTypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the [`builtin`] resource types registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_builtins(&mut registry);
        registry
    }

    /// Register (or replace) the constructor for `resource_type`.
    pub fn register<F>(&mut self, resource_type: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ResourceContext<'_>) -> Result<Arc<dyn Resource>, ResourceError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(resource_type.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, resource_type: &str) -> bool {
        self.factories.contains_key(resource_type)
    }

    fn construct(
        &self,
        resource_id: &str,
        declaration: &ResourceDeclaration,
        dependencies: BTreeMap<String, Arc<dyn Resource>>,
    ) -> Result<Arc<dyn Resource>, ResourceError> {
        let factory = self.factories.get(&declaration.resource_type).ok_or_else(|| {
            ResourceError::UnknownResourceType {
                resource_id: resource_id.to_string(),
                resource_type: declaration.resource_type.clone(),
            }
        })?;
        factory(&ResourceContext {
            resource_id,
            specification: &declaration.specification,
            dependencies,
        })
    }
}

/// Resources available to an action, keyed by ID.
///
/// Cloning a pool is cheap: resources are shared by reference.
#[derive(Debug, Clone, Default)]
pub struct ResourcePool {
    resources: BTreeMap<ResourceId, Arc<dyn Resource>>,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool from declarations, constructing each resource exactly
    /// once in dependency order.
    pub fn build(
        declarations: &BTreeMap<ResourceId, ResourceDeclaration>,
        registry: &ResourceTypeRegistry,
    ) -> Result<Self, ResourceError> {
        let mut pool = Self::new();
        pool.extend(declarations, registry)?;
        Ok(pool)
    }

    /// Construct `declarations` into this pool. Resources already in the pool
    /// satisfy dependencies of the new declarations.
    ///
    /// Ordering problems are detected before anything is constructed, so a
    /// failed extension leaves the pool unchanged unless a constructor fails.
    #[instrument(skip_all, fields(declarations = declarations.len()))]
    pub fn extend(
        &mut self,
        declarations: &BTreeMap<ResourceId, ResourceDeclaration>,
        registry: &ResourceTypeRegistry,
    ) -> Result<(), ResourceError> {
        let order = graph::resolution_order(declarations, |id| self.resources.contains_key(id))?;

        for id in order {
            let Some(declaration) = declarations.get(&id) else {
                continue;
            };
            let mut dependencies = BTreeMap::new();
            for (param, dep_id) in &declaration.dependencies {
                let dep = self.require(dep_id, &format!("resource '{id}'"))?;
                dependencies.insert(param.clone(), Arc::clone(dep));
            }
            let resource = registry.construct(&id, declaration, dependencies)?;
            debug!(
                resource_id = %id,
                resource_type = %declaration.resource_type,
                "constructed resource"
            );
            self.resources.insert(id, resource);
        }
        Ok(())
    }

    /// Insert (or replace) a resource.
    pub fn insert(&mut self, id: impl Into<ResourceId>, resource: Arc<dyn Resource>) {
        self.resources.insert(id.into(), resource);
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Resource>> {
        self.resources.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    /// Resource `id`, or [`ResourceError::MissingResource`] naming `subject`.
    pub fn require(&self, id: &str, subject: &str) -> Result<&Arc<dyn Resource>, ResourceError> {
        self.resources
            .get(id)
            .ok_or_else(|| ResourceError::MissingResource {
                subject: subject.to_string(),
                resource_id: id.to_string(),
            })
    }

    /// Resource `id` downcast to `T`.
    pub fn require_as<T: Resource>(&self, id: &str, subject: &str) -> Result<&T, ResourceError> {
        let resource = self.require(id, subject)?;
        downcast::<T>(resource.as_ref()).ok_or_else(|| ResourceError::TypeMismatch {
            subject: subject.to_string(),
            resource_id: id.to_string(),
            expected: std::any::type_name::<T>().to_string(),
            actual: resource.resource_type().to_string(),
        })
    }

    pub fn ids(&self) -> impl Iterator<Item = &ResourceId> {
        self.resources.keys()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Project the resources a child action binds.
    ///
    /// `bindings` maps the child's local IDs to IDs in this pool. A missing
    /// parent ID is an error naming `subject`, unless it carries the `?`
    /// suffix, in which case the binding is silently omitted.
    pub fn make_child_resources(
        &self,
        bindings: &ResourceBindings,
        subject: &str,
    ) -> Result<ResourcePool, ResourceError> {
        let mut child = ResourcePool::new();
        for (local_id, parent_ref) in bindings {
            let (parent_id, optional) = split_optional(parent_ref);
            match self.resources.get(parent_id) {
                Some(resource) => {
                    child.insert(local_id.clone(), Arc::clone(resource));
                }
                None if optional => {
                    debug!(
                        subject = %subject,
                        resource_id = %parent_id,
                        "optional resource not available; omitting"
                    );
                }
                None => {
                    return Err(ResourceError::MissingResource {
                        subject: subject.to_string(),
                        resource_id: parent_id.to_string(),
                    })
                }
            }
        }
        Ok(child)
    }
}
