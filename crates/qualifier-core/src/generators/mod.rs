//! Action generators: declarations that expand into concrete child actions.
//!
//! A generator receives its specification and its bound resources and
//! returns an ordered list of child declarations, each paired with the pool
//! the child resolves its own bindings against.
//!
//! Built-ins:
//! - [`repeat::Repeat`]: the same action N times
//! - [`for_each::ForEachResourceInstance`]: one action per list entry
//! - [`combinations::CombinatorialRoleAssignment`]: one action per role tuple
//! - [`wrap::WrapWithSetupTeardown`]: setup, then the wrapped action, then teardown

pub mod combinations;
pub mod for_each;
pub mod repeat;
pub mod wrap;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use qualifier_domain::ActionDeclaration;
use serde::de::DeserializeOwned;

use crate::error::ActionError;
use crate::resources::ResourcePool;

pub use combinations::{CombinatorialRoleAssignment, CombinationSelector, RoleCombinations};
pub use for_each::ForEachResourceInstance;
pub use repeat::Repeat;
pub use wrap::WrapWithSetupTeardown;

/// One expanded child: its declaration and the pool it binds against.
#[derive(Debug, Clone)]
pub struct GeneratedAction {
    pub declaration: ActionDeclaration,
    pub resources: ResourcePool,
}

/// Strategy that expands one declared generator into child actions.
pub trait ActionGenerator: Send + Sync {
    /// Expand `specification` against the generator's bound `resources`.
    fn construct(
        &self,
        specification: &serde_json::Value,
        resources: &ResourcePool,
    ) -> Result<Vec<GeneratedAction>, ActionError>;

    /// Shapes of the actions this generator may produce, without resources.
    fn list_potential_actions(
        &self,
        specification: &serde_json::Value,
    ) -> Result<Vec<ActionDeclaration>, ActionError>;
}

/// Deserialize a generator specification, naming the generator on failure.
pub fn parse_specification<T: DeserializeOwned>(
    generator_type: &str,
    specification: &serde_json::Value,
) -> Result<T, ActionError> {
    serde_json::from_value(specification.clone()).map_err(|e| ActionError::InvalidSpecification {
        subject: format!("action generator {generator_type}"),
        reason: e.to_string(),
    })
}

/// Explicit mapping from generator type names to strategies.
#[derive(Clone, Default)]
pub struct GeneratorRegistry {
    generators: HashMap<String, Arc<dyn ActionGenerator>>,
}

impl fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.generators.keys().collect();
        types.sort();
        f.debug_struct("GeneratorRegistry")
            .field("types", &types)
            .finish()
    }
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in generator registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register(repeat::GENERATOR_TYPE, Repeat)
            .register(for_each::GENERATOR_TYPE, ForEachResourceInstance)
            .register(combinations::GENERATOR_TYPE, CombinatorialRoleAssignment)
            .register(wrap::GENERATOR_TYPE, WrapWithSetupTeardown);
        registry
    }

    /// Register (or replace) the strategy for `generator_type`.
    pub fn register(
        &mut self,
        generator_type: impl Into<String>,
        generator: impl ActionGenerator + 'static,
    ) -> &mut Self {
        self.generators
            .insert(generator_type.into(), Arc::new(generator));
        self
    }

    pub fn get(&self, generator_type: &str) -> Result<&Arc<dyn ActionGenerator>, ActionError> {
        self.generators
            .get(generator_type)
            .ok_or_else(|| ActionError::UnknownGeneratorType(generator_type.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = GeneratorRegistry::with_builtins();
        for name in [
            repeat::GENERATOR_TYPE,
            for_each::GENERATOR_TYPE,
            combinations::GENERATOR_TYPE,
            wrap::GENERATOR_TYPE,
        ] {
            assert!(registry.get(name).is_ok(), "{name} missing");
        }
        assert!(matches!(
            registry.get("NoSuchGenerator"),
            Err(ActionError::UnknownGeneratorType(_))
        ));
    }
}
