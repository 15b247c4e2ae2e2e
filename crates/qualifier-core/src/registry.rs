//! Type-name registries consulted while building and judging a run.

use crate::capability::ConditionEvaluatorRegistry;
use crate::generators::GeneratorRegistry;
use crate::resources::ResourceTypeRegistry;
use crate::scenario::ScenarioRegistry;

/// Every name → constructor mapping a run needs, populated at startup.
///
/// Scenario types are never built in; the embedding test catalog registers
/// them.
#[derive(Debug, Clone, Default)]
pub struct Registries {
    pub resource_types: ResourceTypeRegistry,
    pub scenarios: ScenarioRegistry,
    pub generators: GeneratorRegistry,
    pub conditions: ConditionEvaluatorRegistry,
}

impl Registries {
    /// Built-in resource types, generators and condition evaluators.
    pub fn with_builtins() -> Self {
        Self {
            resource_types: ResourceTypeRegistry::with_builtins(),
            scenarios: ScenarioRegistry::new(),
            generators: GeneratorRegistry::with_builtins(),
            conditions: ConditionEvaluatorRegistry::with_builtins(),
        }
    }
}
