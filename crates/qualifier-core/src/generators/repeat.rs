//! Repeat one action a fixed number of times.

use qualifier_domain::ActionDeclaration;
use serde::{Deserialize, Serialize};

use super::{parse_specification, ActionGenerator, GeneratedAction};
use crate::error::ActionError;
use crate::resources::ResourcePool;

pub const GENERATOR_TYPE: &str = "Repeat";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatSpecification {
    /// Declaration emitted unchanged, including its own `on_failure`.
    pub action_to_repeat: ActionDeclaration,
    pub times: usize,
}

/// Emits `action_to_repeat` `times` times, each against the generator's pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct Repeat;

impl ActionGenerator for Repeat {
    fn construct(
        &self,
        specification: &serde_json::Value,
        resources: &ResourcePool,
    ) -> Result<Vec<GeneratedAction>, ActionError> {
        let spec: RepeatSpecification = parse_specification(GENERATOR_TYPE, specification)?;
        Ok((0..spec.times)
            .map(|_| GeneratedAction {
                declaration: spec.action_to_repeat.clone(),
                resources: resources.clone(),
            })
            .collect())
    }

    fn list_potential_actions(
        &self,
        specification: &serde_json::Value,
    ) -> Result<Vec<ActionDeclaration>, ActionError> {
        let spec: RepeatSpecification = parse_specification(GENERATOR_TYPE, specification)?;
        Ok(vec![spec.action_to_repeat])
    }
}
