//! One action per sub-instance of a list resource.

use qualifier_domain::{ActionDeclaration, ResourceId};
use serde::{Deserialize, Serialize};

use super::{parse_specification, ActionGenerator, GeneratedAction};
use crate::error::ActionError;
use crate::resources::ResourcePool;

pub const GENERATOR_TYPE: &str = "ForEachResourceInstance";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForEachSpecification {
    pub action_to_repeat: ActionDeclaration,
    /// Generator-local ID of the list resource to iterate.
    pub resource_id: ResourceId,
    /// Generator-local ID each sub-instance is bound to for its action.
    pub local_resource_id: ResourceId,
}

/// Clones the pool once per sub-instance, rebinding `local_resource_id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForEachResourceInstance;

impl ActionGenerator for ForEachResourceInstance {
    fn construct(
        &self,
        specification: &serde_json::Value,
        resources: &ResourcePool,
    ) -> Result<Vec<GeneratedAction>, ActionError> {
        let spec: ForEachSpecification = parse_specification(GENERATOR_TYPE, specification)?;
        let subject = format!("action generator {GENERATOR_TYPE}");
        let list = resources.require(&spec.resource_id, &subject)?;
        let instances = list
            .sub_instances()
            .ok_or_else(|| ActionError::InvalidSpecification {
                subject: subject.clone(),
                reason: format!(
                    "resource '{}' of type '{}' has no sub-instances",
                    spec.resource_id,
                    list.resource_type()
                ),
            })?;

        Ok(instances
            .into_iter()
            .map(|instance| {
                let mut pool = resources.clone();
                pool.insert(spec.local_resource_id.clone(), instance);
                GeneratedAction {
                    declaration: spec.action_to_repeat.clone(),
                    resources: pool,
                }
            })
            .collect())
    }

    fn list_potential_actions(
        &self,
        specification: &serde_json::Value,
    ) -> Result<Vec<ActionDeclaration>, ActionError> {
        let spec: ForEachSpecification = parse_specification(GENERATOR_TYPE, specification)?;
        Ok(vec![spec.action_to_repeat])
    }
}
