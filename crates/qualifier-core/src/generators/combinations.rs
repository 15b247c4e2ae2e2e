//! One action per assignment of candidates to roles.
//!
//! Assignments are enumerated odometer-style: index tuples over the candidate
//! list in ascending lexicographic order, rightmost role fastest, repetition
//! allowed. N candidates and K roles yield N^K tuples before filtering.

use std::collections::BTreeMap;
use std::sync::Arc;

use qualifier_domain::{ActionDeclaration, ResourceId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{parse_specification, ActionGenerator, GeneratedAction};
use crate::error::ActionError;
use crate::resources::{Resource, ResourcePool};

pub const GENERATOR_TYPE: &str = "CombinatorialRoleAssignment";

/// Filter over candidate role assignments.
///
/// Implemented by resources that expose it through
/// [`Resource::as_combination_selector`].
pub trait CombinationSelector: Send + Sync {
    /// `combination` maps each role name to the candidate assigned to it.
    fn is_valid_combination(&self, combination: &BTreeMap<String, Arc<dyn Resource>>) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinatorialRoleAssignmentSpecification {
    pub action_to_repeat: ActionDeclaration,
    /// Generator-local ID of the resource whose sub-instances are candidates.
    pub candidates_resource: ResourceId,
    /// Role names; each becomes a resource ID in the child's pool.
    pub roles: Vec<ResourceId>,
    /// Generator-local ID of a selector resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combination_selector: Option<ResourceId>,
}

/// Odometer over index tuples of length `roles` into `candidates` items.
#[derive(Debug, Clone)]
pub struct RoleCombinations {
    candidates: usize,
    current: Option<Vec<usize>>,
}

impl RoleCombinations {
    pub fn new(candidates: usize, roles: usize) -> Self {
        let current = if candidates == 0 && roles > 0 {
            None
        } else {
            Some(vec![0; roles])
        };
        Self {
            candidates,
            current,
        }
    }
}

impl Iterator for RoleCombinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let tuple = self.current.take()?;

        let mut next = tuple.clone();
        let mut position = next.len();
        while position > 0 {
            position -= 1;
            next[position] += 1;
            if next[position] < self.candidates {
                self.current = Some(next);
                break;
            }
            next[position] = 0;
        }
        Some(tuple)
    }
}

/// Binds each role to a candidate sub-instance, once per surviving tuple.
#[derive(Debug, Clone, Copy, Default)]
pub struct CombinatorialRoleAssignment;

impl ActionGenerator for CombinatorialRoleAssignment {
    fn construct(
        &self,
        specification: &serde_json::Value,
        resources: &ResourcePool,
    ) -> Result<Vec<GeneratedAction>, ActionError> {
        let spec: CombinatorialRoleAssignmentSpecification =
            parse_specification(GENERATOR_TYPE, specification)?;
        let subject = format!("action generator {GENERATOR_TYPE}");

        let list = resources.require(&spec.candidates_resource, &subject)?;
        let candidates = list
            .sub_instances()
            .ok_or_else(|| ActionError::InvalidSpecification {
                subject: subject.clone(),
                reason: format!(
                    "candidates resource '{}' of type '{}' has no sub-instances",
                    spec.candidates_resource,
                    list.resource_type()
                ),
            })?;

        let selector = match &spec.combination_selector {
            Some(id) => {
                let resource = resources.require(id, &subject)?;
                let selector = resource.as_combination_selector().ok_or_else(|| {
                    ActionError::InvalidSpecification {
                        subject: subject.clone(),
                        reason: format!(
                            "resource '{id}' of type '{}' is not a combination selector",
                            resource.resource_type()
                        ),
                    }
                })?;
                Some(selector)
            }
            None => None,
        };

        let mut actions = Vec::new();
        for tuple in RoleCombinations::new(candidates.len(), spec.roles.len()) {
            let combination: BTreeMap<String, Arc<dyn Resource>> = spec
                .roles
                .iter()
                .zip(&tuple)
                .map(|(role, &index)| (role.clone(), Arc::clone(&candidates[index])))
                .collect();

            if let Some(selector) = selector {
                if !selector.is_valid_combination(&combination) {
                    debug!(?tuple, "combination rejected by selector");
                    continue;
                }
            }

            let mut pool = resources.clone();
            for (role, candidate) in combination {
                pool.insert(role, candidate);
            }
            actions.push(GeneratedAction {
                declaration: spec.action_to_repeat.clone(),
                resources: pool,
            });
        }
        Ok(actions)
    }

    fn list_potential_actions(
        &self,
        specification: &serde_json::Value,
    ) -> Result<Vec<ActionDeclaration>, ActionError> {
        let spec: CombinatorialRoleAssignmentSpecification =
            parse_specification(GENERATOR_TYPE, specification)?;
        Ok(vec![spec.action_to_repeat])
    }
}
