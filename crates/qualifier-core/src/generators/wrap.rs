//! Surround one action with a setup scenario and a teardown scenario.
//!
//! Setup and teardown share a [`CleanupToken`] created for this expansion
//! only, so whatever setup stores is visible to exactly one teardown.

use std::collections::BTreeMap;
use std::sync::Arc;

use qualifier_domain::{ActionDeclaration, ReactionToFailure, ResourceBindings, ResourceId};
use serde::{Deserialize, Serialize};

use super::{parse_specification, ActionGenerator, GeneratedAction};
use crate::error::ActionError;
use crate::resources::{CleanupToken, Resource, ResourcePool};

pub const GENERATOR_TYPE: &str = "WrapWithSetupTeardown";

/// Resource IDs setup and teardown scenarios are bound with.
pub const TARGETS_RESOURCE: &str = "targets";
pub const CONFIGURATION_RESOURCE: &str = "configuration";
pub const CLEANUP_TOKEN_RESOURCE: &str = "cleanup_token";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrapSpecification {
    pub action_to_wrap: ActionDeclaration,
    pub setup_scenario_type: String,
    pub teardown_scenario_type: String,
    /// Generator-local ID of the resource describing what setup prepares.
    pub targets_resource: ResourceId,
    /// Generator-local ID of the configuration handed to setup and teardown.
    pub configuration_resource: ResourceId,
}

impl WrapSpecification {
    fn bookend(&self, scenario_type: &str, token_id: &str) -> ActionDeclaration {
        let bindings: ResourceBindings = BTreeMap::from([
            (TARGETS_RESOURCE.to_string(), self.targets_resource.clone()),
            (
                CONFIGURATION_RESOURCE.to_string(),
                self.configuration_resource.clone(),
            ),
            (CLEANUP_TOKEN_RESOURCE.to_string(), token_id.to_string()),
        ]);
        ActionDeclaration::scenario(scenario_type, bindings)
    }

    /// Setup (Abort), wrapped action (Continue), teardown (Continue).
    fn children(&self, token_id: &str) -> [ActionDeclaration; 3] {
        [
            self.bookend(&self.setup_scenario_type, token_id)
                .with_on_failure(ReactionToFailure::Abort),
            self.action_to_wrap
                .clone()
                .with_on_failure(ReactionToFailure::Continue),
            self.bookend(&self.teardown_scenario_type, token_id),
        ]
    }
}

/// Always expands to exactly three children.
#[derive(Debug, Clone, Copy, Default)]
pub struct WrapWithSetupTeardown;

/// Pool ID the token is stored under, avoiding IDs already bound.
fn token_id(resources: &ResourcePool) -> String {
    let mut id = CLEANUP_TOKEN_RESOURCE.to_string();
    while resources.contains(&id) {
        id.push('_');
    }
    id
}

impl ActionGenerator for WrapWithSetupTeardown {
    fn construct(
        &self,
        specification: &serde_json::Value,
        resources: &ResourcePool,
    ) -> Result<Vec<GeneratedAction>, ActionError> {
        let spec: WrapSpecification = parse_specification(GENERATOR_TYPE, specification)?;
        let subject = format!("action generator {GENERATOR_TYPE}");
        resources.require(&spec.targets_resource, &subject)?;
        resources.require(&spec.configuration_resource, &subject)?;

        let token_id = token_id(resources);
        let mut bookend_pool = resources.clone();
        bookend_pool.insert(
            token_id.clone(),
            Arc::new(CleanupToken::new()) as Arc<dyn Resource>,
        );

        let [setup, wrapped, teardown] = spec.children(&token_id);
        Ok(vec![
            GeneratedAction {
                declaration: setup,
                resources: bookend_pool.clone(),
            },
            GeneratedAction {
                declaration: wrapped,
                resources: resources.clone(),
            },
            GeneratedAction {
                declaration: teardown,
                resources: bookend_pool,
            },
        ])
    }

    fn list_potential_actions(
        &self,
        specification: &serde_json::Value,
    ) -> Result<Vec<ActionDeclaration>, ActionError> {
        let spec: WrapSpecification = parse_specification(GENERATOR_TYPE, specification)?;
        Ok(spec.children(CLEANUP_TOKEN_RESOURCE).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{downcast, ConfigurationPayload};
    use serde_json::json;

    fn spec() -> serde_json::Value {
        json!({
            "action_to_wrap": {
                "test_suite": { "suite_type": "suites.Main" },
                "on_failure": "Abort"
            },
            "setup_scenario_type": "scenarios.Prepare",
            "teardown_scenario_type": "scenarios.Restore",
            "targets_resource": "dss_instances",
            "configuration_resource": "settings"
        })
    }

    fn pool() -> ResourcePool {
        let mut pool = ResourcePool::new();
        pool.insert(
            "dss_instances",
            Arc::new(ConfigurationPayload::new(json!(["dss1"]))) as Arc<dyn Resource>,
        );
        pool.insert(
            "settings",
            Arc::new(ConfigurationPayload::new(json!({}))) as Arc<dyn Resource>,
        );
        pool
    }

    #[test]
    fn test_three_children_with_policies() {
        let actions = WrapWithSetupTeardown.construct(&spec(), &pool()).unwrap();
        assert_eq!(actions.len(), 3);
        assert_eq!(actions[0].declaration.type_name(), "scenarios.Prepare");
        assert_eq!(actions[0].declaration.on_failure, ReactionToFailure::Abort);
        assert_eq!(actions[1].declaration.type_name(), "suites.Main");
        assert_eq!(actions[1].declaration.on_failure, ReactionToFailure::Continue);
        assert_eq!(actions[2].declaration.type_name(), "scenarios.Restore");
        assert_eq!(actions[2].declaration.on_failure, ReactionToFailure::Continue);
    }

    #[test]
    fn test_setup_and_teardown_share_token() {
        let actions = WrapWithSetupTeardown.construct(&spec(), &pool()).unwrap();
        let setup_token = actions[0].resources.get(CLEANUP_TOKEN_RESOURCE).unwrap();
        let teardown_token = actions[2].resources.get(CLEANUP_TOKEN_RESOURCE).unwrap();
        assert!(Arc::ptr_eq(setup_token, teardown_token));
        assert!(!actions[1].resources.contains(CLEANUP_TOKEN_RESOURCE));

        downcast::<CleanupToken>(setup_token.as_ref())
            .unwrap()
            .store(json!("state"));
        assert_eq!(
            downcast::<CleanupToken>(teardown_token.as_ref())
                .unwrap()
                .take(),
            Some(json!("state"))
        );
    }

    #[test]
    fn test_separate_expansions_get_separate_tokens() {
        let first = WrapWithSetupTeardown.construct(&spec(), &pool()).unwrap();
        let second = WrapWithSetupTeardown.construct(&spec(), &pool()).unwrap();
        assert!(!Arc::ptr_eq(
            first[0].resources.get(CLEANUP_TOKEN_RESOURCE).unwrap(),
            second[0].resources.get(CLEANUP_TOKEN_RESOURCE).unwrap()
        ));
    }

    #[test]
    fn test_potential_actions_always_three() {
        let shapes = WrapWithSetupTeardown.list_potential_actions(&spec()).unwrap();
        assert_eq!(shapes.len(), 3);
    }

    #[test]
    fn test_missing_targets() {
        let mut pool = ResourcePool::new();
        pool.insert(
            "settings",
            Arc::new(ConfigurationPayload::new(json!({}))) as Arc<dyn Resource>,
        );
        assert!(matches!(
            WrapWithSetupTeardown.construct(&spec(), &pool),
            Err(ActionError::Resource(_))
        ));
    }
}
