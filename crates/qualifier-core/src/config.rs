//! Test configuration: what to build, what to run and how.

use std::collections::BTreeMap;
use std::path::Path;

use qualifier_domain::{
    ActionDeclaration, ActionKind, RequirementCatalog, ResourceDeclaration, ResourceId,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::action::SuiteCatalog;
use crate::error::Result;

/// Complete description of one qualification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConfiguration {
    /// Resources available to the root action.
    #[serde(default)]
    pub resources: BTreeMap<ResourceId, ResourceDeclaration>,

    /// Root of the action tree.
    pub action: ActionDeclaration,

    /// Suite definitions referenced by `suite_type`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub suites: SuiteCatalog,

    /// Named requirement sets referenced by requirement collections.
    #[serde(default, skip_serializing_if = "RequirementCatalog::is_empty")]
    pub requirement_sets: RequirementCatalog,

    #[serde(default)]
    pub execution: ExecutionConfiguration,
}

impl TestConfiguration {
    pub fn new(action: ActionDeclaration) -> Self {
        Self {
            resources: BTreeMap::new(),
            action,
            suites: SuiteCatalog::new(),
            requirement_sets: RequirementCatalog::new(),
            execution: ExecutionConfiguration::default(),
        }
    }

    /// Load a configuration from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let configuration = Self::from_json_str(&raw)?;
        info!(
            path = %path.display(),
            resources = configuration.resources.len(),
            "loaded test configuration"
        );
        Ok(configuration)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Run-wide controls over which actions execute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfiguration {
    /// Skip everything after the first unsuccessful scenario, whatever the
    /// declared `on_failure` reactions say.
    #[serde(default)]
    pub stop_fast: bool,

    /// When set, only scenarios matching a selector (or inside a suite or
    /// generator matching one) run. Suites and generators themselves are
    /// always entered so matching descendants can be reached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_action_when: Option<Vec<ActionSelector>>,

    /// Actions matching any selector are skipped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_action_when: Vec<ActionSelector>,
}

impl ExecutionConfiguration {
    pub fn is_included(&self, declaration: &ActionDeclaration) -> bool {
        self.include_action_when
            .as_ref()
            .map_or(true, |selectors| selectors.iter().any(|s| s.matches(declaration)))
    }

    pub fn is_skipped(&self, declaration: &ActionDeclaration) -> bool {
        self.skip_action_when.iter().any(|s| s.matches(declaration))
    }
}

/// Matches actions by kind and, optionally, by type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSelector {
    IsTestSuite(TypeFilter),
    IsTestScenario(TypeFilter),
    IsActionGenerator(TypeFilter),
}

/// Accepted type names; empty accepts every type of the selected kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
}

impl TypeFilter {
    fn accepts(&self, type_name: &str) -> bool {
        self.types.is_empty() || self.types.iter().any(|t| t == type_name)
    }
}

impl ActionSelector {
    pub fn matches(&self, declaration: &ActionDeclaration) -> bool {
        let filter = match (self, &declaration.kind) {
            (ActionSelector::IsTestSuite(f), ActionKind::TestSuite(_)) => f,
            (ActionSelector::IsTestScenario(f), ActionKind::TestScenario(_)) => f,
            (ActionSelector::IsActionGenerator(f), ActionKind::ActionGenerator(_)) => f,
            _ => return false,
        };
        filter.accepts(declaration.type_name())
    }
}
