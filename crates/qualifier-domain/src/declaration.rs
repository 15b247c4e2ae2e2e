//! Declarative action, suite and resource definitions.
//!
//! Declarations are plain serde data. Unions that are written on disk as
//! "exactly one of several optional fields" are validated once, when they are
//! deserialized, and are represented as proper enums afterwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::condition::{BadgeDefinition, ParticipantCapabilityDefinition};
use crate::error::DomainError;
use crate::ids::ResourceId;

/// Suffix marking a resource reference as optional.
pub const OPTIONAL_SUFFIX: char = '?';

/// Split an optionally `?`-suffixed resource reference.
///
/// Returns the bare reference and whether it was marked optional.
pub fn split_optional(reference: &str) -> (&str, bool) {
    match reference.strip_suffix(OPTIONAL_SUFFIX) {
        Some(bare) => (bare, true),
        None => (reference, false),
    }
}

/// Mapping from a child's local resource ID to a parent resource ID.
///
/// Parent IDs ending in `?` are optional: if the parent lacks them the
/// binding is omitted instead of failing.
pub type ResourceBindings = BTreeMap<ResourceId, ResourceId>;

/// How a parent reacts when a child action is unsuccessful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactionToFailure {
    /// Keep executing subsequent sibling actions.
    #[default]
    Continue,
    /// Stop executing subsequent sibling actions.
    Abort,
}

/// Declaration of a single resource to be constructed into a pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDeclaration {
    /// Registered resource type name.
    pub resource_type: String,

    /// Type-specific specification passed to the constructor.
    #[serde(default)]
    pub specification: serde_json::Value,

    /// Constructor parameter name → ID of another resource in the pool.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, ResourceId>,
}

impl ResourceDeclaration {
    pub fn new(resource_type: impl Into<String>, specification: serde_json::Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            specification,
            dependencies: BTreeMap::new(),
        }
    }

    /// Add a dependency on another resource.
    pub fn with_dependency(mut self, param: impl Into<String>, id: impl Into<ResourceId>) -> Self {
        self.dependencies.insert(param.into(), id.into());
        self
    }
}

/// Reference to a registered test scenario type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestScenarioDeclaration {
    pub scenario_type: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: ResourceBindings,
}

/// Where a test suite's definition comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum TestSuiteSource {
    /// Named definition from the suite catalog.
    Catalog(String),
    /// Definition written inline in the declaration.
    Inline(Box<TestSuiteDefinition>),
}

/// Reference to a test suite, by catalog name or inline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTestSuiteDeclaration", into = "RawTestSuiteDeclaration")]
pub struct TestSuiteDeclaration {
    pub source: TestSuiteSource,
    pub resources: ResourceBindings,
}

#[derive(Serialize, Deserialize)]
struct RawTestSuiteDeclaration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    suite_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    suite_definition: Option<Box<TestSuiteDefinition>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    resources: ResourceBindings,
}

impl TryFrom<RawTestSuiteDeclaration> for TestSuiteDeclaration {
    type Error = DomainError;

    fn try_from(raw: RawTestSuiteDeclaration) -> Result<Self, Self::Error> {
        let source = match (raw.suite_type, raw.suite_definition) {
            (Some(name), None) => TestSuiteSource::Catalog(name),
            (None, Some(definition)) => TestSuiteSource::Inline(definition),
            (a, b) => {
                return Err(DomainError::NotExactlyOne {
                    kind: "test suite declaration",
                    expected: "suite_type, suite_definition",
                    found: usize::from(a.is_some()) + usize::from(b.is_some()),
                })
            }
        };
        Ok(Self {
            source,
            resources: raw.resources,
        })
    }
}

impl From<TestSuiteDeclaration> for RawTestSuiteDeclaration {
    fn from(decl: TestSuiteDeclaration) -> Self {
        let (suite_type, suite_definition) = match decl.source {
            TestSuiteSource::Catalog(name) => (Some(name), None),
            TestSuiteSource::Inline(definition) => (None, Some(definition)),
        };
        Self {
            suite_type,
            suite_definition,
            resources: decl.resources,
        }
    }
}

/// Reference to a registered action generator type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionGeneratorDefinition {
    pub generator_type: String,

    /// Generator-specific specification.
    #[serde(default)]
    pub specification: serde_json::Value,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: ResourceBindings,
}

/// The single populated variant of an [`ActionDeclaration`].
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    TestScenario(TestScenarioDeclaration),
    TestSuite(TestSuiteDeclaration),
    ActionGenerator(ActionGeneratorDefinition),
}

/// Declared unit of test work plus the parent's reaction to its failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawActionDeclaration", into = "RawActionDeclaration")]
pub struct ActionDeclaration {
    pub kind: ActionKind,
    pub on_failure: ReactionToFailure,
}

#[derive(Serialize, Deserialize)]
struct RawActionDeclaration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    test_scenario: Option<TestScenarioDeclaration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    test_suite: Option<TestSuiteDeclaration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action_generator: Option<ActionGeneratorDefinition>,
    #[serde(default)]
    on_failure: ReactionToFailure,
}

impl TryFrom<RawActionDeclaration> for ActionDeclaration {
    type Error = DomainError;

    fn try_from(raw: RawActionDeclaration) -> Result<Self, Self::Error> {
        let kind = match (raw.test_scenario, raw.test_suite, raw.action_generator) {
            (Some(s), None, None) => ActionKind::TestScenario(s),
            (None, Some(s), None) => ActionKind::TestSuite(s),
            (None, None, Some(g)) => ActionKind::ActionGenerator(g),
            (a, b, c) => {
                return Err(DomainError::NotExactlyOne {
                    kind: "action declaration",
                    expected: "test_scenario, test_suite, action_generator",
                    found: usize::from(a.is_some())
                        + usize::from(b.is_some())
                        + usize::from(c.is_some()),
                })
            }
        };
        Ok(Self {
            kind,
            on_failure: raw.on_failure,
        })
    }
}

impl From<ActionDeclaration> for RawActionDeclaration {
    fn from(decl: ActionDeclaration) -> Self {
        let mut raw = Self {
            test_scenario: None,
            test_suite: None,
            action_generator: None,
            on_failure: decl.on_failure,
        };
        match decl.kind {
            ActionKind::TestScenario(s) => raw.test_scenario = Some(s),
            ActionKind::TestSuite(s) => raw.test_suite = Some(s),
            ActionKind::ActionGenerator(g) => raw.action_generator = Some(g),
        }
        raw
    }
}

impl ActionDeclaration {
    /// Declare a test scenario with the given resource bindings.
    pub fn scenario(scenario_type: impl Into<String>, resources: ResourceBindings) -> Self {
        Self {
            kind: ActionKind::TestScenario(TestScenarioDeclaration {
                scenario_type: scenario_type.into(),
                resources,
            }),
            on_failure: ReactionToFailure::Continue,
        }
    }

    /// Declare a test suite from the suite catalog.
    pub fn suite(suite_type: impl Into<String>, resources: ResourceBindings) -> Self {
        Self {
            kind: ActionKind::TestSuite(TestSuiteDeclaration {
                source: TestSuiteSource::Catalog(suite_type.into()),
                resources,
            }),
            on_failure: ReactionToFailure::Continue,
        }
    }

    /// Declare an inline test suite.
    pub fn inline_suite(definition: TestSuiteDefinition, resources: ResourceBindings) -> Self {
        Self {
            kind: ActionKind::TestSuite(TestSuiteDeclaration {
                source: TestSuiteSource::Inline(Box::new(definition)),
                resources,
            }),
            on_failure: ReactionToFailure::Continue,
        }
    }

    /// Declare an action generator.
    pub fn generator(
        generator_type: impl Into<String>,
        specification: serde_json::Value,
        resources: ResourceBindings,
    ) -> Self {
        Self {
            kind: ActionKind::ActionGenerator(ActionGeneratorDefinition {
                generator_type: generator_type.into(),
                specification,
                resources,
            }),
            on_failure: ReactionToFailure::Continue,
        }
    }

    pub fn with_on_failure(mut self, on_failure: ReactionToFailure) -> Self {
        self.on_failure = on_failure;
        self
    }

    /// Serialized field name of the populated variant.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ActionKind::TestScenario(_) => "test_scenario",
            ActionKind::TestSuite(_) => "test_suite",
            ActionKind::ActionGenerator(_) => "action_generator",
        }
    }

    /// Scenario type, suite name or generator type of this action.
    pub fn type_name(&self) -> &str {
        match &self.kind {
            ActionKind::TestScenario(s) => &s.scenario_type,
            ActionKind::TestSuite(s) => match &s.source {
                TestSuiteSource::Catalog(name) => name,
                TestSuiteSource::Inline(definition) => &definition.name,
            },
            ActionKind::ActionGenerator(g) => &g.generator_type,
        }
    }

    /// Resource bindings of the populated variant.
    pub fn resources(&self) -> &ResourceBindings {
        match &self.kind {
            ActionKind::TestScenario(s) => &s.resources,
            ActionKind::TestSuite(s) => &s.resources,
            ActionKind::ActionGenerator(g) => &g.resources,
        }
    }
}

/// Full definition of a test suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSuiteDefinition {
    pub name: String,

    /// Local resource ID → expected resource type; a `?` suffix on the type
    /// marks the resource as optional.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<ResourceId, String>,

    /// Resources constructed for this suite only, after its bound resources.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub local_resources: BTreeMap<ResourceId, ResourceDeclaration>,

    pub actions: Vec<ActionDeclaration>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participant_verifiable_capabilities: Vec<ParticipantCapabilityDefinition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub badges: Vec<BadgeDefinition>,
}

impl TestSuiteDefinition {
    pub fn new(name: impl Into<String>, actions: Vec<ActionDeclaration>) -> Self {
        Self {
            name: name.into(),
            resources: BTreeMap::new(),
            local_resources: BTreeMap::new(),
            actions,
            participant_verifiable_capabilities: Vec::new(),
            badges: Vec::new(),
        }
    }

    /// Declare a resource this suite expects from its parent.
    pub fn with_resource(
        mut self,
        id: impl Into<ResourceId>,
        resource_type: impl Into<String>,
    ) -> Self {
        self.resources.insert(id.into(), resource_type.into());
        self
    }

    pub fn with_capability(mut self, capability: ParticipantCapabilityDefinition) -> Self {
        self.participant_verifiable_capabilities.push(capability);
        self
    }

    pub fn with_badge(mut self, badge: BadgeDefinition) -> Self {
        self.badges.push(badge);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_optional() {
        assert_eq!(split_optional("dss?"), ("dss", true));
        assert_eq!(split_optional("dss"), ("dss", false));
    }

    #[test]
    fn test_action_declaration_defaults_to_continue() {
        let decl: ActionDeclaration = serde_json::from_value(json!({
            "test_scenario": { "scenario_type": "scenarios.Noop" }
        }))
        .unwrap();
        assert_eq!(decl.on_failure, ReactionToFailure::Continue);
        assert_eq!(decl.kind_name(), "test_scenario");
        assert_eq!(decl.type_name(), "scenarios.Noop");
    }

    #[test]
    fn test_action_declaration_rejects_two_variants() {
        let result: Result<ActionDeclaration, _> = serde_json::from_value(json!({
            "test_scenario": { "scenario_type": "a" },
            "action_generator": { "generator_type": "b" }
        }));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("exactly one"), "{err}");
    }

    #[test]
    fn test_action_declaration_rejects_no_variant() {
        let result: Result<ActionDeclaration, _> =
            serde_json::from_value(json!({ "on_failure": "Abort" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_suite_declaration_by_type_or_inline() {
        let by_type: ActionDeclaration = serde_json::from_value(json!({
            "test_suite": { "suite_type": "suites.Basic", "resources": { "a": "b?" } },
            "on_failure": "Abort"
        }))
        .unwrap();
        assert_eq!(by_type.on_failure, ReactionToFailure::Abort);
        assert_eq!(by_type.type_name(), "suites.Basic");
        assert_eq!(by_type.resources().get("a").map(String::as_str), Some("b?"));

        let inline: ActionDeclaration = serde_json::from_value(json!({
            "test_suite": { "suite_definition": { "name": "Inline", "actions": [] } }
        }))
        .unwrap();
        assert_eq!(inline.type_name(), "Inline");

        let both: Result<ActionDeclaration, _> = serde_json::from_value(json!({
            "test_suite": {
                "suite_type": "suites.Basic",
                "suite_definition": { "name": "Inline", "actions": [] }
            }
        }));
        assert!(both.is_err());
    }

    #[test]
    fn test_declaration_serializes_as_single_field() {
        let decl = ActionDeclaration::scenario("scenarios.Noop", ResourceBindings::new())
            .with_on_failure(ReactionToFailure::Abort);
        let value = serde_json::to_value(&decl).unwrap();
        assert_eq!(
            value,
            json!({ "test_scenario": { "scenario_type": "scenarios.Noop" }, "on_failure": "Abort" })
        );
        let back: ActionDeclaration = serde_json::from_value(value).unwrap();
        assert_eq!(back, decl);
    }
}
