//! Runtime action tree.
//!
//! [`ActionFactory`] turns declarations into a tree of [`TestSuiteAction`]s,
//! binding resources and expanding generators eagerly, so every
//! configuration problem surfaces before the first scenario runs. Each node
//! is consumed by the executor, which guarantees it runs at most once.

use std::collections::BTreeMap;
use std::fmt;

use qualifier_domain::{
    split_optional, ActionDeclaration, ActionGeneratorDefinition, ActionKind, ReactionToFailure,
    TestScenarioDeclaration, TestSuiteDeclaration, TestSuiteDefinition, TestSuiteSource,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ActionError, ResourceError};
use crate::registry::Registries;
use crate::resources::ResourcePool;
use crate::scenario::TestScenario;

/// Named suite definitions that `suite_type` references resolve against.
pub type SuiteCatalog = BTreeMap<String, TestSuiteDefinition>;

/// A constructed action plus the declaration it came from.
pub struct TestSuiteAction {
    pub declaration: ActionDeclaration,
    pub node: ActionNode,
}

impl TestSuiteAction {
    pub fn on_failure(&self) -> ReactionToFailure {
        self.declaration.on_failure
    }
}

impl fmt::Debug for TestSuiteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSuiteAction")
            .field("kind", &self.declaration.kind_name())
            .field("type", &self.declaration.type_name())
            .field("on_failure", &self.declaration.on_failure)
            .field("node", &self.node)
            .finish()
    }
}

/// Exactly one constructed variant.
#[derive(Debug)]
pub enum ActionNode {
    Scenario(ScenarioNode),
    Suite(SuiteNode),
    Generator(GeneratorNode),
}

pub struct ScenarioNode {
    pub scenario_type: String,
    pub scenario: Box<dyn TestScenario>,
}

impl fmt::Debug for ScenarioNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioNode")
            .field("scenario_type", &self.scenario_type)
            .field("name", &self.scenario.name())
            .finish()
    }
}

#[derive(Debug)]
pub struct SuiteNode {
    pub definition: TestSuiteDefinition,
    pub resources: ResourcePool,
    pub actions: Vec<TestSuiteAction>,
}

#[derive(Debug)]
pub struct GeneratorNode {
    pub generator_type: String,
    pub actions: Vec<TestSuiteAction>,
}

/// Builds action trees from declarations.
#[derive(Debug, Clone, Copy)]
pub struct ActionFactory<'a> {
    registries: &'a Registries,
    suites: &'a SuiteCatalog,
}

impl<'a> ActionFactory<'a> {
    pub fn new(registries: &'a Registries, suites: &'a SuiteCatalog) -> Self {
        Self { registries, suites }
    }

    /// Construct `declaration` against `resources`, the pool of the
    /// enclosing suite or generator.
    pub fn build(
        &self,
        declaration: &ActionDeclaration,
        resources: &ResourcePool,
    ) -> Result<TestSuiteAction, ActionError> {
        self.build_in(declaration, resources, &mut Vec::new())
    }

    fn build_in(
        &self,
        declaration: &ActionDeclaration,
        resources: &ResourcePool,
        suite_stack: &mut Vec<String>,
    ) -> Result<TestSuiteAction, ActionError> {
        let node = match &declaration.kind {
            ActionKind::TestScenario(scenario) => {
                ActionNode::Scenario(self.build_scenario(scenario, resources)?)
            }
            ActionKind::TestSuite(suite) => {
                ActionNode::Suite(self.build_suite(suite, resources, suite_stack)?)
            }
            ActionKind::ActionGenerator(generator) => {
                ActionNode::Generator(self.build_generator(generator, resources, suite_stack)?)
            }
        };
        Ok(TestSuiteAction {
            declaration: declaration.clone(),
            node,
        })
    }

    fn build_scenario(
        &self,
        declaration: &TestScenarioDeclaration,
        resources: &ResourcePool,
    ) -> Result<ScenarioNode, ActionError> {
        let subject = format!("test scenario {}", declaration.scenario_type);
        let factory = self
            .registries
            .scenarios
            .get(&declaration.scenario_type)
            .ok_or_else(|| ActionError::UnknownScenarioType(declaration.scenario_type.clone()))?;
        let bound = resources.make_child_resources(&declaration.resources, &subject)?;
        let scenario = factory(&bound)?;
        debug!(
            scenario_type = %declaration.scenario_type,
            resources = bound.len(),
            "constructed test scenario"
        );
        Ok(ScenarioNode {
            scenario_type: declaration.scenario_type.clone(),
            scenario,
        })
    }

    fn build_suite(
        &self,
        declaration: &TestSuiteDeclaration,
        resources: &ResourcePool,
        suite_stack: &mut Vec<String>,
    ) -> Result<SuiteNode, ActionError> {
        let definition = match &declaration.source {
            TestSuiteSource::Catalog(suite_type) => {
                if suite_stack.contains(suite_type) {
                    let mut path = suite_stack.clone();
                    path.push(suite_type.clone());
                    return Err(ActionError::SuiteCycle { path });
                }
                self.suites
                    .get(suite_type)
                    .cloned()
                    .ok_or_else(|| ActionError::UnknownSuiteType(suite_type.clone()))?
            }
            TestSuiteSource::Inline(definition) => definition.as_ref().clone(),
        };
        let subject = format!("test suite {}", definition.name);

        let mut pool = resources.make_child_resources(&declaration.resources, &subject)?;
        check_declared_resources(&definition, &pool, &subject)?;
        pool.extend(&definition.local_resources, &self.registries.resource_types)?;

        let catalog_key = match &declaration.source {
            TestSuiteSource::Catalog(suite_type) => Some(suite_type.clone()),
            TestSuiteSource::Inline(_) => None,
        };
        if let Some(key) = &catalog_key {
            suite_stack.push(key.clone());
        }
        let actions = definition
            .actions
            .iter()
            .map(|child| self.build_in(child, &pool, suite_stack))
            .collect::<Result<Vec<_>, _>>();
        if catalog_key.is_some() {
            suite_stack.pop();
        }

        debug!(suite = %definition.name, resources = pool.len(), "constructed test suite");
        Ok(SuiteNode {
            actions: actions?,
            definition,
            resources: pool,
        })
    }

    fn build_generator(
        &self,
        declaration: &ActionGeneratorDefinition,
        resources: &ResourcePool,
        suite_stack: &mut Vec<String>,
    ) -> Result<GeneratorNode, ActionError> {
        let subject = format!("action generator {}", declaration.generator_type);
        let generator = self.registries.generators.get(&declaration.generator_type)?;
        let bound = resources.make_child_resources(&declaration.resources, &subject)?;
        let generated = generator.construct(&declaration.specification, &bound)?;
        debug!(
            generator_type = %declaration.generator_type,
            children = generated.len(),
            "expanded action generator"
        );

        let actions = generated
            .iter()
            .map(|child| self.build_in(&child.declaration, &child.resources, suite_stack))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(GeneratorNode {
            generator_type: declaration.generator_type.clone(),
            actions,
        })
    }

    /// Resource-free shape of the tree `declaration` may produce.
    pub fn potential_actions(
        &self,
        declaration: &ActionDeclaration,
    ) -> Result<PotentialAction, ActionError> {
        self.potential_in(declaration, &mut Vec::new())
    }

    fn potential_in(
        &self,
        declaration: &ActionDeclaration,
        suite_stack: &mut Vec<String>,
    ) -> Result<PotentialAction, ActionError> {
        let children = match &declaration.kind {
            ActionKind::TestScenario(scenario) => {
                if !self.registries.scenarios.contains(&scenario.scenario_type) {
                    return Err(ActionError::UnknownScenarioType(
                        scenario.scenario_type.clone(),
                    ));
                }
                Vec::new()
            }
            ActionKind::TestSuite(suite) => {
                let (definition, catalog_key) = match &suite.source {
                    TestSuiteSource::Catalog(suite_type) => {
                        if suite_stack.contains(suite_type) {
                            let mut path = suite_stack.clone();
                            path.push(suite_type.clone());
                            return Err(ActionError::SuiteCycle { path });
                        }
                        let definition = self
                            .suites
                            .get(suite_type)
                            .ok_or_else(|| ActionError::UnknownSuiteType(suite_type.clone()))?;
                        (definition, Some(suite_type))
                    }
                    TestSuiteSource::Inline(definition) => (definition.as_ref(), None),
                };
                if let Some(key) = catalog_key {
                    suite_stack.push(key.clone());
                }
                let children = definition
                    .actions
                    .iter()
                    .map(|child| self.potential_in(child, suite_stack))
                    .collect::<Result<Vec<_>, _>>();
                if catalog_key.is_some() {
                    suite_stack.pop();
                }
                children?
            }
            ActionKind::ActionGenerator(generator) => self
                .registries
                .generators
                .get(&generator.generator_type)?
                .list_potential_actions(&generator.specification)?
                .iter()
                .map(|child| self.potential_in(child, suite_stack))
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(PotentialAction {
            kind: declaration.kind_name().to_string(),
            type_name: declaration.type_name().to_string(),
            on_failure: declaration.on_failure,
            children,
        })
    }
}

/// Every resource a suite declares must be bound with the declared type,
/// unless the declared type carries the optional suffix.
fn check_declared_resources(
    definition: &TestSuiteDefinition,
    pool: &ResourcePool,
    subject: &str,
) -> Result<(), ResourceError> {
    for (id, declared) in &definition.resources {
        let (expected, optional) = split_optional(declared);
        match pool.get(id) {
            None if optional => {}
            None => {
                return Err(ResourceError::MissingResource {
                    subject: subject.to_string(),
                    resource_id: id.clone(),
                })
            }
            Some(resource) if resource.resource_type() != expected => {
                return Err(ResourceError::TypeMismatch {
                    subject: subject.to_string(),
                    resource_id: id.clone(),
                    expected: expected.to_string(),
                    actual: resource.resource_type().to_string(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Static shape of an action, for dry runs and documentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotentialAction {
    /// `test_scenario`, `test_suite` or `action_generator`.
    pub kind: String,
    pub type_name: String,
    pub on_failure: ReactionToFailure,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PotentialAction>,
}

impl PotentialAction {
    /// Scenario types reachable from this shape, depth-first.
    pub fn scenario_types(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_scenario_types(&mut out);
        out
    }

    fn collect_scenario_types<'s>(&'s self, out: &mut Vec<&'s str>) {
        if self.kind == "test_scenario" {
            out.push(&self.type_name);
        }
        for child in &self.children {
            child.collect_scenario_types(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::resources::{ConfigurationPayload, ParticipantList, Resource};
    use crate::scenario::ScenarioRecorder;
    use async_trait::async_trait;
    use qualifier_domain::ResourceBindings;
    use serde_json::json;

    struct Noop;

    #[async_trait]
    impl TestScenario for Noop {
        fn name(&self) -> &str {
            "Noop"
        }

        async fn run(&mut self, _recorder: &mut ScenarioRecorder) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn registries() -> Registries {
        let mut registries = Registries::with_builtins();
        registries
            .scenarios
            .register("scenarios.Noop", |_| Ok(Box::new(Noop) as Box<dyn TestScenario>));
        registries
    }

    fn bind(pairs: &[(&str, &str)]) -> ResourceBindings {
        pairs
            .iter()
            .map(|(l, p)| (l.to_string(), p.to_string()))
            .collect()
    }

    fn pool() -> ResourcePool {
        let mut pool = ResourcePool::new();
        pool.insert(
            "uss_list",
            Arc::new(ParticipantList::new(["a", "b"])) as Arc<dyn Resource>,
        );
        pool.insert(
            "settings",
            Arc::new(ConfigurationPayload::new(json!({}))) as Arc<dyn Resource>,
        );
        pool
    }

    #[test]
    fn test_unknown_scenario_type() {
        let registries = registries();
        let catalog = SuiteCatalog::new();
        let factory = ActionFactory::new(&registries, &catalog);
        let err = factory
            .build(&ActionDeclaration::scenario("scenarios.Missing", bind(&[])), &pool())
            .unwrap_err();
        assert!(matches!(err, ActionError::UnknownScenarioType(t) if t == "scenarios.Missing"));
    }

    #[test]
    fn test_suite_declared_resources_checked() {
        let registries = registries();
        let catalog = SuiteCatalog::new();
        let factory = ActionFactory::new(&registries, &catalog);

        let definition = TestSuiteDefinition::new("Suite", vec![])
            .with_resource("participants", "ParticipantList")
            .with_resource("extra", "ConfigurationPayload?");
        let ok = factory.build(
            &ActionDeclaration::inline_suite(
                definition.clone(),
                bind(&[("participants", "uss_list")]),
            ),
            &pool(),
        );
        assert!(ok.is_ok());

        let missing = factory
            .build(
                &ActionDeclaration::inline_suite(definition.clone(), bind(&[])),
                &pool(),
            )
            .unwrap_err();
        assert!(matches!(
            missing,
            ActionError::Resource(ResourceError::MissingResource { .. })
        ));

        let mismatched = factory
            .build(
                &ActionDeclaration::inline_suite(definition, bind(&[("participants", "settings")])),
                &pool(),
            )
            .unwrap_err();
        assert!(matches!(
            mismatched,
            ActionError::Resource(ResourceError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_generator_expanded_eagerly() {
        let registries = registries();
        let catalog = SuiteCatalog::new();
        let factory = ActionFactory::new(&registries, &catalog);
        let declaration = ActionDeclaration::generator(
            "ForEachResourceInstance",
            json!({
                "action_to_repeat": {
                    "test_scenario": {
                        "scenario_type": "scenarios.Noop",
                        "resources": { "participant": "participant" }
                    }
                },
                "resource_id": "list",
                "local_resource_id": "participant"
            }),
            bind(&[("list", "uss_list")]),
        );
        let action = factory.build(&declaration, &pool()).unwrap();
        match action.node {
            ActionNode::Generator(generator) => assert_eq!(generator.actions.len(), 2),
            other => panic!("expected generator, got {other:?}"),
        }
    }

    #[test]
    fn test_recursive_catalog_suite_rejected() {
        let registries = registries();
        let mut catalog = SuiteCatalog::new();
        catalog.insert(
            "suites.Loop".to_string(),
            TestSuiteDefinition::new(
                "suites.Loop",
                vec![ActionDeclaration::suite("suites.Loop", bind(&[]))],
            ),
        );
        let factory = ActionFactory::new(&registries, &catalog);
        let declaration = ActionDeclaration::suite("suites.Loop", bind(&[]));

        assert!(matches!(
            factory.build(&declaration, &pool()),
            Err(ActionError::SuiteCycle { .. })
        ));
        assert!(matches!(
            factory.potential_actions(&declaration),
            Err(ActionError::SuiteCycle { .. })
        ));
    }

    #[test]
    fn test_potential_actions_without_resources() {
        let registries = registries();
        let catalog = SuiteCatalog::new();
        let factory = ActionFactory::new(&registries, &catalog);
        let suite = TestSuiteDefinition::new(
            "Suite",
            vec![
                ActionDeclaration::scenario("scenarios.Noop", bind(&[])),
                ActionDeclaration::generator(
                    "Repeat",
                    json!({
                        "action_to_repeat": {
                            "test_scenario": { "scenario_type": "scenarios.Noop" }
                        },
                        "times": 4
                    }),
                    bind(&[]),
                ),
            ],
        )
        .with_resource("participants", "ParticipantList");

        let shape = factory
            .potential_actions(&ActionDeclaration::inline_suite(suite, bind(&[])))
            .unwrap();
        assert_eq!(shape.kind, "test_suite");
        assert_eq!(shape.children.len(), 2);
        assert_eq!(shape.scenario_types(), vec!["scenarios.Noop", "scenarios.Noop"]);
    }
}
