//! Capability and badge verification.
//!
//! Conditions are evaluated per participant against a completed
//! [`TestSuiteReport`]. Evaluation dispatches on the condition kind through a
//! [`ConditionEvaluatorRegistry`]; new kinds are added by registering an
//! evaluator, never by editing the dispatcher.
//!
//! `capability_verified` conditions locate suite reports with a small path
//! language rooted at the suite being evaluated:
//!
//! ```text
//! self | $                      the suite itself
//! $.actions[2].test_suite       third child, if it is a suite
//! $.actions[*].action_generator.actions[*].test_suite
//! ```
//!
//! Only the suite itself and its descendants are addressable. A `parent` or
//! `^` segment would reach a suite whose capabilities are not yet evaluated
//! and is rejected as [`ConditionError::AncestorReference`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use qualifier_domain::{
    ActionGeneratorReport, CapabilityEvaluationReport, Condition, ParticipantId, ReportTree,
    RequirementCatalog, RequirementId, TestSuiteActionReport, TestSuiteDefinition,
    TestSuiteReport, SELF_LOCATION,
};
use tracing::debug;

use crate::error::ConditionError;
use crate::metrics::METRICS;
use crate::obs;

/// Everything an evaluator can see for one participant.
pub struct EvaluationContext<'a> {
    pub participant: &'a ParticipantId,
    pub report: &'a TestSuiteReport,
    pub requirements: &'a RequirementCatalog,
    evaluators: &'a ConditionEvaluatorRegistry,
}

impl EvaluationContext<'_> {
    /// Evaluate a nested condition in the same context.
    pub fn evaluate(&self, condition: &Condition) -> Result<bool, ConditionError> {
        self.evaluators.evaluate(condition, self)
    }
}

/// Decides one condition kind.
pub trait ConditionEvaluator: Send + Sync {
    fn evaluate(
        &self,
        condition: &Condition,
        context: &EvaluationContext<'_>,
    ) -> Result<bool, ConditionError>;
}

impl<F> ConditionEvaluator for F
where
    F: Fn(&Condition, &EvaluationContext<'_>) -> Result<bool, ConditionError> + Send + Sync,
{
    fn evaluate(
        &self,
        condition: &Condition,
        context: &EvaluationContext<'_>,
    ) -> Result<bool, ConditionError> {
        self(condition, context)
    }
}

/// Condition kind name → evaluator.
#[derive(Clone, Default)]
pub struct ConditionEvaluatorRegistry {
    evaluators: HashMap<String, Arc<dyn ConditionEvaluator>>,
}

impl fmt::Debug for ConditionEvaluatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.evaluators.keys().collect();
        kinds.sort();
        f.debug_struct("ConditionEvaluatorRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

impl ConditionEvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with evaluators for every built-in condition kind.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register(Condition::ALL_CONDITIONS, AllConditions)
            .register(Condition::ANY_CONDITIONS, AnyCondition)
            .register(Condition::NO_FAILED_CHECKS, NoFailedChecks)
            .register(Condition::REQUIREMENTS_CHECKED, RequirementsChecked)
            .register(Condition::CAPABILITY_VERIFIED, CapabilityVerified);
        registry
    }

    pub fn register(
        &mut self,
        kind: impl Into<String>,
        evaluator: impl ConditionEvaluator + 'static,
    ) -> &mut Self {
        self.evaluators.insert(kind.into(), Arc::new(evaluator));
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.evaluators.contains_key(kind)
    }

    fn evaluate(
        &self,
        condition: &Condition,
        context: &EvaluationContext<'_>,
    ) -> Result<bool, ConditionError> {
        let evaluator = self
            .evaluators
            .get(condition.kind())
            .ok_or_else(|| ConditionError::UnknownConditionKind(condition.kind().to_string()))?;
        evaluator.evaluate(condition, context)
    }
}

fn unexpected(condition: &Condition, expected: &str) -> ConditionError {
    ConditionError::InvalidSpecification {
        kind: condition.kind().to_string(),
        reason: format!("evaluator for '{expected}' received a different condition kind"),
    }
}

struct AllConditions;

impl ConditionEvaluator for AllConditions {
    fn evaluate(
        &self,
        condition: &Condition,
        context: &EvaluationContext<'_>,
    ) -> Result<bool, ConditionError> {
        let Condition::AllConditions(conditions) = condition else {
            return Err(unexpected(condition, Condition::ALL_CONDITIONS));
        };
        for sub in conditions {
            if !context.evaluate(sub)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

struct AnyCondition;

impl ConditionEvaluator for AnyCondition {
    fn evaluate(
        &self,
        condition: &Condition,
        context: &EvaluationContext<'_>,
    ) -> Result<bool, ConditionError> {
        let Condition::AnyCondition(conditions) = condition else {
            return Err(unexpected(condition, Condition::ANY_CONDITIONS));
        };
        for sub in conditions {
            if context.evaluate(sub)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

struct NoFailedChecks;

impl ConditionEvaluator for NoFailedChecks {
    fn evaluate(
        &self,
        condition: &Condition,
        context: &EvaluationContext<'_>,
    ) -> Result<bool, ConditionError> {
        if !matches!(condition, Condition::NoFailedChecks) {
            return Err(unexpected(condition, Condition::NO_FAILED_CHECKS));
        }
        Ok(context
            .report
            .query_failed_checks(Some(context.participant))
            .is_empty())
    }
}

struct RequirementsChecked;

impl ConditionEvaluator for RequirementsChecked {
    fn evaluate(
        &self,
        condition: &Condition,
        context: &EvaluationContext<'_>,
    ) -> Result<bool, ConditionError> {
        let Condition::RequirementsChecked(collection) = condition else {
            return Err(unexpected(condition, Condition::REQUIREMENTS_CHECKED));
        };
        let required = context.requirements.resolve(collection)?;
        if required.is_empty() {
            // An empty set never grants anything.
            return Ok(false);
        }
        let checked: BTreeSet<&RequirementId> = context
            .report
            .query_passed_checks(Some(context.participant))
            .into_iter()
            .flat_map(|check| check.requirements.iter())
            .collect();
        Ok(required.iter().all(|id| checked.contains(&id)))
    }
}

struct CapabilityVerified;

impl ConditionEvaluator for CapabilityVerified {
    fn evaluate(
        &self,
        condition: &Condition,
        context: &EvaluationContext<'_>,
    ) -> Result<bool, ConditionError> {
        let Condition::CapabilityVerified {
            capability_ids,
            capability_location,
        } = condition
        else {
            return Err(unexpected(condition, Condition::CAPABILITY_VERIFIED));
        };
        let location = capability_location.as_deref().unwrap_or(SELF_LOCATION);
        let suites = resolve_suites(context.report, location)?;
        if suites.is_empty() {
            return Ok(false);
        }
        Ok(suites.iter().all(|suite| {
            capability_ids
                .iter()
                .all(|id| suite.has_capability(context.participant, id))
        }))
    }
}

#[derive(Clone, Copy)]
enum Located<'r> {
    Suite(&'r TestSuiteReport),
    Generator(&'r ActionGeneratorReport),
    Action(&'r TestSuiteActionReport),
    /// Scenario or skipped-action report; nothing below it is addressable.
    Leaf,
}

impl<'r> Located<'r> {
    fn actions(self) -> Option<&'r [TestSuiteActionReport]> {
        match self {
            Located::Suite(suite) => Some(&suite.actions),
            Located::Generator(generator) => Some(&generator.actions),
            Located::Action(TestSuiteActionReport::TestSuite(suite)) => Some(&suite.actions),
            Located::Action(TestSuiteActionReport::ActionGenerator(generator)) => {
                Some(&generator.actions)
            }
            Located::Action(_) | Located::Leaf => None,
        }
    }

    fn suite(self) -> Option<&'r TestSuiteReport> {
        match self {
            Located::Suite(suite) => Some(suite),
            Located::Action(action) => action.as_test_suite(),
            _ => None,
        }
    }
}

/// Suite reports addressed by `location`, relative to `root`.
pub fn resolve_suites<'r>(
    root: &'r TestSuiteReport,
    location: &str,
) -> Result<Vec<&'r TestSuiteReport>, ConditionError> {
    let invalid = |reason: String| ConditionError::InvalidLocation {
        location: location.to_string(),
        reason,
    };

    let mut segments = location.split('.');
    match segments.next() {
        Some("$") | Some(SELF_LOCATION) => {}
        Some("parent") | Some("^") => {
            return Err(ConditionError::AncestorReference {
                location: location.to_string(),
            })
        }
        Some(other) => {
            return Err(invalid(format!(
                "must start with '$' or 'self', found '{other}'"
            )))
        }
        None => return Err(invalid("empty location".to_string())),
    }

    let mut current = vec![Located::Suite(root)];
    for segment in segments {
        current = match segment {
            "parent" | "^" => {
                return Err(ConditionError::AncestorReference {
                    location: location.to_string(),
                })
            }
            "test_suite" => current
                .into_iter()
                .filter_map(|node| match node {
                    Located::Action(action) => action.as_test_suite().map(Located::Suite),
                    _ => None,
                })
                .collect(),
            "action_generator" => current
                .into_iter()
                .filter_map(|node| match node {
                    Located::Action(action) => action.as_action_generator().map(Located::Generator),
                    _ => None,
                })
                .collect(),
            "test_scenario" | "skipped_action" => current
                .into_iter()
                .filter(|node| match node {
                    Located::Action(action) if segment == "test_scenario" => {
                        action.as_test_scenario().is_some()
                    }
                    Located::Action(action) => action.as_skipped_action().is_some(),
                    _ => false,
                })
                .map(|_| Located::Leaf)
                .collect(),
            _ => {
                let index = parse_actions_index(segment).ok_or_else(|| {
                    invalid(format!("unrecognised segment '{segment}'"))
                })?;
                let mut next = Vec::new();
                for node in current {
                    let Some(actions) = node.actions() else {
                        continue;
                    };
                    match index {
                        Some(i) => next.extend(actions.get(i).map(Located::Action)),
                        None => next.extend(actions.iter().map(Located::Action)),
                    }
                }
                next
            }
        };
    }

    Ok(current.into_iter().filter_map(Located::suite).collect())
}

/// `actions[N]` → `Some(Some(N))`, `actions[*]` → `Some(None)`.
fn parse_actions_index(segment: &str) -> Option<Option<usize>> {
    let inner = segment.strip_prefix("actions[")?.strip_suffix(']')?;
    if inner == "*" {
        return Some(None);
    }
    inner.parse().ok().map(Some)
}

/// Evaluates and attaches capability and badge grants to suite reports.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityEngine<'a> {
    evaluators: &'a ConditionEvaluatorRegistry,
    requirements: &'a RequirementCatalog,
}

impl<'a> CapabilityEngine<'a> {
    pub fn new(
        evaluators: &'a ConditionEvaluatorRegistry,
        requirements: &'a RequirementCatalog,
    ) -> Self {
        Self {
            evaluators,
            requirements,
        }
    }

    /// Whether `condition` holds for `participant` against `report`.
    pub fn evaluate(
        &self,
        condition: &Condition,
        participant: &ParticipantId,
        report: &TestSuiteReport,
    ) -> Result<bool, ConditionError> {
        let context = EvaluationContext {
            participant,
            report,
            requirements: self.requirements,
            evaluators: self.evaluators,
        };
        context.evaluate(condition)
    }

    /// Evaluate the suite's capabilities, then its badges, each in
    /// declaration order, for every participant the report mentions.
    ///
    /// Grants are attached as they are decided, so a capability may depend
    /// on capabilities declared before it in the same suite.
    pub fn grant(
        &self,
        definition: &TestSuiteDefinition,
        report: &mut TestSuiteReport,
    ) -> Result<(), ConditionError> {
        let participants = report.all_participants();

        for capability in &definition.participant_verifiable_capabilities {
            for participant in &participants {
                let verified =
                    self.evaluate(&capability.verification_condition, participant, report)?;
                debug!(
                    suite = %definition.name,
                    capability = %capability.id,
                    participant = %participant,
                    verified,
                    "capability evaluated"
                );
                obs::emit_capability_evaluated(
                    &definition.name,
                    &capability.id,
                    participant,
                    verified,
                );
                report.capability_evaluations.push(CapabilityEvaluationReport {
                    capability_id: capability.id.clone(),
                    participant_id: participant.clone(),
                    verified,
                });
                if verified {
                    METRICS.inc_capabilities_granted();
                    report
                        .capabilities_granted
                        .entry(participant.clone())
                        .or_default()
                        .insert(capability.id.clone());
                }
            }
        }

        for badge in &definition.badges {
            for participant in &participants {
                if self.evaluate(&badge.grant_condition, participant, report)? {
                    debug!(
                        suite = %definition.name,
                        badge = %badge.id,
                        participant = %participant,
                        "badge granted"
                    );
                    report
                        .badges_granted
                        .entry(participant.clone())
                        .or_default()
                        .insert(badge.id.clone());
                }
            }
        }
        Ok(())
    }
}
