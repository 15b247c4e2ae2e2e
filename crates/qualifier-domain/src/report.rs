//! Report tree produced by executing an action tree.
//!
//! The tree mirrors the action tree node for node. It is appended to while
//! actions execute and never modified afterwards, so every query here is a
//! pure read-only recursive descent.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::declaration::ActionDeclaration;
use crate::ids::{BadgeId, CapabilityId, ParticipantId, RequirementId};

/// Severity of a failed check, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Highest severity level; failed checks at this level are critical problems.
    pub const HIGHEST: Severity = Severity::Critical;
}

/// A check that passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassedCheck {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub requirements: Vec<RequirementId>,
    #[serde(default)]
    pub participants: Vec<ParticipantId>,
}

impl PassedCheck {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp: Utc::now(),
            requirements: Vec::new(),
            participants: Vec::new(),
        }
    }

    pub fn with_participants(
        mut self,
        participants: impl IntoIterator<Item = ParticipantId>,
    ) -> Self {
        self.participants.extend(participants);
        self
    }

    pub fn with_requirements(
        mut self,
        requirements: impl IntoIterator<Item = RequirementId>,
    ) -> Self {
        self.requirements.extend(requirements);
        self
    }
}

/// A check that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedCheck {
    pub name: String,
    pub summary: String,
    #[serde(default)]
    pub details: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub requirements: Vec<RequirementId>,
    #[serde(default)]
    pub participants: Vec<ParticipantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<serde_json::Value>,
}

impl FailedCheck {
    pub fn new(name: impl Into<String>, summary: impl Into<String>, severity: Severity) -> Self {
        Self {
            name: name.into(),
            summary: summary.into(),
            details: String::new(),
            severity,
            timestamp: Utc::now(),
            requirements: Vec::new(),
            participants: Vec::new(),
            additional_data: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn with_participants(
        mut self,
        participants: impl IntoIterator<Item = ParticipantId>,
    ) -> Self {
        self.participants.extend(participants);
        self
    }

    pub fn with_requirements(
        mut self,
        requirements: impl IntoIterator<Item = RequirementId>,
    ) -> Self {
        self.requirements.extend(requirements);
        self
    }
}

/// One step of a test case.
///
/// A step is successful iff it recorded no failed checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestStepReport {
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub passed_checks: Vec<PassedCheck>,
    #[serde(default)]
    pub failed_checks: Vec<FailedCheck>,
}

impl TestStepReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start_time: Utc::now(),
            end_time: None,
            passed_checks: Vec::new(),
            failed_checks: Vec::new(),
        }
    }

    pub fn successful(&self) -> bool {
        self.failed_checks.is_empty()
    }
}

/// One test case of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseReport {
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: Vec<TestStepReport>,
}

impl TestCaseReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start_time: Utc::now(),
            end_time: None,
            steps: Vec::new(),
        }
    }

    pub fn successful(&self) -> bool {
        self.steps.iter().all(TestStepReport::successful)
    }
}

/// An error raised by scenario code, captured as report data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub message: String,
    /// Underlying causes, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            causes: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_causes(mut self, causes: impl IntoIterator<Item = String>) -> Self {
        self.causes.extend(causes);
        self
    }
}

/// Lifecycle of one scenario execution.
///
/// A finished report is always `Completed` or `Errored`; the other phases
/// are only seen while the scenario is being recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioPhase {
    #[default]
    NotRun,
    Running,
    CleaningUp,
    Completed,
    Errored,
}

impl fmt::Display for ScenarioPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScenarioPhase::NotRun => "not_run",
            ScenarioPhase::Running => "running",
            ScenarioPhase::CleaningUp => "cleaning_up",
            ScenarioPhase::Completed => "completed",
            ScenarioPhase::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Record of one test scenario execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestScenarioReport {
    pub name: String,
    pub scenario_type: String,
    /// Final phase: `Errored` when run or cleanup raised a fault.
    #[serde(default)]
    pub phase: ScenarioPhase,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cases: Vec<TestCaseReport>,
    /// Checks recorded while cleaning up after the scenario.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<TestStepReport>,
    /// Fault raised by the scenario's run routine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_error: Option<ErrorReport>,
    /// Fault raised by the scenario's cleanup routine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_error: Option<ErrorReport>,
}

impl TestScenarioReport {
    pub fn new(name: impl Into<String>, scenario_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scenario_type: scenario_type.into(),
            phase: ScenarioPhase::NotRun,
            start_time: Utc::now(),
            end_time: None,
            cases: Vec::new(),
            cleanup: None,
            execution_error: None,
            cleanup_error: None,
        }
    }

    /// All steps in execution order, cleanup last.
    pub fn steps(&self) -> impl Iterator<Item = &TestStepReport> {
        self.cases
            .iter()
            .flat_map(|case| case.steps.iter())
            .chain(self.cleanup.iter())
    }
}

/// Capability decision for one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityEvaluationReport {
    pub capability_id: CapabilityId,
    pub participant_id: ParticipantId,
    pub verified: bool,
}

/// Record of one test suite execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSuiteReport {
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actions: Vec<TestSuiteActionReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capability_evaluations: Vec<CapabilityEvaluationReport>,
    #[serde(default)]
    pub capabilities_granted: BTreeMap<ParticipantId, BTreeSet<CapabilityId>>,
    #[serde(default)]
    pub badges_granted: BTreeMap<ParticipantId, BTreeSet<BadgeId>>,
}

impl TestSuiteReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start_time: Utc::now(),
            end_time: None,
            actions: Vec::new(),
            capability_evaluations: Vec::new(),
            capabilities_granted: BTreeMap::new(),
            badges_granted: BTreeMap::new(),
        }
    }

    /// Whether `capability` was granted to `participant` by this suite.
    pub fn has_capability(&self, participant: &ParticipantId, capability: &str) -> bool {
        self.capabilities_granted
            .get(participant)
            .is_some_and(|granted| granted.contains(capability))
    }

    /// Whether `badge` was granted to `participant` by this suite.
    pub fn has_badge(&self, participant: &ParticipantId, badge: &str) -> bool {
        self.badges_granted
            .get(participant)
            .is_some_and(|granted| granted.contains(badge))
    }
}

/// Record of the actions produced by one action generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionGeneratorReport {
    pub generator_type: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actions: Vec<TestSuiteActionReport>,
}

impl ActionGeneratorReport {
    pub fn new(generator_type: impl Into<String>) -> Self {
        Self {
            generator_type: generator_type.into(),
            start_time: Utc::now(),
            end_time: None,
            actions: Vec::new(),
        }
    }
}

/// Placeholder for a declared action that was not executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedActionReport {
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub declaration: ActionDeclaration,
}

impl SkippedActionReport {
    pub fn new(reason: impl Into<String>, declaration: ActionDeclaration) -> Self {
        Self {
            timestamp: Utc::now(),
            reason: reason.into(),
            declaration,
        }
    }
}

/// Report of one action; exactly one variant, mirroring the action kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestSuiteActionReport {
    TestScenario(TestScenarioReport),
    TestSuite(TestSuiteReport),
    ActionGenerator(ActionGeneratorReport),
    SkippedAction(SkippedActionReport),
}

impl TestSuiteActionReport {
    pub fn as_test_suite(&self) -> Option<&TestSuiteReport> {
        match self {
            TestSuiteActionReport::TestSuite(report) => Some(report),
            _ => None,
        }
    }

    pub fn as_test_scenario(&self) -> Option<&TestScenarioReport> {
        match self {
            TestSuiteActionReport::TestScenario(report) => Some(report),
            _ => None,
        }
    }

    pub fn as_action_generator(&self) -> Option<&ActionGeneratorReport> {
        match self {
            TestSuiteActionReport::ActionGenerator(report) => Some(report),
            _ => None,
        }
    }

    pub fn as_skipped_action(&self) -> Option<&SkippedActionReport> {
        match self {
            TestSuiteActionReport::SkippedAction(report) => Some(report),
            _ => None,
        }
    }
}

/// Aggregate queries shared by every node of the report tree.
///
/// Implementors provide depth-first, left-to-right access to the scenario
/// reports in their subtree; every other query derives from that, so results
/// always follow declared execution order.
pub trait ReportTree {
    /// Whether this subtree completed without failures or skips.
    fn successful(&self) -> bool;

    /// Append the scenario reports of this subtree in execution order.
    fn collect_scenarios<'a>(&'a self, out: &mut Vec<&'a TestScenarioReport>);

    /// Scenario reports of this subtree in execution order.
    fn scenario_reports(&self) -> Vec<&TestScenarioReport> {
        let mut out = Vec::new();
        self.collect_scenarios(&mut out);
        out
    }

    /// Whether any failed check in the subtree has the highest severity.
    fn has_critical_problem(&self) -> bool {
        self.scenario_reports().into_iter().any(|scenario| {
            scenario
                .steps()
                .flat_map(|step| step.failed_checks.iter())
                .any(|check| check.severity == Severity::HIGHEST)
        })
    }

    /// Every participant referenced by any check in the subtree.
    fn all_participants(&self) -> BTreeSet<ParticipantId> {
        let mut participants = BTreeSet::new();
        for scenario in self.scenario_reports() {
            for step in scenario.steps() {
                for check in &step.passed_checks {
                    participants.extend(check.participants.iter().cloned());
                }
                for check in &step.failed_checks {
                    participants.extend(check.participants.iter().cloned());
                }
            }
        }
        participants
    }

    /// Passed checks, optionally only those involving `participant`.
    fn query_passed_checks(&self, participant: Option<&ParticipantId>) -> Vec<&PassedCheck> {
        self.scenario_reports()
            .into_iter()
            .flat_map(|scenario| scenario.steps())
            .flat_map(|step| step.passed_checks.iter())
            .filter(|check| participant.map_or(true, |p| check.participants.contains(p)))
            .collect()
    }

    /// Failed checks, optionally only those involving `participant`.
    fn query_failed_checks(&self, participant: Option<&ParticipantId>) -> Vec<&FailedCheck> {
        self.scenario_reports()
            .into_iter()
            .flat_map(|scenario| scenario.steps())
            .flat_map(|step| step.failed_checks.iter())
            .filter(|check| participant.map_or(true, |p| check.participants.contains(p)))
            .collect()
    }
}

impl ReportTree for TestScenarioReport {
    fn successful(&self) -> bool {
        self.execution_error.is_none()
            && self.cleanup_error.is_none()
            && self.steps().all(TestStepReport::successful)
    }

    fn collect_scenarios<'a>(&'a self, out: &mut Vec<&'a TestScenarioReport>) {
        out.push(self);
    }
}

impl ReportTree for TestSuiteReport {
    fn successful(&self) -> bool {
        self.actions.iter().all(ReportTree::successful)
    }

    fn collect_scenarios<'a>(&'a self, out: &mut Vec<&'a TestScenarioReport>) {
        for action in &self.actions {
            action.collect_scenarios(out);
        }
    }
}

impl ReportTree for ActionGeneratorReport {
    fn successful(&self) -> bool {
        self.actions.iter().all(ReportTree::successful)
    }

    fn collect_scenarios<'a>(&'a self, out: &mut Vec<&'a TestScenarioReport>) {
        for action in &self.actions {
            action.collect_scenarios(out);
        }
    }
}

impl ReportTree for SkippedActionReport {
    fn successful(&self) -> bool {
        false
    }

    fn collect_scenarios<'a>(&'a self, _out: &mut Vec<&'a TestScenarioReport>) {}
}

impl ReportTree for TestSuiteActionReport {
    fn successful(&self) -> bool {
        match self {
            TestSuiteActionReport::TestScenario(r) => r.successful(),
            TestSuiteActionReport::TestSuite(r) => r.successful(),
            TestSuiteActionReport::ActionGenerator(r) => r.successful(),
            TestSuiteActionReport::SkippedAction(r) => r.successful(),
        }
    }

    fn collect_scenarios<'a>(&'a self, out: &mut Vec<&'a TestScenarioReport>) {
        match self {
            TestSuiteActionReport::TestScenario(r) => r.collect_scenarios(out),
            TestSuiteActionReport::TestSuite(r) => r.collect_scenarios(out),
            TestSuiteActionReport::ActionGenerator(r) => r.collect_scenarios(out),
            TestSuiteActionReport::SkippedAction(r) => r.collect_scenarios(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::{ActionDeclaration, ResourceBindings};

    fn p(id: &str) -> ParticipantId {
        ParticipantId::from(id)
    }

    fn scenario(
        name: &str,
        passed: &[(&str, &str)],
        failed: &[(&str, &str, Severity)],
    ) -> TestScenarioReport {
        let mut step = TestStepReport::new("step");
        for (check, participant) in passed {
            step.passed_checks
                .push(PassedCheck::new(*check).with_participants([p(participant)]));
        }
        for (check, participant, severity) in failed {
            step.failed_checks.push(
                FailedCheck::new(*check, "failed", *severity).with_participants([p(participant)]),
            );
        }
        let mut case = TestCaseReport::new("case");
        case.steps.push(step);
        let mut report = TestScenarioReport::new(name, name);
        report.cases.push(case);
        report
    }

    fn skipped() -> TestSuiteActionReport {
        TestSuiteActionReport::SkippedAction(SkippedActionReport::new(
            "aborted",
            ActionDeclaration::scenario("x", ResourceBindings::new()),
        ))
    }

    #[test]
    fn test_step_success_iff_no_failed_checks() {
        let ok = scenario("a", &[("c1", "uss1")], &[]);
        assert!(ok.successful());
        let bad = scenario("b", &[], &[("c2", "uss1", Severity::Low)]);
        assert!(!bad.successful());
    }

    #[test]
    fn test_execution_error_makes_scenario_unsuccessful() {
        let mut report = scenario("a", &[("c1", "uss1")], &[]);
        report.execution_error = Some(ErrorReport::new("boom"));
        assert!(!report.successful());
    }

    #[test]
    fn test_failed_cleanup_check_makes_scenario_unsuccessful() {
        let mut report = scenario("a", &[], &[]);
        let mut cleanup = TestStepReport::new("Cleanup");
        cleanup
            .failed_checks
            .push(FailedCheck::new("cleanup", "left state behind", Severity::Medium));
        report.cleanup = Some(cleanup);
        assert!(!report.successful());
    }

    #[test]
    fn test_skipped_action_is_unsuccessful() {
        let mut suite = TestSuiteReport::new("suite");
        suite
            .actions
            .push(TestSuiteActionReport::TestScenario(scenario("a", &[], &[])));
        assert!(suite.successful());
        suite.actions.push(skipped());
        assert!(!suite.successful());
    }

    #[test]
    fn test_queries_follow_execution_order_and_filter() {
        let mut generator = ActionGeneratorReport::new("Repeat");
        generator.actions.push(TestSuiteActionReport::TestScenario(scenario(
            "second",
            &[("p2", "uss2"), ("p3", "uss1")],
            &[],
        )));
        let mut suite = TestSuiteReport::new("suite");
        suite.actions.push(TestSuiteActionReport::TestScenario(scenario(
            "first",
            &[("p1", "uss1")],
            &[("f1", "uss2", Severity::High)],
        )));
        suite.actions.push(TestSuiteActionReport::ActionGenerator(generator));
        suite.actions.push(skipped());

        let names: Vec<&str> = suite
            .query_passed_checks(None)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["p1", "p2", "p3"]);

        let uss1: Vec<&str> = suite
            .query_passed_checks(Some(&p("uss1")))
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(uss1, vec!["p1", "p3"]);

        assert!(suite.query_failed_checks(Some(&p("uss1"))).is_empty());
        assert_eq!(suite.query_failed_checks(Some(&p("uss2"))).len(), 1);

        let participants: Vec<ParticipantId> = suite.all_participants().into_iter().collect();
        assert_eq!(participants, vec![p("uss1"), p("uss2")]);
        assert!(!suite.has_critical_problem());
    }

    #[test]
    fn test_critical_problem_found_in_nested_suite() {
        let mut inner = TestSuiteReport::new("inner");
        inner.actions.push(TestSuiteActionReport::TestScenario(scenario(
            "a",
            &[],
            &[("f", "uss1", Severity::Critical)],
        )));
        let mut outer = TestSuiteReport::new("outer");
        outer.actions.push(TestSuiteActionReport::TestSuite(inner));
        assert!(outer.has_critical_problem());
        assert!(!outer.successful());
    }

    #[test]
    fn test_action_report_serializes_with_variant_key() {
        let report = TestSuiteActionReport::TestSuite(TestSuiteReport::new("s"));
        let value = serde_json::to_value(&report).unwrap();
        assert!(value.get("test_suite").is_some());
    }
}
