//! Depth-first, strictly sequential execution of an action tree.
//!
//! Executing a node consumes it. Scenario faults (errors and panics) become
//! report data; only capability configuration problems stop execution.

use std::panic::AssertUnwindSafe;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use qualifier_domain::{
    ActionDeclaration, ActionGeneratorReport, ActionKind, ReactionToFailure, ReportTree,
    SkippedActionReport, TestScenarioReport, TestSuiteActionReport, TestSuiteReport,
};
use tracing::{debug, info, instrument, warn};

use crate::action::{ActionNode, GeneratorNode, ScenarioNode, SuiteNode, TestSuiteAction};
use crate::capability::CapabilityEngine;
use crate::config::ExecutionConfiguration;
use crate::error::ConditionError;
use crate::metrics::METRICS;
use crate::obs;
use crate::scenario::{error_report, panic_report, ScenarioRecorder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Suite,
    Generator,
}

/// Walks an action tree, producing the isomorphic report tree.
#[derive(Debug)]
pub struct Executor<'a> {
    execution: &'a ExecutionConfiguration,
    capabilities: CapabilityEngine<'a>,
    /// Set once `stop_fast` is triggered; everything afterwards is skipped.
    stopped: bool,
}

impl<'a> Executor<'a> {
    pub fn new(execution: &'a ExecutionConfiguration, capabilities: CapabilityEngine<'a>) -> Self {
        Self {
            execution,
            capabilities,
            stopped: false,
        }
    }

    /// Execute `action` and everything below it.
    #[instrument(
        skip_all,
        fields(
            kind = action.declaration.kind_name(),
            type_name = %action.declaration.type_name()
        )
    )]
    pub async fn execute(
        &mut self,
        action: TestSuiteAction,
    ) -> Result<TestSuiteActionReport, ConditionError> {
        self.execute_action(action, false).await
    }

    /// `selected` is true below an action matched by `include_action_when`.
    fn execute_action(
        &mut self,
        action: TestSuiteAction,
        selected: bool,
    ) -> BoxFuture<'_, Result<TestSuiteActionReport, ConditionError>> {
        async move {
            if let Some(reason) = self.skip_reason(&action.declaration, selected) {
                return Ok(skip(action.declaration, reason));
            }
            let selected = selected
                || (self.execution.include_action_when.is_some()
                    && self.execution.is_included(&action.declaration));

            match action.node {
                ActionNode::Scenario(node) => {
                    Ok(TestSuiteActionReport::TestScenario(self.run_scenario(node).await))
                }
                ActionNode::Suite(node) => self
                    .run_suite(node, selected)
                    .await
                    .map(TestSuiteActionReport::TestSuite),
                ActionNode::Generator(node) => self
                    .run_generator(node, selected)
                    .await
                    .map(TestSuiteActionReport::ActionGenerator),
            }
        }
        .boxed()
    }

    fn skip_reason(&self, declaration: &ActionDeclaration, selected: bool) -> Option<String> {
        if self.stopped {
            return Some("stop_fast: an earlier test scenario was unsuccessful".to_string());
        }
        if self.execution.is_skipped(declaration) {
            return Some("matched skip_action_when".to_string());
        }
        let is_scenario = matches!(declaration.kind, ActionKind::TestScenario(_));
        if is_scenario && !selected && !self.execution.is_included(declaration) {
            return Some("not selected by include_action_when".to_string());
        }
        None
    }

    async fn run_scenario(&mut self, node: ScenarioNode) -> TestScenarioReport {
        let ScenarioNode {
            scenario_type,
            mut scenario,
        } = node;
        let mut recorder = ScenarioRecorder::new(scenario.name(), scenario_type.as_str());
        info!(scenario_type = %scenario_type, name = %scenario.name(), "running test scenario");

        recorder.start();
        let execution_error = match AssertUnwindSafe(scenario.run(&mut recorder))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(error_report(&e)),
            Err(payload) => Some(panic_report(payload.as_ref())),
        };

        recorder.begin_cleanup();
        let cleanup_error = match AssertUnwindSafe(scenario.cleanup(&mut recorder))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(error_report(&e)),
            Err(payload) => Some(panic_report(payload.as_ref())),
        };

        let errored = execution_error.is_some() || cleanup_error.is_some();
        if let Some(error) = &execution_error {
            warn!(
                scenario_type = %scenario_type,
                error = %error.message,
                "test scenario raised an error"
            );
        }
        if let Some(error) = &cleanup_error {
            warn!(
                scenario_type = %scenario_type,
                error = %error.message,
                "test scenario cleanup raised an error"
            );
        }

        let report = recorder.finish(execution_error, cleanup_error);
        let failed_checks = report.query_failed_checks(None).len();
        let successful = report.successful();

        METRICS.inc_scenarios_executed();
        METRICS.add_failed_checks(failed_checks as u64);
        if errored {
            METRICS.inc_scenario_errors();
        }
        obs::emit_scenario_finished(&scenario_type, successful, failed_checks, errored);

        if !successful && self.execution.stop_fast {
            warn!(scenario_type = %scenario_type, "stop_fast: skipping all remaining actions");
            self.stopped = true;
        }
        report
    }

    async fn run_suite(
        &mut self,
        node: SuiteNode,
        selected: bool,
    ) -> Result<TestSuiteReport, ConditionError> {
        let SuiteNode {
            definition,
            resources,
            actions,
        } = node;
        info!(
            suite = %definition.name,
            actions = actions.len(),
            resources = resources.len(),
            "running test suite"
        );

        let mut report = TestSuiteReport::new(definition.name.as_str());
        report.actions = self
            .run_children(actions, selected, Container::Suite)
            .await?;
        report.end_time = Some(Utc::now());

        self.capabilities.grant(&definition, &mut report)?;
        debug!(suite = %definition.name, successful = report.successful(), "test suite finished");
        Ok(report)
    }

    async fn run_generator(
        &mut self,
        node: GeneratorNode,
        selected: bool,
    ) -> Result<ActionGeneratorReport, ConditionError> {
        let GeneratorNode {
            generator_type,
            actions,
        } = node;
        let mut report = ActionGeneratorReport::new(generator_type.as_str());
        report.actions = self
            .run_children(actions, selected, Container::Generator)
            .await?;
        report.end_time = Some(Utc::now());
        Ok(report)
    }

    /// Run children in order, applying each child's failure reaction.
    ///
    /// An unsuccessful `Abort` child ends a suite with one skip record per
    /// remaining child; a generator simply stops producing children.
    /// Children skipped by configuration never trigger an abort.
    async fn run_children(
        &mut self,
        actions: Vec<TestSuiteAction>,
        selected: bool,
        container: Container,
    ) -> Result<Vec<TestSuiteActionReport>, ConditionError> {
        let mut reports = Vec::with_capacity(actions.len());
        let mut remaining = actions.into_iter();

        while let Some(action) = remaining.next() {
            let on_failure = action.on_failure();
            let label = format!(
                "{} '{}'",
                action.declaration.kind_name(),
                action.declaration.type_name()
            );

            let report = self.execute_action(action, selected).await?;
            let aborting = on_failure == ReactionToFailure::Abort
                && report.as_skipped_action().is_none()
                && !report.successful();
            reports.push(report);

            if aborting {
                match container {
                    Container::Suite => {
                        let reason =
                            format!("{label} was unsuccessful and its on_failure is Abort");
                        reports.extend(
                            remaining.map(|rest| skip(rest.declaration, reason.clone())),
                        );
                    }
                    Container::Generator => {
                        debug!(
                            action = %label,
                            "generated action failed with Abort; no further actions generated"
                        );
                    }
                }
                break;
            }
        }
        Ok(reports)
    }
}

fn skip(declaration: ActionDeclaration, reason: impl Into<String>) -> TestSuiteActionReport {
    let reason = reason.into();
    obs::emit_action_skipped(declaration.kind_name(), declaration.type_name(), &reason);
    METRICS.inc_actions_skipped();
    TestSuiteActionReport::SkippedAction(SkippedActionReport::new(reason, declaration))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::action::{ActionFactory, SuiteCatalog};
    use crate::capability::ConditionEvaluatorRegistry;
    use crate::config::{ActionSelector, TypeFilter};
    use crate::registry::Registries;
    use crate::resources::ResourcePool;
    use crate::scenario::{ScenarioPhase, TestScenario};
    use async_trait::async_trait;
    use qualifier_domain::{
        FailedCheck, PassedCheck, RequirementCatalog, ResourceBindings, Severity,
        TestSuiteDefinition,
    };

    type Log = Arc<Mutex<Vec<String>>>;

    #[derive(Clone, Copy)]
    enum Outcome {
        Pass,
        Fail,
        Error,
        Panic,
        /// Both `run` and `cleanup` return errors.
        ErrorTwice,
        /// `run` passes, then `cleanup` panics.
        CleanupPanic,
    }

    struct Scripted {
        name: String,
        outcome: Outcome,
        log: Log,
    }

    #[async_trait]
    impl TestScenario for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&mut self, recorder: &mut ScenarioRecorder) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("run {}", self.name));
            recorder.begin_test_case("case")?;
            recorder.begin_test_step("step")?;
            match self.outcome {
                Outcome::Pass | Outcome::CleanupPanic => {
                    recorder.record_passed_check(PassedCheck::new("ok"))?
                }
                Outcome::Fail => {
                    recorder.record_failed_check(FailedCheck::new("bad", "failed", Severity::High))?
                }
                Outcome::Error | Outcome::ErrorTwice => {
                    anyhow::bail!("scenario {} broke", self.name)
                }
                Outcome::Panic => panic!("scenario {} panicked", self.name),
            }
            recorder.end_test_case()?;
            Ok(())
        }

        async fn cleanup(&mut self, _recorder: &mut ScenarioRecorder) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("cleanup {}", self.name));
            match self.outcome {
                Outcome::ErrorTwice => anyhow::bail!("cleanup of {} broke", self.name),
                Outcome::CleanupPanic => panic!("cleanup of {} panicked", self.name),
                _ => Ok(()),
            }
        }
    }

    fn registries(log: &Log) -> Registries {
        let mut registries = Registries::with_builtins();
        for (name, outcome) in [
            ("pass", Outcome::Pass),
            ("fail", Outcome::Fail),
            ("error", Outcome::Error),
            ("panic", Outcome::Panic),
            ("error_twice", Outcome::ErrorTwice),
            ("cleanup_panic", Outcome::CleanupPanic),
        ] {
            let log = Arc::clone(log);
            registries.scenarios.register(name, move |_| {
                Ok(Box::new(Scripted {
                    name: name.to_string(),
                    outcome,
                    log: Arc::clone(&log),
                }) as Box<dyn TestScenario>)
            });
        }
        registries
    }

    fn scenario(name: &str) -> ActionDeclaration {
        ActionDeclaration::scenario(name, ResourceBindings::new())
    }

    fn suite(actions: Vec<ActionDeclaration>) -> ActionDeclaration {
        ActionDeclaration::inline_suite(
            TestSuiteDefinition::new("Suite", actions),
            ResourceBindings::new(),
        )
    }

    async fn run(
        declaration: ActionDeclaration,
        execution: ExecutionConfiguration,
    ) -> (TestSuiteActionReport, Vec<String>) {
        let log = Log::default();
        let registries = registries(&log);
        let catalog = SuiteCatalog::new();
        let action = ActionFactory::new(&registries, &catalog)
            .build(&declaration, &ResourcePool::new())
            .unwrap();
        let evaluators = ConditionEvaluatorRegistry::with_builtins();
        let requirements = RequirementCatalog::new();
        let mut executor =
            Executor::new(&execution, CapabilityEngine::new(&evaluators, &requirements));
        let report = executor.execute(action).await.unwrap();
        let log = log.lock().unwrap().clone();
        (report, log)
    }

    fn children(report: &TestSuiteActionReport) -> &[TestSuiteActionReport] {
        match report {
            TestSuiteActionReport::TestSuite(r) => &r.actions,
            TestSuiteActionReport::ActionGenerator(r) => &r.actions,
            other => panic!("expected container report, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_abort_skips_remaining_siblings() {
        let (report, log) = run(
            suite(vec![
                scenario("pass"),
                scenario("fail").with_on_failure(ReactionToFailure::Abort),
                scenario("pass"),
            ]),
            ExecutionConfiguration::default(),
        )
        .await;

        let actions = children(&report);
        assert_eq!(actions.len(), 3);
        assert!(actions[0].successful());
        assert!(actions[1].as_test_scenario().is_some());
        assert!(actions[2].as_skipped_action().is_some());
        assert!(!report.successful());
        assert_eq!(log, vec!["run pass", "cleanup pass", "run fail", "cleanup fail"]);
    }

    #[tokio::test]
    async fn test_continue_runs_all_siblings() {
        let (report, _) = run(
            suite(vec![scenario("pass"), scenario("fail"), scenario("pass")]),
            ExecutionConfiguration::default(),
        )
        .await;
        let actions = children(&report);
        assert_eq!(actions.len(), 3);
        assert!(actions.iter().all(|a| a.as_test_scenario().is_some()));
        assert!(actions[2].successful());
        assert!(!report.successful());
    }

    #[tokio::test]
    async fn test_errors_and_panics_are_report_data() {
        let (report, log) = run(
            suite(vec![scenario("error"), scenario("panic"), scenario("pass")]),
            ExecutionConfiguration::default(),
        )
        .await;
        let actions = children(&report);
        let error = actions[0].as_test_scenario().unwrap();
        assert!(error.execution_error.as_ref().unwrap().message.contains("broke"));
        let panicked = actions[1].as_test_scenario().unwrap();
        assert!(panicked
            .execution_error
            .as_ref()
            .unwrap()
            .message
            .contains("panicked"));
        assert!(actions[2].successful());
        // Cleanup runs after the panic.
        assert!(log.contains(&"cleanup panic".to_string()));
    }

    #[tokio::test]
    async fn test_cleanup_error_never_masks_execution_error() {
        let (report, log) = run(
            suite(vec![scenario("error_twice"), scenario("cleanup_panic")]),
            ExecutionConfiguration::default(),
        )
        .await;
        let actions = children(&report);

        let both = actions[0].as_test_scenario().unwrap();
        let execution = both.execution_error.as_ref().unwrap();
        assert!(execution.message.contains("scenario error_twice broke"));
        let cleanup = both.cleanup_error.as_ref().unwrap();
        assert!(cleanup.message.contains("cleanup of error_twice broke"));
        assert!(!both.successful());

        let cleanup_only = actions[1].as_test_scenario().unwrap();
        assert!(cleanup_only.execution_error.is_none());
        assert!(cleanup_only
            .cleanup_error
            .as_ref()
            .unwrap()
            .message
            .contains("cleanup of cleanup_panic panicked"));
        assert!(!cleanup_only.successful());
        assert_eq!(cleanup_only.phase, ScenarioPhase::Errored);

        assert_eq!(
            log,
            vec![
                "run error_twice",
                "cleanup error_twice",
                "run cleanup_panic",
                "cleanup cleanup_panic"
            ]
        );
    }

    #[tokio::test]
    async fn test_generator_abort_stops_without_skip_records() {
        let repeat = ActionDeclaration::generator(
            "Repeat",
            serde_json::json!({
                "action_to_repeat": {
                    "test_scenario": { "scenario_type": "fail" },
                    "on_failure": "Abort"
                },
                "times": 3
            }),
            ResourceBindings::new(),
        );
        let (report, log) = run(repeat, ExecutionConfiguration::default()).await;
        let actions = children(&report);
        assert_eq!(actions.len(), 1);
        assert!(!report.successful());
        assert_eq!(log, vec!["run fail", "cleanup fail"]);
    }

    #[tokio::test]
    async fn test_stop_fast_skips_everything_after_failure() {
        let execution = ExecutionConfiguration {
            stop_fast: true,
            ..Default::default()
        };
        let (report, log) = run(
            suite(vec![
                scenario("fail"),
                suite(vec![scenario("pass")]),
                scenario("pass"),
            ]),
            execution,
        )
        .await;
        let actions = children(&report);
        assert_eq!(actions.len(), 3);
        assert!(actions[1].as_skipped_action().is_some());
        assert!(actions[2]
            .as_skipped_action()
            .unwrap()
            .reason
            .contains("stop_fast"));
        assert_eq!(log, vec!["run fail", "cleanup fail"]);
    }

    #[tokio::test]
    async fn test_skip_and_include_filters() {
        let skip_pass = ExecutionConfiguration {
            skip_action_when: vec![ActionSelector::IsTestScenario(TypeFilter {
                types: vec!["pass".to_string()],
            })],
            ..Default::default()
        };
        let (report, log) = run(suite(vec![scenario("pass"), scenario("fail")]), skip_pass).await;
        let actions = children(&report);
        assert!(actions[0].as_skipped_action().is_some());
        assert!(actions[1].as_test_scenario().is_some());
        assert_eq!(log, vec!["run fail", "cleanup fail"]);

        let include_fail = ExecutionConfiguration {
            include_action_when: Some(vec![ActionSelector::IsTestScenario(TypeFilter {
                types: vec!["fail".to_string()],
            })]),
            ..Default::default()
        };
        let (_, log) = run(suite(vec![scenario("pass"), scenario("fail")]), include_fail).await;
        assert_eq!(log, vec!["run fail", "cleanup fail"]);

        let include_suite = ExecutionConfiguration {
            include_action_when: Some(vec![ActionSelector::IsTestSuite(TypeFilter::default())]),
            ..Default::default()
        };
        let (report, _) = run(suite(vec![scenario("pass")]), include_suite).await;
        assert!(report.successful());
    }
}
