//! End-to-end qualification runs: configuration file in, judged report out.

use std::io::Write;

use async_trait::async_trait;
use qualifier_core::metrics::METRICS;
use qualifier_core::{
    ConfigurationPayload, Participant, QualifierError, Registries, ResourceError, ScenarioRecorder,
    TestConfiguration, TestRun, TestRunReport, TestScenario,
};
use qualifier_domain::{
    FailedCheck, ParticipantId, PassedCheck, ReportTree, RequirementId, Severity,
    TestSuiteActionReport,
};

const CONFIGURATION: &str = r#"{
    "resources": {
        "participants": {
            "resource_type": "ParticipantList",
            "specification": { "participants": ["uss1", "uss2"] }
        },
        "settings": {
            "resource_type": "ConfigurationPayload",
            "specification": { "fail_for": ["uss2"] }
        }
    },
    "action": {
        "test_suite": {
            "suite_type": "suites.Interop",
            "resources": { "participants": "participants", "settings": "settings" }
        }
    },
    "suites": {
        "suites.Interop": {
            "name": "Interoperability",
            "resources": {
                "participants": "ParticipantList",
                "settings": "ConfigurationPayload",
                "dss": "ConfigurationPayload?"
            },
            "actions": [
                {
                    "action_generator": {
                        "generator_type": "ForEachResourceInstance",
                        "specification": {
                            "action_to_repeat": {
                                "test_scenario": {
                                    "scenario_type": "scenarios.Probe",
                                    "resources": {
                                        "participant": "participant",
                                        "settings": "settings"
                                    }
                                }
                            },
                            "resource_id": "participants",
                            "local_resource_id": "participant"
                        },
                        "resources": { "participants": "participants", "settings": "settings" }
                    }
                }
            ],
            "participant_verifiable_capabilities": [
                {
                    "id": "basic",
                    "name": "Basic interoperability",
                    "verification_condition": {
                        "requirements_checked": { "checked": { "requirement_sets": ["core"] } }
                    }
                },
                {
                    "id": "verified",
                    "name": "Verified",
                    "verification_condition": {
                        "all_conditions": {
                            "conditions": [
                                { "no_failed_checks": {} },
                                { "capability_verified": { "capability_ids": ["basic"] } }
                            ]
                        }
                    }
                }
            ],
            "badges": [
                {
                    "id": "gold",
                    "name": "Gold",
                    "grant_condition": { "capability_verified": { "capability_ids": ["verified"] } }
                }
            ]
        }
    },
    "requirement_sets": {
        "core": { "requirements": ["astm.f3548.v21.SCD0035"] }
    }
}"#;

struct Probe {
    participant: ParticipantId,
    fail: bool,
}

#[async_trait]
impl TestScenario for Probe {
    fn name(&self) -> &str {
        "Probe participant"
    }

    async fn run(&mut self, recorder: &mut ScenarioRecorder) -> anyhow::Result<()> {
        recorder.begin_test_case("Probe")?;
        recorder.begin_test_step("Query")?;
        if self.fail {
            recorder.record_failed_check(
                FailedCheck::new("Query succeeds", "query rejected", Severity::High)
                    .with_participants([self.participant.clone()]),
            )?;
        } else {
            recorder.record_passed_check(
                PassedCheck::new("Query succeeds")
                    .with_participants([self.participant.clone()])
                    .with_requirements([RequirementId::parse("astm.f3548.v21.SCD0035")?]),
            )?;
        }
        recorder.end_test_case()?;
        Ok(())
    }
}

fn registries() -> Registries {
    let mut registries = Registries::with_builtins();
    registries.scenarios.register("scenarios.Probe", |pool| {
        let participant = pool
            .require_as::<Participant>("participant", "scenarios.Probe")?
            .participant_id
            .clone();
        let settings = pool.require_as::<ConfigurationPayload>("settings", "scenarios.Probe")?;
        let fail = settings.payload["fail_for"]
            .as_array()
            .is_some_and(|ids| ids.iter().any(|id| id.as_str() == Some(participant.as_str())));
        Ok(Box::new(Probe { participant, fail }) as Box<dyn TestScenario>)
    });
    registries
}

fn suite_report(report: &TestRunReport) -> &qualifier_domain::TestSuiteReport {
    report
        .report
        .as_test_suite()
        .expect("root action is a test suite")
}

#[tokio::test]
async fn run_from_configuration_file_grants_capabilities() {
    qualifier_core::telemetry::init_tracing(false, tracing::Level::DEBUG);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIGURATION.as_bytes()).unwrap();
    let configuration = TestConfiguration::from_path(file.path()).unwrap();

    let registries = registries();
    let report = TestRun::new(&configuration, &registries)
        .execute()
        .await
        .unwrap();

    let suite = suite_report(&report);
    assert_eq!(suite.name, "Interoperability");
    assert_eq!(suite.scenario_reports().len(), 2);
    assert!(!report.successful());
    assert!(report.end_time >= report.start_time);

    let uss1 = ParticipantId::new("uss1");
    let uss2 = ParticipantId::new("uss2");
    assert!(suite.has_capability(&uss1, "basic"));
    assert!(suite.has_capability(&uss1, "verified"));
    assert!(suite.has_badge(&uss1, "gold"));
    assert!(!suite.has_capability(&uss2, "basic"));
    assert!(!suite.has_capability(&uss2, "verified"));
    assert!(!suite.has_badge(&uss2, "gold"));
    assert_eq!(suite.capability_evaluations.len(), 4);

    assert_eq!(report.report.query_failed_checks(Some(&uss2)).len(), 1);
    assert!(report.report.query_failed_checks(Some(&uss1)).is_empty());
    assert_eq!(
        report.report.all_participants().into_iter().collect::<Vec<_>>(),
        vec![uss1, uss2]
    );
}

#[tokio::test]
async fn report_serializes_and_reloads() {
    let configuration = TestConfiguration::from_json_str(CONFIGURATION).unwrap();
    let registries = registries();
    let report = TestRun::new(&configuration, &registries)
        .execute()
        .await
        .unwrap();

    let json = report.to_json_pretty().unwrap();
    let reloaded: TestRunReport = serde_json::from_str(&json).unwrap();
    assert_eq!(reloaded, report);
    assert!(matches!(reloaded.report, TestSuiteActionReport::TestSuite(_)));
}

#[tokio::test]
async fn metrics_accumulate_across_runs() {
    let configuration = TestConfiguration::from_json_str(CONFIGURATION).unwrap();
    let registries = registries();
    let before = METRICS.scenarios_executed();
    for _ in 0..2 {
        TestRun::new(&configuration, &registries)
            .execute()
            .await
            .unwrap();
    }
    // Two runs of two scenarios each; other tests may add more concurrently.
    assert!(METRICS.scenarios_executed() >= before + 4);
    assert!(METRICS.failed_checks() >= 2);
}

/// Must be called outside any tokio runtime, hence a plain `#[test]`.
#[test]
fn execute_blocking_matches_async_entry_point() {
    let configuration = TestConfiguration::from_json_str(CONFIGURATION).unwrap();
    let registries = registries();
    let report = TestRun::new(&configuration, &registries)
        .execute_blocking()
        .unwrap();
    assert_eq!(suite_report(&report).scenario_reports().len(), 2);
}

#[test]
fn potential_actions_need_no_resources() {
    let mut configuration = TestConfiguration::from_json_str(CONFIGURATION).unwrap();
    configuration.resources.clear();
    let registries = registries();

    let shape = TestRun::new(&configuration, &registries)
        .potential_actions()
        .unwrap();
    assert_eq!(shape.kind, "test_suite");
    assert_eq!(shape.scenario_types(), vec!["scenarios.Probe"]);

    // Building for real does need them.
    assert!(matches!(
        TestRun::new(&configuration, &registries).build(),
        Err(QualifierError::Action(_))
    ));
}

#[tokio::test]
async fn unresolvable_resources_abort_before_execution() {
    let mut configuration = TestConfiguration::from_json_str(CONFIGURATION).unwrap();
    let cyclic: serde_json::Value = serde_json::json!({
        "a": { "resource_type": "ConfigurationPayload", "dependencies": { "x": "b" } },
        "b": { "resource_type": "ConfigurationPayload", "dependencies": { "x": "a" } },
        "c": { "resource_type": "ConfigurationPayload", "dependencies": { "x": "missing" } }
    });
    configuration
        .resources
        .extend(serde_json::from_value::<std::collections::BTreeMap<_, _>>(cyclic).unwrap());

    let registries = registries();
    let err = TestRun::new(&configuration, &registries)
        .execute()
        .await
        .unwrap_err();
    match err {
        QualifierError::Resource(ResourceError::UnresolvableResources { unresolved, cycle }) => {
            let ids: Vec<&str> = unresolved.iter().map(|u| u.resource_id.as_str()).collect();
            assert_eq!(ids, vec!["a", "b", "c"]);
            assert!(cycle.is_some());
        }
        other => panic!("expected unresolvable resources, got {other:?}"),
    }
}

#[test]
fn missing_configuration_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = TestConfiguration::from_path(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, QualifierError::Io(_)));
}
