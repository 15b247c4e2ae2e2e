//! Test scenario contract and report recording.
//!
//! A scenario is the leaf unit of execution. Scenario code performs its
//! checks against participants and records them through a
//! [`ScenarioRecorder`]; the orchestrator owns the recorder and turns it into
//! a [`TestScenarioReport`] once the scenario and its cleanup have finished.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use qualifier_domain::{
    ErrorReport, FailedCheck, PassedCheck, TestCaseReport, TestScenarioReport, TestStepReport,
};

pub use qualifier_domain::ScenarioPhase;
use thiserror::Error;

use crate::error::ResourceError;
use crate::resources::ResourcePool;

/// Name of the step that collects checks recorded during cleanup.
pub const CLEANUP_STEP: &str = "Cleanup";

/// A leaf test scenario.
#[async_trait]
pub trait TestScenario: Send {
    /// Human-readable scenario name used in reports.
    fn name(&self) -> &str;

    /// Perform the scenario's test cases, recording checks as they happen.
    ///
    /// Returning `Err` (or panicking) records an execution error on the
    /// scenario report; it never stops the run.
    async fn run(&mut self, recorder: &mut ScenarioRecorder) -> anyhow::Result<()>;

    /// Undo side effects on the systems under test.
    ///
    /// Always invoked after [`TestScenario::run`], whatever its outcome.
    /// Checks recorded here land in a dedicated cleanup step.
    async fn cleanup(&mut self, _recorder: &mut ScenarioRecorder) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Misuse of the recording API by scenario code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecorderError {
    #[error("cannot begin test case '{requested}' while test case '{active}' is active")]
    TestCaseAlreadyActive { active: String, requested: String },

    #[error("cannot begin test step '{requested}' while test step '{active}' is active")]
    TestStepAlreadyActive { active: String, requested: String },

    #[error("no test case is active")]
    NoActiveTestCase,

    #[error("no test step is active")]
    NoActiveTestStep,

    #[error("test cases cannot be started during {0}")]
    WrongPhase(ScenarioPhase),
}

/// Append-only builder for one scenario's report.
#[derive(Debug)]
pub struct ScenarioRecorder {
    report: TestScenarioReport,
    phase: ScenarioPhase,
    case: Option<TestCaseReport>,
    step: Option<TestStepReport>,
}

impl ScenarioRecorder {
    pub fn new(name: impl Into<String>, scenario_type: impl Into<String>) -> Self {
        Self {
            report: TestScenarioReport::new(name, scenario_type),
            phase: ScenarioPhase::NotRun,
            case: None,
            step: None,
        }
    }

    pub fn phase(&self) -> ScenarioPhase {
        self.phase
    }

    pub fn begin_test_case(&mut self, name: impl Into<String>) -> Result<(), RecorderError> {
        if self.phase != ScenarioPhase::Running {
            return Err(RecorderError::WrongPhase(self.phase));
        }
        let name = name.into();
        if let Some(active) = &self.case {
            return Err(RecorderError::TestCaseAlreadyActive {
                active: active.name.clone(),
                requested: name,
            });
        }
        self.case = Some(TestCaseReport::new(name));
        Ok(())
    }

    pub fn end_test_case(&mut self) -> Result<(), RecorderError> {
        if self.step.is_some() {
            self.end_test_step()?;
        }
        let mut case = self.case.take().ok_or(RecorderError::NoActiveTestCase)?;
        case.end_time = Some(Utc::now());
        self.report.cases.push(case);
        Ok(())
    }

    pub fn begin_test_step(&mut self, name: impl Into<String>) -> Result<(), RecorderError> {
        if self.case.is_none() {
            return Err(RecorderError::NoActiveTestCase);
        }
        let name = name.into();
        if let Some(active) = &self.step {
            return Err(RecorderError::TestStepAlreadyActive {
                active: active.name.clone(),
                requested: name,
            });
        }
        self.step = Some(TestStepReport::new(name));
        Ok(())
    }

    pub fn end_test_step(&mut self) -> Result<(), RecorderError> {
        let mut step = self.step.take().ok_or(RecorderError::NoActiveTestStep)?;
        step.end_time = Some(Utc::now());
        let case = self.case.as_mut().ok_or(RecorderError::NoActiveTestCase)?;
        case.steps.push(step);
        Ok(())
    }

    pub fn record_passed_check(&mut self, check: PassedCheck) -> Result<(), RecorderError> {
        self.active_step()?.passed_checks.push(check);
        Ok(())
    }

    pub fn record_failed_check(&mut self, check: FailedCheck) -> Result<(), RecorderError> {
        self.active_step()?.failed_checks.push(check);
        Ok(())
    }

    fn active_step(&mut self) -> Result<&mut TestStepReport, RecorderError> {
        if self.phase == ScenarioPhase::CleaningUp {
            return Ok(self
                .report
                .cleanup
                .get_or_insert_with(|| TestStepReport::new(CLEANUP_STEP)));
        }
        self.step.as_mut().ok_or(RecorderError::NoActiveTestStep)
    }

    pub(crate) fn start(&mut self) {
        self.report.start_time = Utc::now();
        self.phase = ScenarioPhase::Running;
    }

    /// Close whatever the scenario left open and switch to cleanup recording.
    pub(crate) fn begin_cleanup(&mut self) {
        if let Some(mut step) = self.step.take() {
            step.end_time = Some(Utc::now());
            if let Some(case) = self.case.as_mut() {
                case.steps.push(step);
            }
        }
        if let Some(mut case) = self.case.take() {
            case.end_time = Some(Utc::now());
            self.report.cases.push(case);
        }
        self.phase = ScenarioPhase::CleaningUp;
    }

    pub(crate) fn finish(
        mut self,
        execution_error: Option<ErrorReport>,
        cleanup_error: Option<ErrorReport>,
    ) -> TestScenarioReport {
        if self.phase != ScenarioPhase::CleaningUp {
            self.begin_cleanup();
        }
        if let Some(cleanup) = self.report.cleanup.as_mut() {
            cleanup.end_time = Some(Utc::now());
        }
        self.report.phase = if execution_error.is_some() || cleanup_error.is_some() {
            ScenarioPhase::Errored
        } else {
            ScenarioPhase::Completed
        };
        self.report.execution_error = execution_error;
        self.report.cleanup_error = cleanup_error;
        self.report.end_time = Some(Utc::now());
        self.report
    }
}

/// Constructor for one scenario type, given the scenario's bound resources.
pub type ScenarioFactory =
    Arc<dyn Fn(&ResourcePool) -> Result<Box<dyn TestScenario>, ResourceError> + Send + Sync>;

/// Explicit mapping from scenario type names to constructors.
#[derive(Clone, Default)]
pub struct ScenarioRegistry {
    factories: HashMap<String, ScenarioFactory>,
}

impl fmt::Debug for ScenarioRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.factories.keys().collect();
        types.sort();
        f.debug_struct("ScenarioRegistry")
            .field("types", &types)
            .finish()
    }
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the constructor for `scenario_type`.
    pub fn register<F>(&mut self, scenario_type: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ResourcePool) -> Result<Box<dyn TestScenario>, ResourceError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(scenario_type.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, scenario_type: &str) -> bool {
        self.factories.contains_key(scenario_type)
    }

    pub fn get(&self, scenario_type: &str) -> Option<&ScenarioFactory> {
        self.factories.get(scenario_type)
    }
}

/// Convert a scenario error into report data, keeping its cause chain.
pub fn error_report(error: &anyhow::Error) -> ErrorReport {
    ErrorReport::new(error.to_string()).with_causes(error.chain().skip(1).map(ToString::to_string))
}

/// Convert a caught panic payload into report data.
pub fn panic_report(payload: &(dyn std::any::Any + Send)) -> ErrorReport {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "scenario panicked".to_string());
    ErrorReport::new(format!("panic: {message}"))
}
