//! Run entry point: configuration in, frozen report out.

use chrono::{DateTime, Utc};
use qualifier_domain::{ReportTree, TestSuiteActionReport};
use serde::{Deserialize, Serialize};
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::action::{ActionFactory, PotentialAction, TestSuiteAction};
use crate::capability::CapabilityEngine;
use crate::config::TestConfiguration;
use crate::error::Result;
use crate::executor::Executor;
use crate::metrics::METRICS;
use crate::obs;
use crate::registry::Registries;
use crate::resources::ResourcePool;

/// Outcome of one qualification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunReport {
    pub run_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Report of the root action.
    pub report: TestSuiteActionReport,
}

impl TestRunReport {
    pub fn successful(&self) -> bool {
        self.report.successful()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// One configuration bound to the registries that interpret it.
#[derive(Debug, Clone, Copy)]
pub struct TestRun<'a> {
    configuration: &'a TestConfiguration,
    registries: &'a Registries,
}

impl<'a> TestRun<'a> {
    pub fn new(configuration: &'a TestConfiguration, registries: &'a Registries) -> Self {
        Self {
            configuration,
            registries,
        }
    }

    /// Build the resource pool and the whole action tree.
    ///
    /// Every resource, binding and generator problem is reported here,
    /// before anything executes.
    pub fn build(&self) -> Result<TestSuiteAction> {
        let pool = ResourcePool::build(
            &self.configuration.resources,
            &self.registries.resource_types,
        )?;
        let factory = ActionFactory::new(self.registries, &self.configuration.suites);
        Ok(factory.build(&self.configuration.action, &pool)?)
    }

    /// Resource-free shape of the configured action tree.
    pub fn potential_actions(&self) -> Result<PotentialAction> {
        let factory = ActionFactory::new(self.registries, &self.configuration.suites);
        Ok(factory.potential_actions(&self.configuration.action)?)
    }

    /// Build, execute and judge the configured action tree.
    pub async fn execute(&self) -> Result<TestRunReport> {
        let run_id = Uuid::new_v4();
        let span = obs::run_span(&run_id.to_string());
        self.execute_as(run_id).instrument(span).await
    }

    /// [`TestRun::execute`] on a fresh single-threaded runtime, for
    /// synchronous callers.
    ///
    /// # Panics
    ///
    /// Panics when called from within a tokio runtime, since the nested
    /// runtime cannot block the thread driving the outer one. Async
    /// callers use [`TestRun::execute`].
    pub fn execute_blocking(&self) -> Result<TestRunReport> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.execute())
    }

    async fn execute_as(&self, run_id: Uuid) -> Result<TestRunReport> {
        let start_time = Utc::now();
        let run_label = run_id.to_string();
        obs::emit_run_started(
            &run_label,
            self.configuration.action.type_name(),
            self.configuration.resources.len(),
        );

        let root = self.build()?;

        let engine = CapabilityEngine::new(
            &self.registries.conditions,
            &self.configuration.requirement_sets,
        );
        let mut executor = Executor::new(&self.configuration.execution, engine);
        let report = executor.execute(root).await?;

        let end_time = Utc::now();
        let successful = report.successful();
        let duration_ms = (end_time - start_time).num_milliseconds().max(0) as u64;
        obs::emit_run_finished(
            &run_label,
            duration_ms,
            report.scenario_reports().len(),
            successful,
        );
        METRICS.flush();
        info!(successful, "qualification run complete");

        Ok(TestRunReport {
            run_id,
            start_time,
            end_time,
            report,
        })
    }
}
