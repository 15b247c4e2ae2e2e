//! Qualifier Core Library
//!
//! Runtime for declarative compliance-test runs:
//! - [`resources`]: typed resource pools built in dependency order
//! - [`action`] and [`generators`]: the action tree and its expansion
//! - [`executor`]: sequential execution into a report tree
//! - [`capability`]: capability and badge verification over reports
//! - [`run`]: configuration in, [`TestRunReport`] out

pub mod action;
pub mod capability;
pub mod config;
pub mod error;
pub mod executor;
pub mod generators;
pub mod metrics;
pub mod obs;
pub mod registry;
pub mod resources;
pub mod run;
pub mod scenario;
pub mod telemetry;

pub use action::{ActionFactory, ActionNode, PotentialAction, SuiteCatalog, TestSuiteAction};
pub use capability::{
    resolve_suites, CapabilityEngine, ConditionEvaluator, ConditionEvaluatorRegistry,
    EvaluationContext,
};
pub use config::{ActionSelector, ExecutionConfiguration, TestConfiguration, TypeFilter};
pub use error::{ActionError, ConditionError, QualifierError, ResourceError, Result};
pub use executor::Executor;
pub use generators::{ActionGenerator, CombinationSelector, GeneratedAction, GeneratorRegistry};
pub use registry::Registries;
pub use resources::{
    downcast, CleanupToken, ConfigurationPayload, Participant, ParticipantList, Resource,
    ResourceContext, ResourcePool, ResourceTypeRegistry,
};
pub use run::{TestRun, TestRunReport};
pub use scenario::{RecorderError, ScenarioPhase, ScenarioRecorder, ScenarioRegistry, TestScenario};

/// Qualifier core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
