//! Qualifier Domain Model
//!
//! Serializable objects shared by every stage of a qualification run:
//! - Identifiers: participants, requirements, resources, capabilities
//! - Requirement collections and the named requirement-set catalog
//! - Action, suite and resource declarations
//! - Capability/badge condition trees
//! - The report tree and its aggregate queries

pub mod condition;
pub mod declaration;
pub mod error;
pub mod ids;
pub mod report;
pub mod requirements;

pub use condition::{BadgeDefinition, Condition, ParticipantCapabilityDefinition, SELF_LOCATION};
pub use declaration::{
    split_optional, ActionDeclaration, ActionGeneratorDefinition, ActionKind, ReactionToFailure,
    ResourceBindings, ResourceDeclaration, TestScenarioDeclaration, TestSuiteDeclaration,
    TestSuiteDefinition, TestSuiteSource, OPTIONAL_SUFFIX,
};
pub use error::{DomainError, Result};
pub use ids::{BadgeId, CapabilityId, ParticipantId, RequirementId, RequirementSetId, ResourceId};
pub use report::{
    ActionGeneratorReport, CapabilityEvaluationReport, ErrorReport, FailedCheck, PassedCheck,
    ReportTree, ScenarioPhase, Severity, SkippedActionReport, TestCaseReport, TestScenarioReport,
    TestStepReport, TestSuiteActionReport, TestSuiteReport,
};
pub use requirements::{RequirementCatalog, RequirementCollection};

/// Qualifier domain version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
