//! Error taxonomy for qualification runs.
//!
//! Only configuration problems are errors. Failed checks and faults raised
//! inside scenarios are report data and never surface here.

use std::fmt;

use qualifier_domain::{DomainError, ResourceId};
use thiserror::Error;

/// A resource declaration that could not be constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedResource {
    pub resource_id: ResourceId,
    /// Dependencies that were never constructed.
    pub missing_dependencies: Vec<ResourceId>,
}

impl fmt::Display for UnresolvedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (missing: {})",
            self.resource_id,
            self.missing_dependencies.join(", ")
        )
    }
}

fn describe_unresolved(
    unresolved: &[UnresolvedResource],
    cycle: &Option<Vec<ResourceId>>,
) -> String {
    let listed = unresolved
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    match cycle {
        Some(path) => format!("{listed}; dependency cycle: {}", path.join(" -> ")),
        None => listed,
    }
}

/// Errors produced while building or projecting resource pools.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The pool could not construct every declaration.
    #[error("unresolvable resources: {}", describe_unresolved(.unresolved, .cycle))]
    UnresolvableResources {
        unresolved: Vec<UnresolvedResource>,
        cycle: Option<Vec<ResourceId>>,
    },

    /// A required resource binding is absent from the parent pool.
    #[error("{subject} requires resource '{resource_id}', which is not available")]
    MissingResource {
        subject: String,
        resource_id: ResourceId,
    },

    /// A specification failed validation.
    #[error("invalid specification for {subject}: {reason}")]
    InvalidSpecification { subject: String, reason: String },

    /// No constructor is registered for the declared type.
    #[error("resource '{resource_id}' declares unknown resource type '{resource_type}'")]
    UnknownResourceType {
        resource_id: ResourceId,
        resource_type: String,
    },

    /// A bound resource is not of the type a suite declared.
    #[error("{subject} expects resource '{resource_id}' of type '{expected}', found '{actual}'")]
    TypeMismatch {
        subject: String,
        resource_id: ResourceId,
        expected: String,
        actual: String,
    },
}

/// Errors produced while constructing an action tree.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("unknown test scenario type: {0}")]
    UnknownScenarioType(String),

    #[error("unknown test suite type: {0}")]
    UnknownSuiteType(String),

    #[error("unknown action generator type: {0}")]
    UnknownGeneratorType(String),

    /// A catalog suite contains itself, directly or through other suites.
    #[error("test suite recursion: {}", .path.join(" -> "))]
    SuiteCycle { path: Vec<String> },

    /// A generator specification failed validation.
    #[error("invalid specification for {subject}: {reason}")]
    InvalidSpecification { subject: String, reason: String },
}

/// Misconfigured capability or badge conditions.
///
/// Distinct from a condition that is simply not satisfied, which evaluates
/// to `false`.
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("no evaluator registered for condition kind '{0}'")]
    UnknownConditionKind(String),

    #[error("invalid capability location '{location}': {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error(
        "capability location '{location}' references an ancestor report; \
         only descendant or earlier capabilities may be referenced"
    )]
    AncestorReference { location: String },

    #[error("invalid specification for condition '{kind}': {reason}")]
    InvalidSpecification { kind: String, reason: String },

    #[error("requirement resolution failed: {0}")]
    Requirements(#[from] DomainError),
}

/// Top-level error for a qualification run.
#[derive(Debug, Error)]
pub enum QualifierError {
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("action construction error: {0}")]
    Action(#[from] ActionError),

    #[error("condition configuration error: {0}")]
    Condition(#[from] ConditionError),

    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("configuration parse error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for qualification runs.
pub type Result<T> = std::result::Result<T, QualifierError>;
