//! Domain-level error taxonomy for Qualifier.

/// Errors produced while validating or resolving domain objects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("invalid requirement id '{id}': {reason}")]
    InvalidRequirementId { id: String, reason: String },

    #[error("requirement set not found: {0}")]
    UnknownRequirementSet(String),

    #[error("requirement set cycle detected: {}", path.join(" -> "))]
    RequirementSetCycle { path: Vec<String> },

    #[error("{kind} must populate exactly one of {expected}; found {found}")]
    NotExactlyOne {
        kind: &'static str,
        expected: &'static str,
        found: usize,
    },
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
