//! Identifiers shared across declarations and reports.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Name of a resource within a resource pool.
pub type ResourceId = String;

/// Identifier of a participant capability.
pub type CapabilityId = String;

/// Identifier of a participant badge.
pub type BadgeId = String;

/// Name of a requirement set in the [`crate::RequirementCatalog`].
pub type RequirementSetId = String;

/// Entity under test, identified by an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Dotted-path requirement identifier, e.g. `astm.f3548.v21.SCD0035`.
///
/// Every segment must be non-empty; at least one segment is required.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequirementId(String);

impl RequirementId {
    /// Parse and validate a dotted requirement identifier.
    pub fn parse(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidRequirementId {
                id,
                reason: "identifier is empty".to_string(),
            });
        }
        if id.split('.').any(|segment| segment.is_empty()) {
            return Err(DomainError::InvalidRequirementId {
                id,
                reason: "identifier contains an empty segment".to_string(),
            });
        }
        if id.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidRequirementId {
                id,
                reason: "identifier contains whitespace".to_string(),
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Everything before the final segment (empty for single-segment IDs).
    pub fn package(&self) -> &str {
        self.0.rsplit_once('.').map(|(pkg, _)| pkg).unwrap_or("")
    }

    /// Final segment of the identifier.
    pub fn name(&self) -> &str {
        self.0.rsplit_once('.').map(|(_, name)| name).unwrap_or(&self.0)
    }
}

impl TryFrom<String> for RequirementId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RequirementId> for String {
    fn from(id: RequirementId) -> Self {
        id.0
    }
}

impl fmt::Display for RequirementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
