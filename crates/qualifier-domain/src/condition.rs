//! Capability and badge condition trees.
//!
//! On disk a condition is an object with exactly one populated field:
//!
//! ```json
//! { "all_conditions": { "conditions": [ { "no_failed_checks": {} } ] } }
//! ```
//!
//! Unrecognised fields are kept as [`Condition::Extension`] so that
//! evaluators registered at runtime can handle additional kinds.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{BadgeId, CapabilityId};
use crate::requirements::RequirementCollection;

/// Default location for [`Condition::CapabilityVerified`]: the suite itself.
pub const SELF_LOCATION: &str = "self";

/// Recursive boolean condition evaluated for one participant against a
/// test suite report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCondition", into = "RawCondition")]
pub enum Condition {
    /// True when every sub-condition holds (vacuously true when empty).
    AllConditions(Vec<Condition>),
    /// True when at least one sub-condition holds (false when empty).
    AnyCondition(Vec<Condition>),
    /// True when the participant has no failed checks.
    NoFailedChecks,
    /// True when every resolved requirement was checked successfully.
    RequirementsChecked(RequirementCollection),
    /// True when every suite report at `capability_location` granted all
    /// `capability_ids` to the participant.
    CapabilityVerified {
        capability_ids: Vec<CapabilityId>,
        capability_location: Option<String>,
    },
    /// Condition kind handled by a runtime-registered evaluator.
    Extension {
        kind: String,
        specification: serde_json::Value,
    },
}

impl Condition {
    pub const ALL_CONDITIONS: &'static str = "all_conditions";
    pub const ANY_CONDITIONS: &'static str = "any_conditions";
    pub const NO_FAILED_CHECKS: &'static str = "no_failed_checks";
    pub const REQUIREMENTS_CHECKED: &'static str = "requirements_checked";
    pub const CAPABILITY_VERIFIED: &'static str = "capability_verified";

    /// Serialized field name of this condition, used for evaluator lookup.
    pub fn kind(&self) -> &str {
        match self {
            Condition::AllConditions(_) => Self::ALL_CONDITIONS,
            Condition::AnyCondition(_) => Self::ANY_CONDITIONS,
            Condition::NoFailedChecks => Self::NO_FAILED_CHECKS,
            Condition::RequirementsChecked(_) => Self::REQUIREMENTS_CHECKED,
            Condition::CapabilityVerified { .. } => Self::CAPABILITY_VERIFIED,
            Condition::Extension { kind, .. } => kind,
        }
    }

    /// Capability-verified condition at the default `self` location.
    pub fn capability_verified(ids: impl IntoIterator<Item = impl Into<CapabilityId>>) -> Self {
        Condition::CapabilityVerified {
            capability_ids: ids.into_iter().map(Into::into).collect(),
            capability_location: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConditionList {
    #[serde(default)]
    conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NoFailedChecksCondition {}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RequirementsCheckedCondition {
    checked: RequirementCollection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CapabilityVerifiedCondition {
    capability_ids: Vec<CapabilityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    capability_location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    all_conditions: Option<ConditionList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    any_conditions: Option<ConditionList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    no_failed_checks: Option<NoFailedChecksCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    requirements_checked: Option<RequirementsCheckedCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    capability_verified: Option<CapabilityVerifiedCondition>,
    #[serde(flatten)]
    extensions: serde_json::Map<String, serde_json::Value>,
}

impl TryFrom<RawCondition> for Condition {
    type Error = DomainError;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        let found = usize::from(raw.all_conditions.is_some())
            + usize::from(raw.any_conditions.is_some())
            + usize::from(raw.no_failed_checks.is_some())
            + usize::from(raw.requirements_checked.is_some())
            + usize::from(raw.capability_verified.is_some())
            + raw.extensions.len();
        if found != 1 {
            return Err(DomainError::NotExactlyOne {
                kind: "condition",
                expected: "all_conditions, any_conditions, no_failed_checks, \
                           requirements_checked, capability_verified \
                           or a registered extension",
                found,
            });
        }

        if let Some(list) = raw.all_conditions {
            return Ok(Condition::AllConditions(list.conditions));
        }
        if let Some(list) = raw.any_conditions {
            return Ok(Condition::AnyCondition(list.conditions));
        }
        if raw.no_failed_checks.is_some() {
            return Ok(Condition::NoFailedChecks);
        }
        if let Some(c) = raw.requirements_checked {
            return Ok(Condition::RequirementsChecked(c.checked));
        }
        if let Some(c) = raw.capability_verified {
            return Ok(Condition::CapabilityVerified {
                capability_ids: c.capability_ids,
                capability_location: c.capability_location,
            });
        }
        let (kind, specification) = raw
            .extensions
            .into_iter()
            .next()
            .ok_or(DomainError::NotExactlyOne {
                kind: "condition",
                expected: "a populated condition",
                found: 0,
            })?;
        Ok(Condition::Extension {
            kind,
            specification,
        })
    }
}

impl From<Condition> for RawCondition {
    fn from(condition: Condition) -> Self {
        let mut raw = RawCondition::default();
        match condition {
            Condition::AllConditions(conditions) => {
                raw.all_conditions = Some(ConditionList { conditions })
            }
            Condition::AnyCondition(conditions) => {
                raw.any_conditions = Some(ConditionList { conditions })
            }
            Condition::NoFailedChecks => raw.no_failed_checks = Some(NoFailedChecksCondition {}),
            Condition::RequirementsChecked(checked) => {
                raw.requirements_checked = Some(RequirementsCheckedCondition { checked })
            }
            Condition::CapabilityVerified {
                capability_ids,
                capability_location,
            } => {
                raw.capability_verified = Some(CapabilityVerifiedCondition {
                    capability_ids,
                    capability_location,
                })
            }
            Condition::Extension {
                kind,
                specification,
            } => {
                raw.extensions.insert(kind, specification);
            }
        }
        raw
    }
}

/// A capability a participant may be verified to have by a test suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantCapabilityDefinition {
    pub id: CapabilityId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub verification_condition: Condition,
}

impl ParticipantCapabilityDefinition {
    pub fn new(id: impl Into<CapabilityId>, verification_condition: Condition) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            verification_condition,
        }
    }
}

/// A badge granted to a participant by a test suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeDefinition {
    pub id: BadgeId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub grant_condition: Condition,
}

impl BadgeDefinition {
    pub fn new(id: impl Into<BadgeId>, grant_condition: Condition) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            grant_condition,
        }
    }
}
