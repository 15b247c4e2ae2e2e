//! Requirement collections and the named requirement-set catalog.
//!
//! A [`RequirementCollection`] resolves to a flat set of [`RequirementId`]s:
//! the union of explicit requirements, named requirement sets and nested
//! collections, minus `exclude` which is applied last. Resolution depends
//! only on the collection and the catalog, so it is idempotent and
//! insensitive to member ordering.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::ids::{RequirementId, RequirementSetId};

/// Declarative description of a set of requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementCollection {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<RequirementId>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirement_sets: Vec<RequirementSetId>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirement_collections: Vec<RequirementCollection>,

    /// Removed from the union of everything above.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Box<RequirementCollection>>,
}

impl RequirementCollection {
    /// Collection of explicit requirements only.
    pub fn of(requirements: impl IntoIterator<Item = RequirementId>) -> Self {
        Self {
            requirements: requirements.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Add a named requirement set.
    pub fn with_set(mut self, set: impl Into<RequirementSetId>) -> Self {
        self.requirement_sets.push(set.into());
        self
    }

    /// Add a nested collection.
    pub fn with_collection(mut self, collection: RequirementCollection) -> Self {
        self.requirement_collections.push(collection);
        self
    }

    /// Set the exclusion collection.
    pub fn excluding(mut self, exclude: RequirementCollection) -> Self {
        self.exclude = Some(Box::new(exclude));
        self
    }
}

/// Named requirement sets available to collections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequirementCatalog {
    sets: BTreeMap<RequirementSetId, RequirementCollection>,
}

impl RequirementCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a named requirement set.
    pub fn insert(&mut self, id: impl Into<RequirementSetId>, collection: RequirementCollection) {
        self.sets.insert(id.into(), collection);
    }

    pub fn get(&self, id: &str) -> Option<&RequirementCollection> {
        self.sets.get(id)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Resolve a collection into a flat, sorted set of requirement IDs.
    ///
    /// Returns [`DomainError::UnknownRequirementSet`] for a set name missing
    /// from the catalog and [`DomainError::RequirementSetCycle`] when a set
    /// (transitively) includes itself.
    pub fn resolve(&self, collection: &RequirementCollection) -> Result<BTreeSet<RequirementId>> {
        let mut stack = Vec::new();
        self.resolve_inner(collection, &mut stack)
    }

    /// Resolve a named requirement set.
    pub fn resolve_set(&self, id: &str) -> Result<BTreeSet<RequirementId>> {
        self.resolve(&RequirementCollection::default().with_set(id))
    }

    fn resolve_inner(
        &self,
        collection: &RequirementCollection,
        stack: &mut Vec<RequirementSetId>,
    ) -> Result<BTreeSet<RequirementId>> {
        let mut resolved: BTreeSet<RequirementId> =
            collection.requirements.iter().cloned().collect();

        for set_id in &collection.requirement_sets {
            if let Some(pos) = stack.iter().position(|s| s == set_id) {
                let mut path = stack[pos..].to_vec();
                path.push(set_id.clone());
                return Err(DomainError::RequirementSetCycle { path });
            }
            let set = self
                .sets
                .get(set_id)
                .ok_or_else(|| DomainError::UnknownRequirementSet(set_id.clone()))?;
            stack.push(set_id.clone());
            let members = self.resolve_inner(set, stack)?;
            stack.pop();
            resolved.extend(members);
        }

        for nested in &collection.requirement_collections {
            resolved.extend(self.resolve_inner(nested, stack)?);
        }

        if let Some(exclude) = &collection.exclude {
            let excluded = self.resolve_inner(exclude, stack)?;
            resolved.retain(|id| !excluded.contains(id));
        }

        Ok(resolved)
    }
}
