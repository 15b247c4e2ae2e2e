//! Resource types available to every configuration.

use std::any::Any;
use std::sync::{Arc, Mutex};

use qualifier_domain::ParticipantId;
use serde::Deserialize;

use super::{Resource, ResourceTypeRegistry};

pub const CONFIGURATION_PAYLOAD: &str = "ConfigurationPayload";
pub const PARTICIPANT: &str = "Participant";
pub const PARTICIPANT_LIST: &str = "ParticipantList";
pub const CLEANUP_TOKEN: &str = "CleanupToken";

/// Opaque JSON payload handed to scenarios as-is.
#[derive(Debug, Clone)]
pub struct ConfigurationPayload {
    pub payload: serde_json::Value,
}

impl ConfigurationPayload {
    pub fn new(payload: serde_json::Value) -> Self {
        Self { payload }
    }
}

impl Resource for ConfigurationPayload {
    fn resource_type(&self) -> &str {
        CONFIGURATION_PAYLOAD
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A single participant under test.
#[derive(Debug, Clone, Deserialize)]
pub struct Participant {
    pub participant_id: ParticipantId,
}

impl Participant {
    pub fn new(participant_id: impl Into<String>) -> Self {
        Self {
            participant_id: ParticipantId::new(participant_id),
        }
    }
}

impl Resource for Participant {
    fn resource_type(&self) -> &str {
        PARTICIPANT
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Deserialize)]
struct ParticipantListSpecification {
    participants: Vec<String>,
}

/// Ordered list of participants; each entry is a [`Participant`] sub-instance.
#[derive(Debug, Clone)]
pub struct ParticipantList {
    participants: Vec<Arc<dyn Resource>>,
}

impl ParticipantList {
    pub fn new(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            participants: ids
                .into_iter()
                .map(|id| Arc::new(Participant::new(id)) as Arc<dyn Resource>)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

impl Resource for ParticipantList {
    fn resource_type(&self) -> &str {
        PARTICIPANT_LIST
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn sub_instances(&self) -> Option<Vec<Arc<dyn Resource>>> {
        Some(self.participants.clone())
    }
}

/// State handed from a setup action to its matching teardown action.
///
/// Created fresh for every wrapped action, so nested or repeated wrapping
/// never shares state. Setup stores whatever teardown needs to undo it;
/// teardown takes it back out.
#[derive(Debug, Default)]
pub struct CleanupToken {
    state: Mutex<Option<serde_json::Value>>,
}

impl CleanupToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the state teardown needs, replacing any previous value.
    pub fn store(&self, state: serde_json::Value) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(state);
    }

    /// Take the stored state, leaving the token empty.
    pub fn take(&self) -> Option<serde_json::Value> {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.take()
    }

    pub fn is_empty(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }
}

impl Resource for CleanupToken {
    fn resource_type(&self) -> &str {
        CLEANUP_TOKEN
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(super) fn register_builtins(registry: &mut ResourceTypeRegistry) {
    registry.register(CONFIGURATION_PAYLOAD, |ctx| {
        Ok(Arc::new(ConfigurationPayload::new(ctx.specification.clone())) as Arc<dyn Resource>)
    });
    registry.register(PARTICIPANT, |ctx| {
        let participant: Participant = ctx.specification_as()?;
        Ok(Arc::new(participant) as Arc<dyn Resource>)
    });
    registry.register(PARTICIPANT_LIST, |ctx| {
        let spec: ParticipantListSpecification = ctx.specification_as()?;
        Ok(Arc::new(ParticipantList::new(spec.participants)) as Arc<dyn Resource>)
    });
}
