//! Emitted condition events.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::node_id::NodeId;
use crate::value::Variant;

/// Opaque identifier of an emitted event.
///
/// Callers may log or correlate it but must not assume any internal structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Vec<u8>);

impl EventId {
    /// Wraps raw event id bytes.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns true if no id was assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

/// Snapshot of a condition taken when its event was emitted.
///
/// Two-state sub-properties are flattened as `Variable/Property`
/// (e.g. `ActiveState/Id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionEvent {
    /// Identifier returned by `trigger`.
    pub event_id: EventId,
    /// Condition the event was emitted for.
    pub condition: NodeId,
    /// Notifier the event was emitted through.
    pub source: NodeId,
    /// Emission time.
    pub time: DateTime<Utc>,
    /// Field values read back at emission time.
    pub fields: BTreeMap<String, Variant>,
}

impl ConditionEvent {
    /// Field value from the snapshot, if present.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Variant> {
        self.fields.get(name)
    }

    /// JSON rendering for correlation and logging by the hosting server.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
