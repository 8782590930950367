//! Error types for ua-alarms.
//!
//! Creation, field-write and trigger failures propagate synchronously as
//! `AlarmError`, each carrying the status code reported by the node store.
//! Teardown never reports errors.

use thiserror::Error;

use crate::dispatch::TransitionKind;
use crate::node_id::NodeId;
use crate::status::StatusCode;
use crate::storage::StoreError;

/// Top-level error type for condition operations.
#[derive(Debug, Error)]
pub enum AlarmError {
    /// The node store refused to materialize the condition.
    #[error("Condition creation failed ({status}): {source}")]
    Creation {
        status: StatusCode,
        #[source]
        source: StoreError,
    },

    /// A field or sub-field write (or read) was refused.
    #[error("Write to condition field '{field}' failed ({status}): {source}")]
    FieldWrite {
        field: String,
        status: StatusCode,
        #[source]
        source: StoreError,
    },

    /// The condition event could not be emitted.
    #[error("Triggering condition {condition} failed ({status}): {source}")]
    Trigger {
        condition: NodeId,
        status: StatusCode,
        #[source]
        source: StoreError,
    },

    /// The node store refused to install a transition handler.
    #[error("Registering {} callback failed ({status}): {source}", .kind.label())]
    Registration {
        kind: TransitionKind,
        status: StatusCode,
        #[source]
        source: StoreError,
    },

    /// An event stream lost its store.
    #[error("Event stream disconnected")]
    Disconnected,

    /// Waiting on an event stream timed out.
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AlarmError {
    pub(crate) fn creation(source: StoreError) -> Self {
        Self::Creation {
            status: source.status(),
            source,
        }
    }

    pub(crate) fn field_write(field: impl Into<String>, source: StoreError) -> Self {
        Self::FieldWrite {
            field: field.into(),
            status: source.status(),
            source,
        }
    }

    pub(crate) fn trigger(condition: &NodeId, source: StoreError) -> Self {
        Self::Trigger {
            condition: condition.clone(),
            status: source.status(),
            source,
        }
    }

    pub(crate) fn registration(kind: TransitionKind, source: StoreError) -> Self {
        Self::Registration {
            kind,
            status: source.status(),
            source,
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Status code carried by this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Creation { status, .. }
            | Self::FieldWrite { status, .. }
            | Self::Trigger { status, .. }
            | Self::Registration { status, .. } => *status,
            Self::Disconnected | Self::Timeout { .. } | Self::Internal { .. } => {
                StatusCode::BAD_INTERNAL_ERROR
            }
        }
    }

    /// Returns true if this is a creation error.
    #[must_use]
    pub const fn is_creation(&self) -> bool {
        matches!(self, Self::Creation { .. })
    }

    /// Returns true if this is a field write error.
    #[must_use]
    pub const fn is_field_write(&self) -> bool {
        matches!(self, Self::FieldWrite { .. })
    }

    /// Returns true if this is a trigger error.
    #[must_use]
    pub const fn is_trigger(&self) -> bool {
        matches!(self, Self::Trigger { .. })
    }
}

/// Result type alias for condition operations.
pub type AlarmResult<T> = Result<T, AlarmError>;
