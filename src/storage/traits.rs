//! Abstract node store contract.
//!
//! The node store is the hosting server's address space. This crate never
//! stores condition state itself; every field write, read and event emission
//! goes through this trait. By using a trait, we enable:
//! - An in-memory store for tests and embedded use
//! - Adapters over a real server SDK

use std::sync::Arc;

use thiserror::Error;

use crate::dispatch::TransitionKind;
use crate::node_id::{NodeId, QualifiedName};
use crate::session::SessionId;
use crate::status::StatusCode;
use crate::value::{LocalizedText, Variant, VariantKind};

use super::event::EventId;

/// Errors reported by a node store.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// No node with this id.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// A node with the requested id already exists.
    #[error("Node id already in use: {0}")]
    NodeIdExists(NodeId),

    /// The requested id is in a namespace the store does not serve.
    #[error("Invalid namespace index {namespace} for node {id}")]
    InvalidNamespace {
        /// Offending namespace index.
        namespace: u16,
        /// Requested node id.
        id: NodeId,
    },

    /// The condition type is unknown to the store.
    #[error("Unknown condition type: {0}")]
    UnknownConditionType(NodeId),

    /// The condition source does not exist or cannot be used.
    #[error("Invalid condition source: {0}")]
    InvalidSource(NodeId),

    /// The parent reference type is not a known reference type.
    #[error("Invalid reference type: {0}")]
    InvalidReferenceType(NodeId),

    /// The node exists but is not a condition.
    #[error("Node is not a condition: {0}")]
    NotACondition(NodeId),

    /// The field (or variable/property pair) is not part of the condition type.
    #[error("Unknown condition field '{field}'")]
    FieldNotFound {
        /// Field path, `Variable/Property` for sub-fields.
        field: String,
    },

    /// The value does not have the field's shape.
    #[error("Type mismatch on field '{field}': expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        /// Field path.
        field: String,
        /// Shape the field requires.
        expected: VariantKind,
        /// Shape that was written.
        actual: VariantKind,
    },

    /// The source is not a registered notifier for the condition.
    #[error("Node {0} is not an event notifier for this condition")]
    NotANotifier(NodeId),

    /// The condition type has no two-state variable for this transition.
    #[error("Condition type does not support the {} transition", .0.label())]
    TransitionNotSupported(TransitionKind),

    /// The two-state variable is already true.
    #[error("Condition is already {}", .0.label())]
    AlreadyInState(TransitionKind),

    /// A transition handler rejected the transition.
    #[error("Transition to {} rejected: {status}", .kind.label())]
    Rejected {
        /// Transition that was rejected.
        kind: TransitionKind,
        /// Status returned by the handler.
        status: StatusCode,
    },

    /// Backend error.
    #[error("Node store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Status code the hosting server would report for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NodeNotFound(_) => StatusCode::BAD_NODE_ID_UNKNOWN,
            Self::NodeIdExists(_) => StatusCode::BAD_NODE_ID_EXISTS,
            Self::InvalidNamespace { .. } | Self::NotACondition(_) => StatusCode::BAD_NODE_ID_INVALID,
            Self::UnknownConditionType(_) => StatusCode::BAD_TYPE_DEFINITION_INVALID,
            Self::InvalidSource(_) | Self::NotANotifier(_) => StatusCode::BAD_SOURCE_NODE_ID_INVALID,
            Self::InvalidReferenceType(_) => StatusCode::BAD_REFERENCE_TYPE_ID_INVALID,
            Self::FieldNotFound { .. } => StatusCode::BAD_NO_MATCH,
            Self::TypeMismatch { .. } => StatusCode::BAD_TYPE_MISMATCH,
            Self::TransitionNotSupported(_) => StatusCode::BAD_NOT_SUPPORTED,
            Self::AlreadyInState(kind) => kind.already_set_status(),
            Self::Rejected { status, .. } => *status,
            Self::Backend(_) => StatusCode::BAD_INTERNAL_ERROR,
        }
    }
}

/// Parameters for materializing a condition node.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateConditionRequest {
    /// Condition type (e.g. `OffNormalAlarmType`).
    pub condition_type: NodeId,
    /// Browse name of the new instance.
    pub browse_name: QualifiedName,
    /// Condition source object.
    pub source: NodeId,
    /// Reference from the source to the condition; null keeps the condition
    /// out of the browsable address space.
    pub parent_reference_type: NodeId,
    /// Explicit node id, or null to let the store assign one.
    pub requested_id: NodeId,
}

/// Handler the node store invokes just before a two-state variable flips to true.
///
/// A non-good status aborts the transition: the variable is not flipped and no
/// event is emitted. Implementations run inline on the store's dispatch path
/// and must return quickly.
pub trait TwoStateHandler: Send + Sync {
    /// Called with the acting session (if any) and the condition being changed.
    fn on_entering_true(
        &self,
        store: &dyn NodeStore,
        session: Option<&SessionId>,
        condition: &NodeId,
    ) -> StatusCode;
}

/// Node store capability consumed by conditions.
///
/// # Safety Considerations
/// - Implementations must not hold internal locks while calling a
///   `TwoStateHandler`; handlers may call back into the store.
/// - Field writes are visible to subsequent reads immediately but are not
///   atomic with each other.
pub trait NodeStore: Send + Sync {
    /// Materialize a condition node and return its id.
    fn create_condition(&self, request: &CreateConditionRequest) -> Result<NodeId, StoreError>;

    /// Delete a node, optionally together with every reference touching it.
    fn delete_node(&self, id: &NodeId, delete_references: bool) -> Result<(), StoreError>;

    /// Write a top-level condition field.
    fn set_condition_field(
        &self,
        condition: &NodeId,
        field: &QualifiedName,
        value: &Variant,
    ) -> Result<(), StoreError>;

    /// Write a property of a variable-shaped field (e.g. `ActiveState/Id`).
    fn set_condition_variable_field_property(
        &self,
        condition: &NodeId,
        variable: &QualifiedName,
        property: &QualifiedName,
        value: &Variant,
    ) -> Result<(), StoreError>;

    /// Read a top-level condition field.
    fn read_condition_field(
        &self,
        condition: &NodeId,
        field: &QualifiedName,
    ) -> Result<Variant, StoreError>;

    /// Read a property of a variable-shaped field.
    fn read_condition_variable_field_property(
        &self,
        condition: &NodeId,
        variable: &QualifiedName,
        property: &QualifiedName,
    ) -> Result<Variant, StoreError>;

    /// Emit a condition event through `source`, snapshotting current field values.
    fn trigger_condition_event(
        &self,
        condition: &NodeId,
        source: &NodeId,
    ) -> Result<EventId, StoreError>;

    /// Install the handler for `kind` on `condition`, replacing any previous one.
    fn set_two_state_callback(
        &self,
        condition: &NodeId,
        source: &NodeId,
        remove_branch: bool,
        kind: TransitionKind,
        handler: Arc<dyn TwoStateHandler>,
    ) -> Result<(), StoreError>;

    /// Resolve the display name of a node.
    fn read_display_name(&self, id: &NodeId) -> Result<LocalizedText, StoreError>;
}
