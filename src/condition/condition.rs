//! Condition handle.
//!
//! A `Condition` wraps one condition node in the store. Handles made by
//! `create` own their node and delete it (with every reference) when dropped;
//! handles made by `wrap_existing` never delete anything. `release` disarms
//! the deletion and hands the node id to the caller.

use std::fmt;
use std::mem;
use std::sync::Arc;

use tracing::debug;

use crate::connection::Connection;
use crate::dispatch::{CallbackSlot, ConditionHooks, TransitionDispatcher, TransitionKind};
use crate::error::{AlarmError, AlarmResult};
use crate::node_id::{NodeId, QualifiedName};
use crate::session::SessionId;
use crate::status::StatusCode;
use crate::storage::{CreateConditionRequest, EventId, TwoStateHandler};
use crate::value::Variant;

/// Parameters for `Condition::create`.
#[derive(Clone)]
pub struct ConditionParams {
    /// Condition type, e.g. `ObjectTypeId::OFF_NORMAL_ALARM_TYPE`.
    pub condition_type: NodeId,
    /// Browse name of the new condition.
    pub browse_name: QualifiedName,
    /// Object the condition is about.
    pub source: NodeId,
    /// Reference from `source` to the condition. Null (the default) keeps the
    /// condition out of the browsable address space.
    pub parent_reference_type: NodeId,
    /// Explicit node id; null (the default) lets the store assign one.
    pub requested_id: NodeId,
    /// Hooks notified after accepted transitions.
    pub hooks: Option<Arc<dyn ConditionHooks>>,
}

impl ConditionParams {
    /// Parameters with no parent reference, a store-assigned id and no hooks.
    pub fn new(
        condition_type: NodeId,
        browse_name: impl Into<QualifiedName>,
        source: NodeId,
    ) -> Self {
        Self {
            condition_type,
            browse_name: browse_name.into(),
            source,
            parent_reference_type: NodeId::null(),
            requested_id: NodeId::null(),
            hooks: None,
        }
    }

    /// Expose the condition below its source through `reference_type`.
    #[must_use]
    pub fn with_parent_reference_type(mut self, reference_type: NodeId) -> Self {
        self.parent_reference_type = reference_type;
        self
    }

    /// Ask the store for a specific node id.
    #[must_use]
    pub fn with_requested_id(mut self, id: NodeId) -> Self {
        self.requested_id = id;
        self
    }

    /// Install hooks on the created condition.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn ConditionHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    fn request(&self) -> CreateConditionRequest {
        CreateConditionRequest {
            condition_type: self.condition_type.clone(),
            browse_name: self.browse_name.clone(),
            source: self.source.clone(),
            parent_reference_type: self.parent_reference_type.clone(),
            requested_id: self.requested_id.clone(),
        }
    }
}

impl fmt::Debug for ConditionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionParams")
            .field("condition_type", &self.condition_type)
            .field("browse_name", &self.browse_name)
            .field("source", &self.source)
            .field("parent_reference_type", &self.parent_reference_type)
            .field("requested_id", &self.requested_id)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

/// Handle to a condition node, bound to the connection it was made through.
///
/// Move-only. A second handle over the same node is made with
/// `wrap_existing`, which never owns.
pub struct Condition<'c> {
    connection: &'c Connection,
    id: NodeId,
    owns: bool,
}

impl<'c> Condition<'c> {
    /// Materialize a new condition node and take ownership of it.
    ///
    /// # Errors
    /// `AlarmError::Creation` if the store rejects the type, source, parent
    /// reference type or requested id.
    pub fn create(connection: &'c Connection, params: &ConditionParams) -> AlarmResult<Self> {
        let id = connection
            .store()
            .create_condition(&params.request())
            .map_err(AlarmError::creation)?;
        let condition = Self {
            connection,
            id,
            owns: true,
        };
        if let Some(hooks) = &params.hooks {
            condition.set_hooks(Arc::clone(hooks))?;
        }
        debug!(condition = %condition.id, browse_name = %params.browse_name, "condition created");
        Ok(condition)
    }

    /// Wrap an existing condition node without taking ownership.
    ///
    /// The id is not validated against the store.
    #[must_use]
    pub fn wrap_existing(connection: &'c Connection, id: NodeId) -> Self {
        Self {
            connection,
            id,
            owns: false,
        }
    }

    /// Connection this condition was made through.
    #[must_use]
    pub fn connection(&self) -> &'c Connection {
        self.connection
    }

    /// Node id; null after `release`.
    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Whether dropping this handle deletes the node.
    #[must_use]
    pub fn owns(&self) -> bool {
        self.owns && !self.id.is_null()
    }

    /// Write a top-level field such as `Message` or `Severity`.
    ///
    /// # Errors
    /// `AlarmError::FieldWrite` if the field is unknown or the value has the
    /// wrong shape.
    pub fn set_field(
        &self,
        field: impl Into<QualifiedName>,
        value: impl Into<Variant>,
    ) -> AlarmResult<&Self> {
        let field = field.into();
        self.connection
            .store()
            .set_condition_field(&self.id, &field, &value.into())
            .map_err(|e| AlarmError::field_write(field.to_string(), e))?;
        Ok(self)
    }

    /// Write a property of a variable-shaped field, e.g. `ActiveState`/`Id`.
    ///
    /// # Errors
    /// `AlarmError::FieldWrite` as for `set_field`.
    pub fn set_variable_field(
        &self,
        variable: impl Into<QualifiedName>,
        property: impl Into<QualifiedName>,
        value: impl Into<Variant>,
    ) -> AlarmResult<&Self> {
        let variable = variable.into();
        let property = property.into();
        self.connection
            .store()
            .set_condition_variable_field_property(&self.id, &variable, &property, &value.into())
            .map_err(|e| AlarmError::field_write(format!("{variable}/{property}"), e))?;
        Ok(self)
    }

    /// Read a top-level field back from the store.
    ///
    /// # Errors
    /// `AlarmError::FieldWrite` if the field is unknown to the condition type.
    pub fn field(&self, field: impl Into<QualifiedName>) -> AlarmResult<Variant> {
        let field = field.into();
        self.connection
            .store()
            .read_condition_field(&self.id, &field)
            .map_err(|e| AlarmError::field_write(field.to_string(), e))
    }

    /// Read a property of a variable-shaped field back from the store.
    ///
    /// # Errors
    /// `AlarmError::FieldWrite` as for `field`.
    pub fn variable_field(
        &self,
        variable: impl Into<QualifiedName>,
        property: impl Into<QualifiedName>,
    ) -> AlarmResult<Variant> {
        let variable = variable.into();
        let property = property.into();
        self.connection
            .store()
            .read_condition_variable_field_property(&self.id, &variable, &property)
            .map_err(|e| AlarmError::field_write(format!("{variable}/{property}"), e))
    }

    /// Emit a condition event through `source`.
    ///
    /// The store reads field values at emission time, so call this after the
    /// relevant writes.
    ///
    /// # Errors
    /// `AlarmError::Trigger` if `source` is not a notifier for this condition.
    pub fn trigger(&self, source: &NodeId) -> AlarmResult<EventId> {
        self.connection
            .store()
            .trigger_condition_event(&self.id, source)
            .map_err(|e| AlarmError::trigger(&self.id, e))
    }

    /// Give up ownership and return the node id.
    ///
    /// The handle is left with a null id; a second call returns null.
    pub fn release(&mut self) -> NodeId {
        self.owns = false;
        mem::replace(&mut self.id, NodeId::null())
    }

    /// Register the callback run before EnabledState becomes true.
    ///
    /// # Errors
    /// `AlarmError::Registration` if the store refuses the handler.
    pub fn on_enabled<F>(&self, source: &NodeId, remove_branch: bool, callback: F) -> AlarmResult<()>
    where
        F: Fn(Option<&SessionId>, &NodeId, bool) -> StatusCode + Send + Sync + 'static,
    {
        self.on_transition(TransitionKind::Enabled, source, remove_branch, callback)
    }

    /// Register the callback run before AckedState becomes true.
    ///
    /// # Errors
    /// `AlarmError::Registration` if the store refuses the handler.
    pub fn on_acked<F>(&self, source: &NodeId, remove_branch: bool, callback: F) -> AlarmResult<()>
    where
        F: Fn(Option<&SessionId>, &NodeId, bool) -> StatusCode + Send + Sync + 'static,
    {
        self.on_transition(TransitionKind::Acked, source, remove_branch, callback)
    }

    /// Register the callback run before ConfirmedState becomes true.
    ///
    /// # Errors
    /// `AlarmError::Registration` if the store refuses the handler.
    pub fn on_confirmed<F>(&self, source: &NodeId, remove_branch: bool, callback: F) -> AlarmResult<()>
    where
        F: Fn(Option<&SessionId>, &NodeId, bool) -> StatusCode + Send + Sync + 'static,
    {
        self.on_transition(TransitionKind::Confirmed, source, remove_branch, callback)
    }

    /// Register the callback run before ActiveState becomes true.
    ///
    /// # Errors
    /// `AlarmError::Registration` if the store refuses the handler.
    pub fn on_active<F>(&self, source: &NodeId, remove_branch: bool, callback: F) -> AlarmResult<()>
    where
        F: Fn(Option<&SessionId>, &NodeId, bool) -> StatusCode + Send + Sync + 'static,
    {
        self.on_transition(TransitionKind::Active, source, remove_branch, callback)
    }

    /// Register `callback` for `kind`, replacing any earlier one.
    ///
    /// The slot is stored in the connection's table and a dispatcher is
    /// installed with the store for `(source, remove_branch, kind)`, as one
    /// step with respect to other registrations on the same connection. If
    /// the store refuses, the previous slot is put back.
    ///
    /// # Errors
    /// `AlarmError::Registration` if the store refuses the handler;
    /// `AlarmError::Internal` if the callback table is poisoned.
    pub fn on_transition<F>(
        &self,
        kind: TransitionKind,
        source: &NodeId,
        remove_branch: bool,
        callback: F,
    ) -> AlarmResult<()>
    where
        F: Fn(Option<&SessionId>, &NodeId, bool) -> StatusCode + Send + Sync + 'static,
    {
        let table = self.connection.callbacks();
        let slot = CallbackSlot {
            source: source.clone(),
            remove_branch,
            callback: Arc::new(callback),
        };
        let handler: Arc<dyn TwoStateHandler> =
            Arc::new(TransitionDispatcher::new(kind, Arc::downgrade(table)));
        let store = self.connection.store();
        table.register(&self.id, kind, slot, || {
            store.set_two_state_callback(&self.id, source, remove_branch, kind, handler)
        })?;

        debug!(
            condition = %self.id,
            transition = kind.label(),
            source = %source,
            remove_branch,
            "transition callback registered"
        );
        Ok(())
    }

    /// Install hooks notified after this condition's callbacks accept.
    ///
    /// # Errors
    /// `AlarmError::Internal` if the callback table is poisoned.
    pub fn set_hooks(&self, hooks: Arc<dyn ConditionHooks>) -> AlarmResult<()> {
        self.connection.callbacks().set_hooks(&self.id, hooks)
    }
}

impl fmt::Debug for Condition<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("connection", &self.connection.id())
            .field("id", &self.id)
            .field("owns", &self.owns)
            .finish()
    }
}

impl PartialEq for Condition<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.connection.id() == other.connection.id() && self.id == other.id
    }
}

impl Eq for Condition<'_> {}

impl Drop for Condition<'_> {
    fn drop(&mut self) {
        if !self.owns() {
            return;
        }
        match self.connection.store().delete_node(&self.id, true) {
            Ok(()) => debug!(condition = %self.id, "condition deleted"),
            Err(err) => debug!(condition = %self.id, error = %err, "condition delete failed; ignored"),
        }
    }
}
