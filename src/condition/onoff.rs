//! On/off alarm.
//!
//! An off-normal alarm with a single boolean active state. `set_active`
//! updates Message, Time, Retain and ActiveState, clears acknowledgment and
//! confirmation when the alarm goes inactive, then emits an event.

use std::ops::Deref;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::Connection;
use crate::dispatch::TransitionKind;
use crate::error::AlarmResult;
use crate::node_id::{NodeId, ObjectTypeId, QualifiedName, ReferenceTypeId};
use crate::session::SessionId;
use crate::status::StatusCode;
use crate::storage::EventId;
use crate::value::LocalizedText;

use super::condition::{Condition, ConditionParams};

const MESSAGE_ACTIVE: &str = "Alarm active";
const MESSAGE_INACTIVE: &str = "Alarm inactive";

/// Configuration for `OnOffCondition::create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnOffConditionConfig {
    /// Browse name of the condition.
    pub name: String,
    /// Reference exposing the condition below its source.
    pub parent_reference_type: NodeId,
    /// Severity written at construction.
    pub initial_severity: u16,
    /// SourceName written at construction, if set.
    pub source_name: Option<String>,
}

impl Default for OnOffConditionConfig {
    fn default() -> Self {
        Self {
            name: "OnOffCondition".to_string(),
            parent_reference_type: ReferenceTypeId::HAS_COMPONENT,
            initial_severity: 400,
            source_name: None,
        }
    }
}

/// Owning on/off alarm bound to one source object.
#[derive(Debug)]
pub struct OnOffCondition<'c> {
    condition: Condition<'c>,
    source: NodeId,
}

impl<'c> OnOffCondition<'c> {
    /// Create an off-normal alarm below `source` and write its initial fields:
    /// enabled, the configured severity, "Alarm inactive", not retained.
    ///
    /// # Errors
    /// `AlarmError::Creation` if the store refuses the node, or
    /// `AlarmError::FieldWrite` if an initial field cannot be written (the
    /// node is then deleted again).
    pub fn create(
        connection: &'c Connection,
        source: &NodeId,
        config: &OnOffConditionConfig,
    ) -> AlarmResult<Self> {
        let params = ConditionParams::new(
            ObjectTypeId::OFF_NORMAL_ALARM_TYPE,
            QualifiedName::new(0, config.name.clone()),
            source.clone(),
        )
        .with_parent_reference_type(config.parent_reference_type.clone());
        let condition = Condition::create(connection, &params)?;

        condition
            .set_variable_field("EnabledState", "Id", true)?
            .set_field("Severity", config.initial_severity)?
            .set_field("Message", LocalizedText::invariant(MESSAGE_INACTIVE))?
            .set_field("Retain", false)?;
        if let Some(source_name) = &config.source_name {
            condition.set_field("SourceName", source_name.as_str())?;
        }

        Ok(Self {
            condition,
            source: source.clone(),
        })
    }

    /// Source object the alarm was created for.
    #[must_use]
    pub fn source(&self) -> &NodeId {
        &self.source
    }

    /// Current ActiveState/Id as read from the store.
    ///
    /// # Errors
    /// `AlarmError::FieldWrite` if the store cannot read the field.
    pub fn is_active(&self) -> AlarmResult<bool> {
        let value = self.condition.variable_field("ActiveState", "Id")?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Switch the alarm on or off and emit an event through `source`.
    ///
    /// `message` replaces the default "Alarm active"/"Alarm inactive" text
    /// unless it is empty. Turning the alarm off also clears AckedState and
    /// ConfirmedState.
    ///
    /// The writes are not atomic: the first failing step aborts the rest,
    /// leaves earlier writes in place and skips the event.
    ///
    /// # Errors
    /// `AlarmError::FieldWrite` or `AlarmError::Trigger` from the failing step.
    pub fn set_active(
        &self,
        source: &NodeId,
        active: bool,
        message: Option<&str>,
    ) -> AlarmResult<EventId> {
        debug!(condition = %self.condition.id(), active, "set_active");

        let message = match message {
            Some(text) if !text.is_empty() => text,
            _ if active => MESSAGE_ACTIVE,
            _ => MESSAGE_INACTIVE,
        };
        self.condition
            .set_field("Message", LocalizedText::invariant(message))?
            .set_field("Time", Utc::now())?
            .set_field("Retain", active)?
            .set_variable_field("ActiveState", "Id", active)?;
        if !active {
            self.condition
                .set_variable_field("AckedState", "Id", false)?
                .set_variable_field("ConfirmedState", "Id", false)?;
        }

        self.condition.trigger(source)
    }

    /// Register the EnabledState callback for this alarm's source.
    ///
    /// # Errors
    /// `AlarmError::Registration` if the store refuses the handler.
    pub fn bind_enabled<F>(&self, remove_branch: bool, callback: F) -> AlarmResult<&Self>
    where
        F: Fn(Option<&SessionId>, &NodeId, bool) -> StatusCode + Send + Sync + 'static,
    {
        self.bind_transition(TransitionKind::Enabled, remove_branch, callback)
    }

    /// Register the AckedState callback for this alarm's source.
    ///
    /// # Errors
    /// `AlarmError::Registration` if the store refuses the handler.
    pub fn bind_acked<F>(&self, remove_branch: bool, callback: F) -> AlarmResult<&Self>
    where
        F: Fn(Option<&SessionId>, &NodeId, bool) -> StatusCode + Send + Sync + 'static,
    {
        self.bind_transition(TransitionKind::Acked, remove_branch, callback)
    }

    /// Register the ConfirmedState callback for this alarm's source.
    ///
    /// # Errors
    /// `AlarmError::Registration` if the store refuses the handler.
    pub fn bind_confirmed<F>(&self, remove_branch: bool, callback: F) -> AlarmResult<&Self>
    where
        F: Fn(Option<&SessionId>, &NodeId, bool) -> StatusCode + Send + Sync + 'static,
    {
        self.bind_transition(TransitionKind::Confirmed, remove_branch, callback)
    }

    /// Register the ActiveState callback for this alarm's source.
    ///
    /// # Errors
    /// `AlarmError::Registration` if the store refuses the handler.
    pub fn bind_active<F>(&self, remove_branch: bool, callback: F) -> AlarmResult<&Self>
    where
        F: Fn(Option<&SessionId>, &NodeId, bool) -> StatusCode + Send + Sync + 'static,
    {
        self.bind_transition(TransitionKind::Active, remove_branch, callback)
    }

    fn bind_transition<F>(&self, kind: TransitionKind, remove_branch: bool, callback: F) -> AlarmResult<&Self>
    where
        F: Fn(Option<&SessionId>, &NodeId, bool) -> StatusCode + Send + Sync + 'static,
    {
        self.condition
            .on_transition(kind, &self.source, remove_branch, callback)?;
        Ok(self)
    }

    /// Give up ownership of the node; see `Condition::release`.
    pub fn release(&mut self) -> NodeId {
        self.condition.release()
    }

    /// Unwrap into the underlying condition handle.
    #[must_use]
    pub fn into_condition(self) -> Condition<'c> {
        self.condition
    }
}

impl<'c> Deref for OnOffCondition<'c> {
    type Target = Condition<'c>;

    fn deref(&self) -> &Self::Target {
        &self.condition
    }
}
