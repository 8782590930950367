//! Transition dispatcher.
//!
//! The node store calls a `TransitionDispatcher` on its own dispatch path,
//! just before a two-state variable flips to true. The dispatcher looks up the
//! callback registered for the condition and transition kind and returns the
//! callback's status, which the store treats as accept/reject.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Weak;

use tracing::{debug, info, warn};

use crate::node_id::NodeId;
use crate::session::SessionId;
use crate::status::StatusCode;
use crate::storage::{NodeStore, TwoStateHandler};

use super::table::{notify_hooks, CallbackTable};
use super::transition::TransitionKind;

const UNKNOWN_DISPLAY_NAME: &str = "<unknown>";

/// Two-state handler bound to one transition kind of one connection's table.
///
/// Holds the table weakly: once the connection is gone, dispatch is a no-op.
#[derive(Debug, Clone)]
pub struct TransitionDispatcher {
    kind: TransitionKind,
    table: Weak<CallbackTable>,
}

impl TransitionDispatcher {
    /// Create a dispatcher for `kind` over `table`.
    #[must_use]
    pub fn new(kind: TransitionKind, table: Weak<CallbackTable>) -> Self {
        Self { kind, table }
    }

    /// Transition kind this dispatcher serves.
    #[must_use]
    pub const fn kind(&self) -> TransitionKind {
        self.kind
    }

    /// Run the callback registered for `condition`, if any.
    ///
    /// Returns `GOOD` when there is nothing to run. A panicking callback is
    /// contained and reported as `BAD_INTERNAL_ERROR`.
    pub fn dispatch(
        &self,
        store: &dyn NodeStore,
        session: Option<&SessionId>,
        condition: &NodeId,
    ) -> StatusCode {
        let kind = self.kind;
        let display_name = store
            .read_display_name(condition)
            .map(|t| t.text)
            .unwrap_or_else(|_| UNKNOWN_DISPLAY_NAME.to_string());
        info!(
            transition = kind.label(),
            condition = %display_name,
            node_id = %condition,
            session = ?session,
            "{} entering true",
            kind.variable()
        );

        let Some(table) = self.table.upgrade() else {
            debug!(node_id = %condition, "connection closed; nothing to dispatch");
            return StatusCode::GOOD;
        };

        let slot = match table.slot(condition, kind) {
            Ok(Some(slot)) => slot,
            Ok(None) => {
                debug!(transition = kind.label(), node_id = %condition, "no callback registered");
                return StatusCode::GOOD;
            }
            Err(err) => {
                warn!(transition = kind.label(), node_id = %condition, "{err}");
                return StatusCode::BAD_INTERNAL_ERROR;
            }
        };

        let status = match panic::catch_unwind(AssertUnwindSafe(|| slot.invoke(session))) {
            Ok(status) => status,
            Err(_) => {
                warn!(transition = kind.label(), node_id = %condition, "transition callback panicked");
                return StatusCode::BAD_INTERNAL_ERROR;
            }
        };

        if status.is_good() {
            match table.hooks(condition) {
                Ok(Some(hooks)) => notify_hooks(hooks.as_ref(), kind, &slot.source, slot.remove_branch),
                Ok(None) => {}
                Err(err) => warn!(transition = kind.label(), node_id = %condition, "{err}"),
            }
        } else {
            debug!(transition = kind.label(), node_id = %condition, %status, "callback rejected transition");
        }

        status
    }
}

impl TwoStateHandler for TransitionDispatcher {
    fn on_entering_true(
        &self,
        store: &dyn NodeStore,
        session: Option<&SessionId>,
        condition: &NodeId,
    ) -> StatusCode {
        self.dispatch(store, session, condition)
    }
}
