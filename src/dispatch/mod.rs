//! Two-state transition callbacks.
//!
//! A connection owns one `CallbackTable`. Registering a callback stores a slot
//! in the table and installs a `TransitionDispatcher` with the node store; the
//! store later calls the dispatcher just before the variable flips to true.

mod dispatcher;
mod table;
mod transition;

pub use dispatcher::TransitionDispatcher;
pub use table::{CallbackSlot, CallbackTable, ConditionCallbacks, ConditionHooks, TransitionCallback};
pub use transition::{TransitionKind, ALL_TRANSITIONS};
