//! # ua-alarms - Alarms & Conditions over an abstract node store
//!
//! Condition objects attached to a server's node graph, with callbacks that
//! gate the two-state transitions of an alarm (enabled, acknowledged,
//! confirmed, active).
//!
//! ## Core Concepts
//!
//! - **Connection**: a node store handle plus the callback table of every
//!   condition made through it
//! - **Condition**: a handle to one condition node; owning handles delete the
//!   node when dropped unless released
//! - **Transition callback**: user code run just before a two-state variable
//!   becomes true; a bad status rejects the transition
//! - **OnOffCondition**: an off-normal alarm with a single active flag
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ua_alarms::{Connection, InMemoryNodeStore, OnOffCondition, OnOffConditionConfig, StatusCode};
//!
//! let store = Arc::new(InMemoryNodeStore::new());
//! let pump = store.add_object("Pump")?;
//! store.set_event_notifier(&pump, true)?;
//!
//! let conn = Connection::new(store.clone());
//! let alarm = OnOffCondition::create(&conn, &pump, &OnOffConditionConfig::default())?;
//! alarm.bind_acked(false, |session, source, _remove_branch| {
//!     println!("{source} acknowledged by {session:?}");
//!     StatusCode::GOOD
//! })?;
//!
//! alarm.set_active(&pump, true, None)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod node_id;
pub mod session;
pub mod status;
pub mod value;

// Node store, callbacks and conditions
pub mod condition;
pub mod connection;
pub mod dispatch;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use condition::{Condition, ConditionParams, OnOffCondition, OnOffConditionConfig};
pub use connection::Connection;
pub use dispatch::{
    CallbackSlot, CallbackTable, ConditionCallbacks, ConditionHooks, TransitionCallback,
    TransitionDispatcher, TransitionKind, ALL_TRANSITIONS,
};
pub use error::{AlarmError, AlarmResult};
pub use node_id::{Identifier, NodeId, ObjectId, ObjectTypeId, QualifiedName, ReferenceTypeId};
pub use session::{ConnectionId, SessionId};
pub use status::StatusCode;
pub use storage::{
    ConditionEvent, CreateConditionRequest, EventId, EventStream, InMemoryNodeStore, NodeStore,
    NodeStoreConfig, Reference, StoreError, TwoStateHandler,
};
pub use value::{LocalizedText, Variant, VariantKind};
