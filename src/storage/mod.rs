//! Node store contract and the in-memory reference store.
//!
//! The node store is an external collaborator: it owns nodes, field values,
//! event emission and the two-state variable state machine. Conditions only
//! talk to it through the `NodeStore` trait.

mod event;
mod memory;
mod stream;
mod traits;

pub use event::{ConditionEvent, EventId};
pub use memory::{InMemoryNodeStore, NodeStoreConfig, Reference};
pub use stream::EventStream;
pub use traits::{CreateConditionRequest, NodeStore, StoreError, TwoStateHandler};
