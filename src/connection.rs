//! Connection to a hosting node store.
//!
//! A `Connection` pairs the node store with the callback table for every
//! condition created or wrapped through it. The table lives exactly as long as
//! the connection: it is created empty in `new` and cleared on drop, after
//! which any dispatcher still installed in the store becomes a no-op.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::dispatch::CallbackTable;
use crate::session::ConnectionId;
use crate::storage::NodeStore;

/// Handle to a node store plus connection-scoped callback state.
pub struct Connection {
    id: ConnectionId,
    store: Arc<dyn NodeStore>,
    callbacks: Arc<CallbackTable>,
}

impl Connection {
    /// Open a connection over `store` with an empty callback table.
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        let id = ConnectionId::new();
        debug!(connection = %id, "connection opened");
        Self {
            id,
            store,
            callbacks: Arc::new(CallbackTable::new()),
        }
    }

    /// Identity of this connection.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// The node store behind this connection.
    #[must_use]
    pub fn store(&self) -> &dyn NodeStore {
        self.store.as_ref()
    }

    /// Shared handle to the node store.
    #[must_use]
    pub fn store_handle(&self) -> Arc<dyn NodeStore> {
        Arc::clone(&self.store)
    }

    /// The connection-scoped callback table.
    #[must_use]
    pub fn callbacks(&self) -> &Arc<CallbackTable> {
        &self.callbacks
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("callbacks", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

impl Drop for Connection {
    fn drop(&mut self) {
        let registered = self.callbacks.len();
        self.callbacks.clear();
        debug!(connection = %self.id, registered, "connection closed; callback table cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{CallbackSlot, TransitionKind};
    use crate::node_id::NodeId;
    use crate::session::SessionId;
    use crate::status::StatusCode;
    use crate::storage::InMemoryNodeStore;

    #[test]
    fn test_connections_are_distinct() {
        let store: Arc<dyn NodeStore> = Arc::new(InMemoryNodeStore::new());
        let a = Connection::new(Arc::clone(&store));
        let b = Connection::new(store);
        assert_ne!(a, b);
        assert_eq!(a, a);
        assert!(a.callbacks().is_empty());
    }

    #[test]
    fn test_drop_clears_table() {
        let conn = Connection::new(Arc::new(InMemoryNodeStore::new()));
        let table = Arc::clone(conn.callbacks());
        table
            .set_slot(
                &NodeId::numeric(1, 1),
                TransitionKind::Acked,
                CallbackSlot {
                    source: NodeId::numeric(1, 2),
                    remove_branch: false,
                    callback: Arc::new(|_: Option<&SessionId>, _: &NodeId, _: bool| StatusCode::GOOD),
                },
            )
            .unwrap();
        assert_eq!(table.len(), 1);

        drop(conn);
        assert!(table.is_empty());
    }
}
