//! Connection-scoped callback table.
//!
//! Maps a condition id to one optional callback slot per transition kind.
//! Registration and lookup are mutually exclusive through a single `RwLock`;
//! lookups hand out cloned slots so no caller ever sees a slot mid-update and
//! no user code runs while the lock is held. Registrations are additionally
//! serialized with each other, so storing a slot and installing it with the
//! node store happen as one step.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{AlarmError, AlarmResult};
use crate::node_id::NodeId;
use crate::session::SessionId;
use crate::status::StatusCode;
use crate::storage::StoreError;

use super::transition::TransitionKind;

/// User callback run just before a two-state variable becomes true.
///
/// Receives the acting session (if any), the slot's source and its
/// remove-branch flag. A non-good status rejects the transition.
pub type TransitionCallback =
    Arc<dyn Fn(Option<&SessionId>, &NodeId, bool) -> StatusCode + Send + Sync>;

/// Capability object notified after a transition callback accepted.
///
/// Every method defaults to a no-op; implement only the ones you need.
#[allow(unused_variables)]
pub trait ConditionHooks: Send + Sync {
    /// EnabledState is becoming true.
    fn on_enabled(&self, source: &NodeId, remove_branch: bool) {}
    /// AckedState is becoming true.
    fn on_acked(&self, source: &NodeId, remove_branch: bool) {}
    /// ConfirmedState is becoming true.
    fn on_confirmed(&self, source: &NodeId, remove_branch: bool) {}
    /// ActiveState is becoming true.
    fn on_active(&self, source: &NodeId, remove_branch: bool) {}
}

pub(crate) fn notify_hooks(
    hooks: &dyn ConditionHooks,
    kind: TransitionKind,
    source: &NodeId,
    remove_branch: bool,
) {
    match kind {
        TransitionKind::Enabled => hooks.on_enabled(source, remove_branch),
        TransitionKind::Acked => hooks.on_acked(source, remove_branch),
        TransitionKind::Confirmed => hooks.on_confirmed(source, remove_branch),
        TransitionKind::Active => hooks.on_active(source, remove_branch),
    }
}

/// A registered transition callback.
#[derive(Clone)]
pub struct CallbackSlot {
    /// Originating condition-source object.
    pub source: NodeId,
    /// Whether the transition should also clear a duplicated branch.
    pub remove_branch: bool,
    /// The user callback.
    pub callback: TransitionCallback,
}

impl CallbackSlot {
    /// Invoke the callback with this slot's source and remove-branch flag.
    #[must_use]
    pub fn invoke(&self, session: Option<&SessionId>) -> StatusCode {
        (self.callback)(session, &self.source, self.remove_branch)
    }
}

impl fmt::Debug for CallbackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSlot")
            .field("source", &self.source)
            .field("remove_branch", &self.remove_branch)
            .finish_non_exhaustive()
    }
}

/// Per-condition record: one slot per transition kind plus optional hooks.
#[derive(Clone, Default)]
pub struct ConditionCallbacks {
    slots: [Option<CallbackSlot>; TransitionKind::COUNT],
    hooks: Option<Arc<dyn ConditionHooks>>,
}

impl ConditionCallbacks {
    /// Slot for `kind`, if registered.
    #[must_use]
    pub fn slot(&self, kind: TransitionKind) -> Option<&CallbackSlot> {
        self.slots[kind.index()].as_ref()
    }

    /// Hooks installed for this condition.
    #[must_use]
    pub fn hooks(&self) -> Option<&Arc<dyn ConditionHooks>> {
        self.hooks.as_ref()
    }

    /// Returns true if no slot is filled and no hooks are installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_none() && self.slots.iter().all(Option::is_none)
    }
}

impl fmt::Debug for ConditionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionCallbacks")
            .field("slots", &self.slots)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

/// Callback table owned by one connection.
#[derive(Debug, Default)]
pub struct CallbackTable {
    entries: RwLock<HashMap<NodeId, ConditionCallbacks>>,
    registration: Mutex<()>,
}

fn lock_err(context: &'static str) -> AlarmError {
    AlarmError::internal(format!("poisoned callback table lock: {context}"))
}

impl CallbackTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `slot` and install it with the node store as one step.
    ///
    /// Registrations on this table run one at a time, so when `install` fails
    /// the slot put back is exactly the one this call replaced. Lookups do not
    /// wait for `install`; they see either the old or the new slot.
    ///
    /// # Errors
    /// `AlarmError::Registration` if `install` fails;
    /// `AlarmError::Internal` if a lock is poisoned.
    pub fn register<F>(
        &self,
        condition: &NodeId,
        kind: TransitionKind,
        slot: CallbackSlot,
        install: F,
    ) -> AlarmResult<()>
    where
        F: FnOnce() -> Result<(), StoreError>,
    {
        let _serial = self.registration.lock().map_err(|_| lock_err("register"))?;
        let previous = self.set_slot(condition, kind, slot)?;
        if let Err(err) = install() {
            self.restore_slot(condition, kind, previous)?;
            return Err(AlarmError::registration(kind, err));
        }
        Ok(())
    }

    /// Store (or overwrite) the slot for `kind`, creating the entry on first use.
    ///
    /// Returns the slot it replaced.
    ///
    /// # Errors
    /// `AlarmError::Internal` if the table lock is poisoned.
    pub fn set_slot(
        &self,
        condition: &NodeId,
        kind: TransitionKind,
        slot: CallbackSlot,
    ) -> AlarmResult<Option<CallbackSlot>> {
        let mut entries = self.entries.write().map_err(|_| lock_err("set_slot"))?;
        let record = entries.entry(condition.clone()).or_default();
        Ok(record.slots[kind.index()].replace(slot))
    }

    /// Put back a slot previously returned by `set_slot` (or clear it with `None`).
    ///
    /// An entry left with no slots and no hooks is removed.
    ///
    /// # Errors
    /// `AlarmError::Internal` if the table lock is poisoned.
    pub fn restore_slot(
        &self,
        condition: &NodeId,
        kind: TransitionKind,
        slot: Option<CallbackSlot>,
    ) -> AlarmResult<()> {
        let mut entries = self.entries.write().map_err(|_| lock_err("restore_slot"))?;
        if let Some(record) = entries.get_mut(condition) {
            record.slots[kind.index()] = slot;
            if record.is_empty() {
                entries.remove(condition);
            }
        }
        Ok(())
    }

    /// Clone of the slot for `kind`, if any.
    ///
    /// # Errors
    /// `AlarmError::Internal` if the table lock is poisoned.
    pub fn slot(&self, condition: &NodeId, kind: TransitionKind) -> AlarmResult<Option<CallbackSlot>> {
        let entries = self.entries.read().map_err(|_| lock_err("slot"))?;
        Ok(entries.get(condition).and_then(|r| r.slot(kind)).cloned())
    }

    /// Install hooks for a condition, replacing previous ones.
    ///
    /// # Errors
    /// `AlarmError::Internal` if the table lock is poisoned.
    pub fn set_hooks(&self, condition: &NodeId, hooks: Arc<dyn ConditionHooks>) -> AlarmResult<()> {
        let mut entries = self.entries.write().map_err(|_| lock_err("set_hooks"))?;
        entries.entry(condition.clone()).or_default().hooks = Some(hooks);
        Ok(())
    }

    /// Hooks installed for a condition.
    ///
    /// # Errors
    /// `AlarmError::Internal` if the table lock is poisoned.
    pub fn hooks(&self, condition: &NodeId) -> AlarmResult<Option<Arc<dyn ConditionHooks>>> {
        let entries = self.entries.read().map_err(|_| lock_err("hooks"))?;
        Ok(entries.get(condition).and_then(|r| r.hooks.clone()))
    }

    /// Snapshot of a condition's record.
    ///
    /// # Errors
    /// `AlarmError::Internal` if the table lock is poisoned.
    pub fn get(&self, condition: &NodeId) -> AlarmResult<Option<ConditionCallbacks>> {
        let entries = self.entries.read().map_err(|_| lock_err("get"))?;
        Ok(entries.get(condition).cloned())
    }

    /// Remove a condition's record.
    ///
    /// # Errors
    /// `AlarmError::Internal` if the table lock is poisoned.
    pub fn remove(&self, condition: &NodeId) -> AlarmResult<Option<ConditionCallbacks>> {
        let mut entries = self.entries.write().map_err(|_| lock_err("remove"))?;
        Ok(entries.remove(condition))
    }

    /// Drop every record. Called when the owning connection goes away.
    pub fn clear(&self) {
        match self.entries.write() {
            Ok(mut entries) => entries.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    /// Number of conditions with a record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns true if no condition has a record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
