//! Event subscription streams.
//!
//! Each `InMemoryNodeStore::subscribe` call gets its own bounded channel;
//! `EventStream` is the receiving end.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::error::{AlarmError, AlarmResult};

use super::event::ConditionEvent;

/// A subscription stream of emitted condition events.
///
/// The store never blocks on a slow stream: events that do not fit in the
/// stream's buffer are dropped and counted by the store. Dropping the stream
/// unsubscribes it on the next emission.
#[derive(Debug)]
pub struct EventStream {
    rx: Receiver<ConditionEvent>,
}

impl EventStream {
    pub(crate) fn new(rx: Receiver<ConditionEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next event (blocking).
    ///
    /// # Errors
    /// `AlarmError::Disconnected` once the store is gone and the buffer is empty.
    pub fn recv(&self) -> AlarmResult<ConditionEvent> {
        self.rx.recv().map_err(|_| AlarmError::Disconnected)
    }

    /// Receive the next event with a timeout.
    ///
    /// # Errors
    /// `AlarmError::Timeout` if nothing arrives in time, or
    /// `AlarmError::Disconnected` once the store is gone and the buffer is empty.
    pub fn recv_timeout(&self, timeout: Duration) -> AlarmResult<ConditionEvent> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => AlarmError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => AlarmError::Disconnected,
        })
    }

    /// Receive an already-queued event, if any.
    ///
    /// # Errors
    /// `AlarmError::Disconnected` once the store is gone and the buffer is empty.
    pub fn try_recv(&self) -> AlarmResult<Option<ConditionEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(AlarmError::Disconnected),
        }
    }

    /// Number of events waiting in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true if no events are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
