//! Table of in-flight calls keyed by correlation id.
//!
//! Each registered call owns a single-slot channel. Whoever removes the entry
//! (the receiver fulfilling it, the waiter expiring it, a canceller, or
//! shutdown) is the only party that may deliver into that slot, so a call is
//! resolved exactly once.


use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::envelope::{CorrelationId, Envelope};
use crate::error::InvokeError;

const CORRELATION_TARGET: &str = "tdlink::correlation";

/// Outcome delivered to a waiting caller.
#[derive(Debug)]
pub(crate) enum Delivery {
    /// A reply arrived.
    Reply(Envelope),
    /// An error envelope arrived for the call.
    Failure {
        error: InvokeError,
        envelope: Envelope,
    },
    /// The call was cancelled by an external signal.
    Cancelled,
    /// The client shut down.
    Closed,
}

impl Delivery {
    /// Recovers the message carried by a delivery that found no waiter.
    pub(crate) fn into_envelope(self) -> Option<Envelope> {
        match self {
            Self::Reply(envelope) | Self::Failure { envelope, .. } => Some(envelope),
            Self::Cancelled | Self::Closed => None,
        }
    }

    pub(crate) fn into_result(self, id: CorrelationId) -> Result<Envelope, InvokeError> {
        match self {
            Self::Reply(envelope) => Ok(envelope),
            Self::Failure { error, .. } => Err(error),
            Self::Cancelled => Err(InvokeError::Cancelled { id }),
            Self::Closed => Err(InvokeError::Closed),
        }
    }
}

/// Receiving half of a registered call.
#[derive(Debug)]
pub(crate) struct Waiter {
    slot: Receiver<Delivery>,
}

impl Waiter {
    /// Blocks for a delivery. `None` means the deadline passed.
    pub(crate) fn wait(&self, timeout: Duration) -> Option<Delivery> {
        match self.slot.recv_timeout(timeout) {
            Ok(delivery) => Some(delivery),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Delivery::Closed),
        }
    }

    /// Takes a delivery that is already in the slot.
    pub(crate) fn take(&self) -> Option<Delivery> {
        match self.slot.try_recv() {
            Ok(delivery) => Some(delivery),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Delivery::Closed),
        }
    }
}

#[derive(Debug)]
struct PendingEntry {
    slot: SyncSender<Delivery>,
    created: Instant,
    type_name: String,
}

#[derive(Debug, Default)]
struct TableState {
    entries: HashMap<CorrelationId, PendingEntry>,
    closed: bool,
}

/// Map from correlation id to the slot of the call awaiting it.
#[derive(Debug, Default)]
pub(crate) struct CorrelationTable {
    state: Mutex<TableState>,
}

impl CorrelationTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a fresh slot under `id`.
    pub(crate) fn register(
        &self,
        id: CorrelationId,
        type_name: &str,
    ) -> Result<Waiter, InvokeError> {
        let (slot, receiver) = mpsc::sync_channel(1);
        let mut state = self.lock();
        if state.closed {
            return Err(InvokeError::Closed);
        }
        if state.entries.contains_key(&id) {
            return Err(InvokeError::DuplicateCorrelation { id });
        }
        state.entries.insert(
            id,
            PendingEntry {
                slot,
                created: Instant::now(),
                type_name: type_name.to_owned(),
            },
        );
        Ok(Waiter { slot: receiver })
    }

    /// Delivers to the call registered under `id` and returns its latency.
    ///
    /// Hands the delivery back when no call is waiting on `id`.
    pub(crate) fn fulfill(
        &self,
        id: CorrelationId,
        delivery: Delivery,
    ) -> Result<Duration, Delivery> {
        let mut state = self.lock();
        let Some(entry) = state.entries.remove(&id) else {
            return Err(delivery);
        };
        // The slot holds one message and nobody else can reach it now, so
        // this never blocks. A waiter that already went away is ignored.
        drop(entry.slot.try_send(delivery));
        Ok(entry.created.elapsed())
    }

    /// Forgets a call whose waiter gave up. Returns whether it was live.
    pub(crate) fn expire(&self, id: CorrelationId) -> bool {
        self.lock().entries.remove(&id).is_some()
    }

    /// Removes a live call and wakes its waiter with `Cancelled`.
    pub(crate) fn cancel(&self, id: CorrelationId) -> bool {
        let mut state = self.lock();
        let Some(entry) = state.entries.remove(&id) else {
            return false;
        };
        drop(entry.slot.try_send(Delivery::Cancelled));
        true
    }

    /// Fails every live call with `Closed` and refuses new registrations.
    ///
    /// Returns the number of calls abandoned.
    pub(crate) fn close_all(&self) -> usize {
        let mut state = self.lock();
        state.closed = true;
        let abandoned = state.entries.len();
        for (id, entry) in state.entries.drain() {
            debug!(
                target: CORRELATION_TARGET,
                id,
                type_name = %entry.type_name,
                age_ms = millis(entry.created.elapsed()),
                "abandoning pending call"
            );
            drop(entry.slot.try_send(Delivery::Closed));
        }
        abandoned
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: CorrelationId) -> bool {
        self.lock().entries.contains_key(&id)
    }
}

/// Whole milliseconds in `duration`, saturating.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
