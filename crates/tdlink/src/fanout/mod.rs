//! Broadcast of unsolicited messages to update subscribers.
//!
//! Each subscriber owns a bounded mailbox. Publishing never blocks: when a
//! mailbox is full the configured [`OverflowPolicy`] decides whether the
//! oldest update is evicted or the subscriber is disconnected, and the
//! subscriber learns how many updates it missed through
//! [`RecvError::Lagged`].

#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use tdlink_config::OverflowPolicy;

use crate::envelope::Envelope;
use crate::error::DecodeError;

const FANOUT_TARGET: &str = "tdlink::fanout";

/// Identifier of a registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Numeric value, unique within one client.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An unsolicited message, shared by every subscriber that receives it.
#[derive(Debug, Clone)]
pub struct Update {
    sequence: u64,
    envelope: Arc<Envelope>,
}

impl Update {
    /// Position in native arrival order, starting at 1.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The message itself.
    #[must_use]
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Discriminator of the message.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.envelope.type_name()
    }

    /// Decodes the message into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Payload`] when the fields do not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        self.envelope.decode()
    }
}

/// Reasons a subscription produced no update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecvError {
    /// Updates were discarded because the subscriber fell behind.
    #[error("subscriber lagged behind and missed {0} updates")]
    Lagged(u64),
    /// The subscription is closed and fully drained.
    #[error("subscription is closed")]
    Closed,
    /// No update arrived before the deadline.
    #[error("timed out waiting for an update")]
    Timeout,
    /// No update is buffered right now.
    #[error("no update is buffered")]
    Empty,
}

#[derive(Debug, Default)]
struct MailboxState {
    buffer: VecDeque<Update>,
    lagged: u64,
    dropped: u64,
    closed: bool,
}

#[derive(Debug)]
struct Mailbox {
    id: SubscriptionId,
    state: Mutex<MailboxState>,
    ready: Condvar,
}

enum PushOutcome {
    Delivered,
    Evicted { first: bool },
    Disconnected,
    Skipped,
}

impl Mailbox {
    fn new(id: SubscriptionId, closed: bool) -> Self {
        Self {
            id,
            state: Mutex::new(MailboxState {
                closed,
                ..MailboxState::default()
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, update: Update, capacity: usize, policy: OverflowPolicy) -> PushOutcome {
        let mut state = self.lock();
        if state.closed {
            return PushOutcome::Skipped;
        }
        let outcome = if state.buffer.len() < capacity {
            state.buffer.push_back(update);
            PushOutcome::Delivered
        } else {
            state.lagged += 1;
            state.dropped += 1;
            match policy {
                OverflowPolicy::DropOldest => {
                    state.buffer.pop_front();
                    state.buffer.push_back(update);
                    PushOutcome::Evicted {
                        first: state.lagged == 1,
                    }
                }
                OverflowPolicy::Disconnect => {
                    state.closed = true;
                    PushOutcome::Disconnected
                }
            }
        };
        drop(state);
        self.ready.notify_all();
        outcome
    }

    fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    fn recv(&self, deadline: Option<Instant>) -> Result<Update, RecvError> {
        let mut state = self.lock();
        loop {
            if let Some(next) = take_next(&mut state) {
                return next;
            }
            match deadline {
                None => {
                    state = self
                        .ready
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(at) => {
                    let Some(remaining) = at.checked_duration_since(Instant::now()) else {
                        return Err(RecvError::Timeout);
                    };
                    let (guard, _) = self
                        .ready
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner);
                    state = guard;
                }
            }
        }
    }

    fn try_recv(&self) -> Result<Update, RecvError> {
        take_next(&mut self.lock()).unwrap_or(Err(RecvError::Empty))
    }
}

/// Next result for a subscriber, or `None` if it must wait.
///
/// An open mailbox reports a gap before the updates that follow it. A closed
/// mailbox drains what it holds, then reports the gap, then `Closed`.
fn take_next(state: &mut MailboxState) -> Option<Result<Update, RecvError>> {
    if !state.closed && state.lagged > 0 {
        return Some(Err(RecvError::Lagged(std::mem::take(&mut state.lagged))));
    }
    if let Some(update) = state.buffer.pop_front() {
        return Some(Ok(update));
    }
    if state.lagged > 0 {
        return Some(Err(RecvError::Lagged(std::mem::take(&mut state.lagged))));
    }
    state.closed.then_some(Err(RecvError::Closed))
}

#[derive(Debug, Default)]
struct HubState {
    subscribers: Vec<Arc<Mailbox>>,
    closed: bool,
}

/// Registry of subscribers and the sequence counter for updates.
#[derive(Debug)]
pub(crate) struct UpdateHub {
    state: RwLock<HubState>,
    sequence: AtomicU64,
    next_id: AtomicU64,
    capacity: usize,
    policy: OverflowPolicy,
}

impl UpdateHub {
    pub(crate) fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            sequence: AtomicU64::new(1),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            policy,
        }
    }

    /// Registers a subscriber. After [`Self::close`] the subscription is
    /// returned already closed.
    pub(crate) fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mailbox = Arc::new(Mailbox::new(id, state.closed));
        if !state.closed {
            state.subscribers.push(Arc::clone(&mailbox));
        }
        drop(state);
        debug!(target: FANOUT_TARGET, subscriber = %id, "subscriber registered");
        Subscription {
            mailbox,
            hub: Arc::downgrade(self),
        }
    }

    /// Removes and closes a subscriber. Returns whether it was registered.
    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let position = state.subscribers.iter().position(|mailbox| mailbox.id == id);
        let removed = position.map(|index| state.subscribers.remove(index));
        drop(state);
        removed.is_some_and(|mailbox| {
            mailbox.close();
            debug!(target: FANOUT_TARGET, subscriber = %id, "subscriber removed");
            true
        })
    }

    /// Broadcasts a message to every subscriber and returns how many
    /// received it.
    ///
    /// Only the receiver thread publishes, so sequence numbers follow native
    /// arrival order.
    pub(crate) fn publish(&self, envelope: Envelope) -> usize {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return 0;
        }
        let update = Update {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            envelope: Arc::new(envelope),
        };
        let mut delivered = 0;
        let mut disconnected = Vec::new();
        for mailbox in &state.subscribers {
            match mailbox.push(update.clone(), self.capacity, self.policy) {
                PushOutcome::Delivered => delivered += 1,
                PushOutcome::Evicted { first } => {
                    delivered += 1;
                    if first {
                        warn!(
                            target: FANOUT_TARGET,
                            subscriber = %mailbox.id,
                            capacity = self.capacity,
                            "subscriber buffer full, dropping oldest updates"
                        );
                    }
                }
                PushOutcome::Disconnected => {
                    warn!(
                        target: FANOUT_TARGET,
                        subscriber = %mailbox.id,
                        capacity = self.capacity,
                        "subscriber buffer full, disconnecting"
                    );
                    disconnected.push(mailbox.id);
                }
                PushOutcome::Skipped => {}
            }
        }
        drop(state);
        if !disconnected.is_empty() {
            let mut writable = self.state.write().unwrap_or_else(PoisonError::into_inner);
            writable
                .subscribers
                .retain(|mailbox| !disconnected.contains(&mailbox.id));
        }
        if delivered == 0 {
            debug!(
                target: FANOUT_TARGET,
                sequence = update.sequence,
                type_name = %update.type_name(),
                "update had no subscribers"
            );
        }
        delivered
    }

    /// Closes every subscription and stops further dispatch.
    pub(crate) fn close(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return;
        }
        state.closed = true;
        let subscribers = std::mem::take(&mut state.subscribers);
        drop(state);
        for mailbox in &subscribers {
            mailbox.close();
        }
        debug!(
            target: FANOUT_TARGET,
            subscribers = subscribers.len(),
            "update hub closed"
        );
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .len()
    }
}

/// Receiving end of the update stream.
///
/// Dropping the subscription unregisters it.
pub struct Subscription {
    mailbox: Arc<Mailbox>,
    hub: Weak<UpdateHub>,
}

impl Subscription {
    /// Identifier of this subscriber.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.mailbox.id
    }

    /// Blocks until the next update, a gap report, or closure.
    ///
    /// # Errors
    ///
    /// Returns [`RecvError::Lagged`] once after updates were discarded and
    /// [`RecvError::Closed`] when the stream has ended.
    pub fn recv(&self) -> Result<Update, RecvError> {
        self.mailbox.recv(None)
    }

    /// Like [`Self::recv`] but gives up after `timeout`.
    ///
    /// A timeout too large to represent as a deadline waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`RecvError::Timeout`] when the deadline passes, in addition
    /// to the errors of [`Self::recv`].
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Update, RecvError> {
        self.mailbox.recv(Instant::now().checked_add(timeout))
    }

    /// Returns a buffered update without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`RecvError::Empty`] when nothing is buffered, in addition to
    /// the errors of [`Self::recv`].
    pub fn try_recv(&self) -> Result<Update, RecvError> {
        self.mailbox.try_recv()
    }

    /// Blocking iterator that ends once the subscription is closed.
    ///
    /// Gap reports are yielded as `Err(RecvError::Lagged(n))`.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            subscription: self,
            finished: false,
        }
    }

    /// Total number of updates this subscriber has missed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.mailbox.lock().dropped
    }

    /// Whether the subscription will produce no further updates once drained.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.mailbox.lock().closed
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.mailbox.id)
            .finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.mailbox.id);
        }
    }
}

/// Iterator returned by [`Subscription::iter`].
#[derive(Debug)]
pub struct Iter<'a> {
    subscription: &'a Subscription,
    finished: bool,
}

impl Iterator for Iter<'_> {
    type Item = Result<Update, RecvError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.subscription.recv() {
            Err(RecvError::Closed) => {
                self.finished = true;
                None
            }
            other => Some(other),
        }
    }
}

impl<'a> IntoIterator for &'a Subscription {
    type Item = Result<Update, RecvError>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
