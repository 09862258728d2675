//! In-memory native client driven by test scripts.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;

use super::{NativeClient, NativeError};
use crate::envelope::EXTRA_KEY;

type Responder = dyn Fn(&Value) -> Vec<Value> + Send + Sync;
type Executor = dyn Fn(&Value) -> Option<Value> + Send + Sync;

/// Scriptable stand-in for the native library.
///
/// Clones share state, so a test keeps one handle while the client owns
/// another. Messages pushed with [`Self::push`] are returned by `receive` in
/// order; requests passed to `send` are recorded and may be answered
/// automatically by a responder.
#[derive(Clone, Default)]
pub struct ScriptedNative {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    inbox: Mutex<VecDeque<String>>,
    inbox_ready: Condvar,
    sent: Mutex<Vec<Value>>,
    sent_ready: Condvar,
    responder: Mutex<Option<Arc<Responder>>>,
    executor: Mutex<Option<Arc<Executor>>>,
    closed: AtomicBool,
}

impl fmt::Debug for ScriptedNative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedNative")
            .field("queued", &lock(&self.shared.inbox).len())
            .field("sent", &lock(&self.shared.sent).len())
            .field("closed", &self.shared.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ScriptedNative {
    /// Creates an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a message for the receiver.
    pub fn push(&self, message: &Value) {
        self.push_raw(message.to_string());
    }

    /// Queues raw text for the receiver, valid JSON or not.
    pub fn push_raw(&self, message: impl Into<String>) {
        lock(&self.shared.inbox).push_back(message.into());
        self.shared.inbox_ready.notify_all();
    }

    /// Requests received so far, in send order.
    #[must_use]
    pub fn sent(&self) -> Vec<Value> {
        lock(&self.shared.sent).clone()
    }

    /// Waits until at least `count` requests were sent.
    ///
    /// Returns `None` if the deadline passes first.
    #[must_use]
    pub fn wait_for_sent(&self, count: usize, timeout: Duration) -> Option<Vec<Value>> {
        let deadline = Instant::now().checked_add(timeout);
        let mut sent = lock(&self.shared.sent);
        while sent.len() < count {
            let remaining = time_left(deadline, timeout)?;
            let (guard, _) = self
                .shared
                .sent_ready
                .wait_timeout(sent, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            sent = guard;
        }
        Some(sent.clone())
    }

    /// Installs a function producing the messages queued in reply to each
    /// sent request.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    {
        *lock(&self.shared.responder) = Some(Arc::new(responder));
    }

    /// Installs the function answering synchronous `execute` calls.
    pub fn set_executor<F>(&self, executor: F)
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        *lock(&self.shared.executor) = Some(Arc::new(executor));
    }

    /// Ends the stream. Queued messages are still delivered first.
    pub fn shut_down(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.inbox_ready.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl NativeClient for ScriptedNative {
    fn send(&self, request: &str) -> Result<(), NativeError> {
        if self.is_closed() {
            return Err(NativeError::Closed);
        }
        let value: Value = serde_json::from_str(request).map_err(|error| NativeError::Transport {
            message: error.to_string(),
        })?;
        let responder = lock(&self.shared.responder).clone();
        lock(&self.shared.sent).push(value.clone());
        self.shared.sent_ready.notify_all();
        if let Some(respond) = responder {
            for reply in respond(&value) {
                self.push(&reply);
            }
        }
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<Option<String>, NativeError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut inbox = lock(&self.shared.inbox);
        loop {
            if let Some(message) = inbox.pop_front() {
                return Ok(Some(message));
            }
            if self.is_closed() {
                return Err(NativeError::Closed);
            }
            let Some(remaining) = time_left(deadline, timeout) else {
                return Ok(None);
            };
            let (guard, _) = self
                .shared
                .inbox_ready
                .wait_timeout(inbox, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            inbox = guard;
        }
    }

    fn execute(&self, request: &str) -> Result<Option<String>, NativeError> {
        let value: Value = serde_json::from_str(request).map_err(|error| NativeError::Transport {
            message: error.to_string(),
        })?;
        let executor = lock(&self.shared.executor).clone();
        Ok(executor
            .and_then(|run| run(&value))
            .map(|reply| reply.to_string()))
    }
}

/// Copies the correlation key of `request` onto `reply`.
#[must_use]
pub fn reply_to(request: &Value, mut reply: Value) -> Value {
    if let (Some(extra), Some(object)) = (request.get(EXTRA_KEY), reply.as_object_mut()) {
        object.insert(EXTRA_KEY.to_owned(), extra.clone());
    }
    reply
}

/// Time left before `deadline`; an unrepresentable deadline never passes.
fn time_left(deadline: Option<Instant>, timeout: Duration) -> Option<Duration> {
    deadline.map_or(Some(timeout), |at| at.checked_duration_since(Instant::now()))
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
