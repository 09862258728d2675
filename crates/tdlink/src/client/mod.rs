//! The owned dispatcher instance.
//!
//! A [`Client`] owns the native handle, the correlation table, the update
//! hub and the receiver thread. Any number of threads may call through a
//! shared reference; each call blocks on its own single-use slot.
//!
//! # Example
//!
//! ```ignore
//! use tdlink::{Client, ClientOptions, Request, TdJsonClient};
//!
//! let client = Client::new(TdJsonClient::new()?, ClientOptions::default())?;
//! let updates = client.subscribe();
//! let reply = client.invoke(&Request::new("getAuthorizationState"))?;
//! client.close()?;
//! ```

mod options;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

pub use options::ClientOptions;

use crate::correlation::{CorrelationTable, Waiter, millis};
use crate::envelope::{CorrelationId, Envelope, Request};
use crate::error::InvokeError;
use crate::fanout::{Subscription, UpdateHub};
use crate::native::NativeClient;
use crate::receiver::ReceiverLoop;
use crate::typed::{FromEnvelope, Function};

/// Log target for client operations.
const CLIENT_TARGET: &str = "tdlink::client";

/// Dispatcher over one native JSON stream.
///
/// Dropping the client performs the same shutdown as [`Client::close`].
pub struct Client {
    native: Arc<dyn NativeClient>,
    table: Arc<CorrelationTable>,
    hub: Arc<UpdateHub>,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    options: ClientOptions,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Starts a client over `native` and spawns its receiver thread.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Spawn`] if the receiver thread cannot start.
    pub fn new<N>(native: N, options: ClientOptions) -> Result<Self, InvokeError>
    where
        N: NativeClient + 'static,
    {
        Self::from_shared(Arc::new(native), options)
    }

    /// Starts a client over an already shared native handle.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Spawn`] if the receiver thread cannot start.
    pub fn from_shared(
        native: Arc<dyn NativeClient>,
        options: ClientOptions,
    ) -> Result<Self, InvokeError> {
        let table = Arc::new(CorrelationTable::new());
        let hub = Arc::new(UpdateHub::new(
            options.update_buffer(),
            options.overflow_policy(),
        ));
        let closed = Arc::new(AtomicBool::new(false));
        let handle = ReceiverLoop::new(
            Arc::clone(&native),
            Arc::clone(&table),
            Arc::clone(&hub),
            Arc::clone(&closed),
            options.receive_timeout(),
        )
        .spawn()?;
        info!(
            target: CLIENT_TARGET,
            call_timeout_ms = millis(options.call_timeout()),
            update_buffer = options.update_buffer(),
            overflow_policy = %options.overflow_policy(),
            "client started"
        );
        Ok(Self {
            native,
            table,
            hub,
            closed,
            next_id: AtomicU64::new(1),
            options,
            receiver: Mutex::new(Some(handle)),
        })
    }

    /// Sends `request` and waits up to the default deadline for its reply.
    ///
    /// # Errors
    ///
    /// See [`Client::invoke_with_timeout`].
    pub fn invoke(&self, request: &Request) -> Result<Envelope, InvokeError> {
        self.invoke_with_timeout(request, self.options.call_timeout())
    }

    /// Sends `request` and waits up to `timeout` for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Protocol`] for an error reply,
    /// [`InvokeError::Timeout`] when no reply arrives in time and
    /// [`InvokeError::Closed`] when the client shuts down first.
    pub fn invoke_with_timeout(
        &self,
        request: &Request,
        timeout: Duration,
    ) -> Result<Envelope, InvokeError> {
        self.submit(request)?.wait_timeout(timeout)
    }

    /// Sends `request` without waiting for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Closed`] after shutdown, and encode or native
    /// errors when the request cannot be sent.
    pub fn submit(&self, request: &Request) -> Result<PendingCall, InvokeError> {
        if self.is_closed() {
            return Err(InvokeError::Closed);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let waiter = self.table.register(id, request.type_name())?;
        let call = PendingCall {
            id,
            waiter,
            table: Arc::clone(&self.table),
            timeout: self.options.call_timeout(),
            finished: false,
        };
        // Returning early drops `call`, which expires the entry.
        let wire = request.to_wire(Some(id))?;
        if let Err(error) = self.native.send(&wire) {
            warn!(
                target: CLIENT_TARGET,
                id,
                type_name = %request.type_name(),
                error = %error,
                "native send failed"
            );
            return Err(error.into());
        }
        debug!(
            target: CLIENT_TARGET,
            id,
            type_name = %request.type_name(),
            "request sent"
        );
        Ok(call)
    }

    /// Runs `request` synchronously, bypassing the receiver loop.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::EmptyResult`] when the native library produced
    /// nothing and [`InvokeError::Protocol`] for an error reply.
    pub fn execute(&self, request: &Request) -> Result<Envelope, InvokeError> {
        if self.is_closed() {
            return Err(InvokeError::Closed);
        }
        let wire = request.to_wire(None)?;
        let raw = self
            .native
            .execute(&wire)?
            .ok_or_else(|| InvokeError::EmptyResult {
                type_name: request.type_name().to_owned(),
            })?;
        Envelope::parse(raw)?.into_result()
    }

    /// Invokes a typed function and decodes its result.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Client::invoke`] plus [`InvokeError::Decode`]
    /// when the reply does not match `F::Output`.
    pub fn call<F: Function>(&self, function: &F) -> Result<F::Output, InvokeError> {
        self.call_with_timeout(function, self.options.call_timeout())
    }

    /// Like [`Client::call`] with an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`Client::call`].
    pub fn call_with_timeout<F: Function>(
        &self,
        function: &F,
        timeout: Duration,
    ) -> Result<F::Output, InvokeError> {
        let envelope = self.invoke_with_timeout(&function.to_request()?, timeout)?;
        Ok(F::Output::from_envelope(&envelope)?)
    }

    /// Executes a typed function synchronously and decodes its result.
    ///
    /// # Errors
    ///
    /// See [`Client::execute`].
    pub fn execute_function<F: Function>(&self, function: &F) -> Result<F::Output, InvokeError> {
        let envelope = self.execute(&function.to_request()?)?;
        Ok(F::Output::from_envelope(&envelope)?)
    }

    /// Registers a new update subscriber.
    ///
    /// After shutdown the returned subscription is already closed.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    /// Unregisters and closes `subscription`. Returns whether it was active.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.hub.unsubscribe(subscription.id())
    }

    /// Stops the receiver, fails pending calls with [`InvokeError::Closed`]
    /// and closes every subscription.
    ///
    /// Safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::ReceiverPanicked`] if the receiver thread
    /// panicked.
    pub fn close(&self) -> Result<(), InvokeError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(target: CLIENT_TARGET, "client closing");
        }
        let abandoned = self.table.close_all();
        self.hub.close();
        let handle = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(receiver) = handle else {
            return Ok(());
        };
        if receiver.join().is_err() {
            return Err(InvokeError::ReceiverPanicked);
        }
        info!(target: CLIENT_TARGET, abandoned, "client closed");
        Ok(())
    }

    /// Whether shutdown has begun.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of calls awaiting a reply.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.table.len()
    }

    /// Number of registered update subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    /// Options the client was started with.
    #[must_use]
    pub const fn options(&self) -> &ClientOptions {
        &self.options
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("closed", &self.is_closed())
            .field("pending_calls", &self.pending_calls())
            .field("subscribers", &self.subscriber_count())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            warn!(target: CLIENT_TARGET, error = %error, "client shutdown failed");
        }
    }
}

/// A sent request whose reply has not been collected yet.
///
/// Dropping it without waiting expires the call; a reply that arrives later
/// is routed to update subscribers.
#[derive(Debug)]
pub struct PendingCall {
    id: CorrelationId,
    waiter: Waiter,
    table: Arc<CorrelationTable>,
    timeout: Duration,
    finished: bool,
}

impl PendingCall {
    /// Correlation id stamped on the request.
    #[must_use]
    pub const fn id(&self) -> CorrelationId {
        self.id
    }

    /// Handle that cancels this call from another thread.
    #[must_use]
    pub fn canceller(&self) -> CallCanceller {
        CallCanceller {
            id: self.id,
            table: Arc::downgrade(&self.table),
        }
    }

    /// Waits up to the client's default deadline.
    ///
    /// # Errors
    ///
    /// See [`PendingCall::wait_timeout`].
    pub fn wait(self) -> Result<Envelope, InvokeError> {
        let timeout = self.timeout;
        self.wait_timeout(timeout)
    }

    /// Waits up to `timeout` for the reply.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Timeout`], [`InvokeError::Cancelled`],
    /// [`InvokeError::Closed`] or the protocol error carried by the reply.
    pub fn wait_timeout(mut self, timeout: Duration) -> Result<Envelope, InvokeError> {
        self.finished = true;
        if let Some(delivery) = self.waiter.wait(timeout) {
            return delivery.into_result(self.id);
        }
        if self.table.expire(self.id) {
            debug!(
                target: CLIENT_TARGET,
                id = self.id,
                timeout_ms = millis(timeout),
                "call timed out"
            );
            return Err(InvokeError::Timeout {
                id: self.id,
                timeout,
            });
        }
        // Resolved between the deadline and the expiry; the slot is filled
        // while the table lock is held, so the delivery is already there.
        self.waiter.take().map_or(
            Err(InvokeError::Timeout {
                id: self.id,
                timeout,
            }),
            |delivery| delivery.into_result(self.id),
        )
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if !self.finished && self.table.expire(self.id) {
            debug!(target: CLIENT_TARGET, id = self.id, "pending call abandoned");
        }
    }
}

/// Cancels a [`PendingCall`] without blocking.
#[derive(Debug, Clone)]
pub struct CallCanceller {
    id: CorrelationId,
    table: Weak<CorrelationTable>,
}

impl CallCanceller {
    /// Correlation id of the call.
    #[must_use]
    pub const fn id(&self) -> CorrelationId {
        self.id
    }

    /// Wakes the waiter with [`InvokeError::Cancelled`].
    ///
    /// Returns `false` when the call already completed; a reply arriving
    /// afterwards is routed to update subscribers.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .table
            .upgrade()
            .is_some_and(|table| table.cancel(self.id));
        if cancelled {
            debug!(target: CLIENT_TARGET, id = self.id, "call cancelled");
        }
        cancelled
    }
}
