//! The single reader of the native stream.
//!
//! The loop pulls one message at a time, parses only its header, and routes
//! it either to the call waiting on its correlation id or to the update
//! subscribers. Nothing else ever calls `receive` on the native client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::correlation::{CorrelationTable, Delivery, millis};
use crate::envelope::{CorrelationId, Envelope};
use crate::error::InvokeError;
use crate::fanout::UpdateHub;
use crate::native::{NativeClient, NativeError};

/// Log target for receiver loop events.
pub(crate) const RECEIVER_TARGET: &str = "tdlink::receiver";

const THREAD_NAME: &str = "tdlink-receiver";
const ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Where a message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    /// Delivered to the waiting call.
    Reply { id: CorrelationId },
    /// Delivered to the waiting call as a failure.
    Failure { id: CorrelationId },
    /// Broadcast to this many subscribers.
    Update { delivered: usize },
    /// Not a valid envelope; skipped.
    Malformed,
}

pub(crate) struct ReceiverLoop {
    native: Arc<dyn NativeClient>,
    table: Arc<CorrelationTable>,
    hub: Arc<UpdateHub>,
    shutdown: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl ReceiverLoop {
    pub(crate) const fn new(
        native: Arc<dyn NativeClient>,
        table: Arc<CorrelationTable>,
        hub: Arc<UpdateHub>,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            native,
            table,
            hub,
            shutdown,
            poll_interval,
        }
    }

    /// Starts the loop on its own named thread.
    pub(crate) fn spawn(self) -> Result<JoinHandle<()>, InvokeError> {
        thread::Builder::new()
            .name(THREAD_NAME.to_owned())
            .spawn(move || self.run())
            .map_err(|source| InvokeError::Spawn {
                source: Arc::new(source),
            })
    }

    fn run(self) {
        info!(
            target: RECEIVER_TARGET,
            poll_ms = millis(self.poll_interval),
            "receiver loop started"
        );
        let mut last_error = None::<NativeError>;
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.native.receive(self.poll_interval) {
                Ok(Some(raw)) => {
                    last_error = None;
                    self.route(raw);
                }
                Ok(None) => {}
                Err(NativeError::Closed) => {
                    info!(target: RECEIVER_TARGET, "native stream closed");
                    self.shutdown.store(true, Ordering::SeqCst);
                    self.table.close_all();
                    self.hub.close();
                    break;
                }
                Err(error) => {
                    if last_error.as_ref() != Some(&error) {
                        warn!(
                            target: RECEIVER_TARGET,
                            error = %error,
                            "native receive failed"
                        );
                    }
                    last_error = Some(error);
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }
        debug!(target: RECEIVER_TARGET, "receiver loop stopped");
    }

    /// Routes one raw message to its waiter or to the subscribers.
    pub(crate) fn route(&self, raw: String) -> Route {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(
                    target: RECEIVER_TARGET,
                    error = %error,
                    "skipping malformed message"
                );
                return Route::Malformed;
            }
        };
        let Some(id) = envelope.correlation_id() else {
            return self.broadcast(envelope);
        };
        let delivery = into_delivery(envelope);
        let failed = matches!(delivery, Delivery::Failure { .. });
        match self.table.fulfill(id, delivery) {
            Ok(latency) => {
                debug!(
                    target: RECEIVER_TARGET,
                    id,
                    failed,
                    latency_ms = millis(latency),
                    "reply delivered"
                );
                if failed {
                    Route::Failure { id }
                } else {
                    Route::Reply { id }
                }
            }
            Err(unclaimed) => {
                debug!(
                    target: RECEIVER_TARGET,
                    id,
                    "no caller waiting, treating reply as update"
                );
                unclaimed
                    .into_envelope()
                    .map_or(Route::Update { delivered: 0 }, |envelope| {
                        self.broadcast(envelope)
                    })
            }
        }
    }

    fn broadcast(&self, envelope: Envelope) -> Route {
        Route::Update {
            delivered: self.hub.publish(envelope),
        }
    }
}

fn into_delivery(envelope: Envelope) -> Delivery {
    match envelope.error() {
        None => Delivery::Reply(envelope),
        Some(Ok(error)) => Delivery::Failure {
            error: error.into(),
            envelope,
        },
        Some(Err(error)) => Delivery::Failure {
            error: error.into(),
            envelope,
        },
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use tdlink_config::OverflowPolicy;

    use super::*;
    use crate::native::MockNativeClient;

    struct Parts {
        receiver: ReceiverLoop,
        table: Arc<CorrelationTable>,
        hub: Arc<UpdateHub>,
    }

    #[fixture]
    fn parts() -> Parts {
        let table = Arc::new(CorrelationTable::new());
        let hub = Arc::new(UpdateHub::new(8, OverflowPolicy::DropOldest));
        let receiver = ReceiverLoop::new(
            Arc::new(MockNativeClient::new()),
            Arc::clone(&table),
            Arc::clone(&hub),
            Arc::new(AtomicBool::new(false)),
            Duration::from_millis(10),
        );
        Parts {
            receiver,
            table,
            hub,
        }
    }

    #[rstest]
    fn matching_reply_goes_to_its_waiter(parts: Parts) {
        let waiter = parts
            .table
            .register(3, "getMe")
            .unwrap_or_else(|error| panic!("register: {error}"));

        let route = parts
            .receiver
            .route(String::from(r#"{"@type":"user","id":1,"@extra":3}"#));

        assert_eq!(route, Route::Reply { id: 3 });
        assert!(matches!(waiter.take(), Some(Delivery::Reply(_))));
    }

    #[rstest]
    fn error_reply_is_delivered_as_failure(parts: Parts) {
        let waiter = parts
            .table
            .register(5, "getMe")
            .unwrap_or_else(|error| panic!("register: {error}"));

        let route = parts.receiver.route(String::from(
            r#"{"@type":"error","code":400,"message":"BAD_REQUEST","@extra":5}"#,
        ));

        assert_eq!(route, Route::Failure { id: 5 });
        let result = waiter.take().map(|delivery| delivery.into_result(5));
        assert!(matches!(
            result,
            Some(Err(InvokeError::Protocol { code: 400, .. }))
        ));
    }

    #[rstest]
    fn uncorrelated_messages_are_broadcast(parts: Parts) {
        let subscription = parts.hub.subscribe();

        let route = parts
            .receiver
            .route(String::from(r#"{"@type":"updateOption","name":"version"}"#));

        assert_eq!(route, Route::Update { delivered: 1 });
        assert!(subscription.try_recv().is_ok());
    }

    #[rstest]
    fn late_replies_become_updates(parts: Parts) {
        let subscription = parts.hub.subscribe();

        let route = parts
            .receiver
            .route(String::from(r#"{"@type":"ok","@extra":77}"#));

        assert_eq!(route, Route::Update { delivered: 1 });
        let update = subscription
            .try_recv()
            .unwrap_or_else(|error| panic!("recv: {error}"));
        assert_eq!(update.envelope().correlation_id(), Some(77));
    }

    #[rstest]
    fn malformed_messages_are_skipped(parts: Parts) {
        let subscription = parts.hub.subscribe();

        let route = parts.receiver.route(String::from("{not json"));

        assert_eq!(route, Route::Malformed);
        assert!(subscription.try_recv().is_err());
    }

    #[rstest]
    fn closed_stream_shuts_everything_down() {
        let mut native = MockNativeClient::new();
        native
            .expect_receive()
            .returning(|_| Err(NativeError::Closed));
        let table = Arc::new(CorrelationTable::new());
        let hub = Arc::new(UpdateHub::new(8, OverflowPolicy::DropOldest));
        let shutdown = Arc::new(AtomicBool::new(false));
        let waiter = table
            .register(1, "getMe")
            .unwrap_or_else(|error| panic!("register: {error}"));
        let subscription = hub.subscribe();

        ReceiverLoop::new(
            Arc::new(native),
            Arc::clone(&table),
            Arc::clone(&hub),
            Arc::clone(&shutdown),
            Duration::from_millis(10),
        )
        .run();

        assert!(shutdown.load(Ordering::SeqCst));
        assert!(matches!(waiter.take(), Some(Delivery::Closed)));
        assert!(subscription.is_closed());
    }

    #[rstest]
    fn transient_errors_are_retried() {
        let mut native = MockNativeClient::new();
        let mut sequence = mockall::Sequence::new();
        native
            .expect_receive()
            .times(2)
            .in_sequence(&mut sequence)
            .returning(|_| {
                Err(NativeError::Transport {
                    message: String::from("busy"),
                })
            });
        native
            .expect_receive()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(Some(String::from(r#"{"@type":"updateOption"}"#))));
        native
            .expect_receive()
            .in_sequence(&mut sequence)
            .returning(|_| Err(NativeError::Closed));
        let hub = Arc::new(UpdateHub::new(8, OverflowPolicy::DropOldest));
        let subscription = hub.subscribe();

        ReceiverLoop::new(
            Arc::new(native),
            Arc::new(CorrelationTable::new()),
            Arc::clone(&hub),
            Arc::new(AtomicBool::new(false)),
            Duration::from_millis(10),
        )
        .run();

        let update = subscription
            .try_recv()
            .unwrap_or_else(|error| panic!("recv: {error}"));
        assert_eq!(update.type_name(), "updateOption");
    }
}
