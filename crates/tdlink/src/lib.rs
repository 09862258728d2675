//! Dispatcher over a native library's single JSON message stream.
//!
//! The native library exposes one bidirectional stream: requests go in with
//! `send`, and replies and unsolicited updates come out of `receive`
//! interleaved. This crate turns that stream into:
//!
//! - blocking request/response calls, correlated through the `@extra` key
//!   ([`Client::invoke`], [`Client::call`]);
//! - an ordered broadcast of updates to any number of subscribers
//!   ([`Client::subscribe`]);
//! - deterministic shutdown that fails pending calls and closes
//!   subscriptions ([`Client::close`]).
//!
//! A single receiver thread reads the stream. Configuration comes from
//! `tdlink-config`; structured logging is emitted through `tracing` and can be
//! installed with [`telemetry::initialise`].

mod client;
mod correlation;
mod envelope;
mod error;
mod fanout;
pub mod native;
mod receiver;
pub mod telemetry;
mod typed;

#[cfg(test)]
mod tests;

pub use client::{CallCanceller, Client, ClientOptions, PendingCall};
pub use envelope::{
    CorrelationId, ERROR_TYPE, EXTRA_KEY, Envelope, ErrorEnvelope, Request, TYPE_KEY,
};
pub use error::{DecodeError, InvokeError};
pub use fanout::{Iter, RecvError, Subscription, SubscriptionId, Update};
pub use native::{NativeClient, NativeError};
pub use typed::{
    FromEnvelope, Function, TaggedUnion, decode_object, decode_payload, decode_union,
};

#[cfg(any(test, feature = "test-support"))]
pub use native::{ScriptedNative, reply_to};
#[cfg(feature = "tdjson")]
pub use native::TdJsonClient;

pub use tdlink_config::{Config, OverflowPolicy};
