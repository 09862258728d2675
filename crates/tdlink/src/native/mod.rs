//! Boundary to the native library's JSON stream.
//!
//! The dispatcher only needs three primitives: hand a request to the
//! library, pull the next message off its stream with a bounded wait, and
//! run a request synchronously. Everything above this trait is independent
//! of how those primitives are provided.

#[cfg(any(test, feature = "test-support"))]
mod scripted;
#[cfg(feature = "tdjson")]
mod tdjson;

use std::time::Duration;

use thiserror::Error;

#[cfg(any(test, feature = "test-support"))]
pub use scripted::{ScriptedNative, reply_to};
#[cfg(feature = "tdjson")]
pub use tdjson::TdJsonClient;

/// Failures reported by a [`NativeClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeError {
    /// The native stream has ended and will produce no further messages.
    #[error("native client is closed")]
    Closed,
    /// The request could not be passed across the C boundary.
    #[error("request contains an interior NUL byte at offset {position}")]
    InteriorNul {
        /// Byte offset of the first NUL.
        position: usize,
    },
    /// The native library produced text that is not UTF-8.
    #[error("native library returned invalid UTF-8")]
    InvalidUtf8,
    /// Any other transport-level failure.
    #[error("native transport failure: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },
}

/// The three primitives exposed by the native library.
///
/// Implementations must tolerate concurrent `send` and `execute` calls from
/// many threads. `receive` is only ever called by the dispatcher's single
/// receiver thread.
#[cfg_attr(test, mockall::automock)]
pub trait NativeClient: Send + Sync {
    /// Queues a request. Replies arrive later through [`Self::receive`].
    ///
    /// # Errors
    ///
    /// Returns an error when the request cannot be handed to the library.
    fn send(&self, request: &str) -> Result<(), NativeError>;

    /// Waits up to `timeout` for the next message.
    ///
    /// `Ok(None)` means no message arrived in time and is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`NativeError::Closed`] once the stream has ended.
    fn receive(&self, timeout: Duration) -> Result<Option<String>, NativeError>;

    /// Runs a request synchronously and returns its result, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the request cannot be handed to the library.
    fn execute(&self, request: &str) -> Result<Option<String>, NativeError>;
}
