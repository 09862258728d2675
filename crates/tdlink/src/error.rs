//! Error taxonomy surfaced by the dispatcher.
//!
//! Every failure travels as a value. Protocol errors reported by the native
//! library, missed deadlines, undecodable replies and calls made after
//! shutdown are kept distinct so callers can decide whether to retry.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::envelope::CorrelationId;
use crate::native::NativeError;

/// Failures while interpreting a raw envelope.
///
/// `serde_json` errors are wrapped in `Arc` so the enum stays cheap to clone.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The message was not a JSON object with a string `@type`.
    #[error("malformed envelope: {source}")]
    Malformed {
        /// Underlying parser failure.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// A request or nested object lacked the `@type` discriminator.
    #[error("object is missing its '@type' discriminator")]
    MissingType,

    /// A concrete type was expected but another discriminator arrived.
    #[error("expected '{expected}' but received '{found}'")]
    UnexpectedType {
        /// Discriminator the caller asked for.
        expected: &'static str,
        /// Discriminator present on the wire.
        found: String,
    },

    /// A sum type received a discriminator it does not know.
    #[error("'{found}' is not a known variant of {union}")]
    UnknownVariant {
        /// Name of the sum type being decoded.
        union: &'static str,
        /// Discriminator present on the wire.
        found: String,
    },

    /// The discriminator matched but the fields did not.
    #[error("failed to decode '{type_name}': {source}")]
    Payload {
        /// Discriminator of the object being decoded.
        type_name: String,
        /// Underlying field-level failure.
        #[source]
        source: Arc<serde_json::Error>,
    },
}

impl DecodeError {
    pub(crate) fn malformed(source: serde_json::Error) -> Self {
        Self::Malformed {
            source: Arc::new(source),
        }
    }

    /// Builds a payload error for the named discriminator.
    #[must_use]
    pub fn payload(type_name: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Payload {
            type_name: type_name.into(),
            source: Arc::new(source),
        }
    }

    /// Builds an unknown-variant error for a sum type.
    #[must_use]
    pub fn unknown_variant(union: &'static str, found: impl Into<String>) -> Self {
        Self::UnknownVariant {
            union,
            found: found.into(),
        }
    }
}

/// Errors returned by [`crate::Client`] operations.
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    /// The native library answered with an `error` envelope.
    #[error("native library returned error {code}: {message}")]
    Protocol {
        /// Numeric error code, surfaced verbatim.
        code: i64,
        /// Error message, surfaced verbatim.
        message: String,
    },

    /// No reply arrived before the deadline.
    #[error("request {id} timed out after {}ms", timeout.as_millis())]
    Timeout {
        /// Correlation id of the abandoned call.
        id: CorrelationId,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// The reply could not be decoded into the expected shape.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The client is shutting down or already closed.
    #[error("client is closed")]
    Closed,

    /// The call was cancelled before a reply arrived.
    #[error("request {id} was cancelled")]
    Cancelled {
        /// Correlation id of the cancelled call.
        id: CorrelationId,
    },

    /// The native boundary rejected the operation.
    #[error("native boundary failure: {0}")]
    Native(#[from] NativeError),

    /// The request could not be serialised.
    #[error("failed to encode request '{type_name}': {source}")]
    Encode {
        /// Discriminator of the request.
        type_name: String,
        /// Underlying serialiser failure.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// A correlation id was registered twice while still in flight.
    #[error("correlation id {id} is already in flight")]
    DuplicateCorrelation {
        /// Offending id.
        id: CorrelationId,
    },

    /// Synchronous execution produced no result.
    #[error("native library returned no result for '{type_name}'")]
    EmptyResult {
        /// Discriminator of the request.
        type_name: String,
    },

    /// The receiver thread could not be started.
    #[error("failed to start receiver thread: {source}")]
    Spawn {
        /// Underlying OS error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The receiver thread panicked and was reaped during shutdown.
    #[error("receiver thread panicked")]
    ReceiverPanicked,
}

impl InvokeError {
    pub(crate) fn encode(type_name: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Encode {
            type_name: type_name.into(),
            source: Arc::new(source),
        }
    }

    /// Whether the call missed its deadline.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the client was closed underneath the call.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Protocol error code, when the native library reported one.
    #[must_use]
    pub const fn protocol_code(&self) -> Option<i64> {
        match self {
            Self::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }
}
