//! Seam between the dispatcher and generated request/result types.
//!
//! A [`Function`] names its discriminator and result type; the client
//! serialises it, invokes it, and decodes the reply through [`FromEnvelope`].
//! Sum types implement [`TaggedUnion`] and select a variant from the
//! discriminator, rejecting names they do not know instead of coercing.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::envelope::{Envelope, Request};
use crate::error::{DecodeError, InvokeError};

/// Decoding of a raw reply into a concrete type.
pub trait FromEnvelope: Sized {
    /// Decodes `envelope`.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the discriminator or fields do not
    /// match.
    fn from_envelope(envelope: &Envelope) -> Result<Self, DecodeError>;
}

/// A request type with a fixed discriminator and typed result.
pub trait Function: Serialize {
    /// Discriminator sent as `@type`.
    const TYPE: &'static str;

    /// Type the reply decodes into.
    type Output: FromEnvelope;

    /// Builds the untyped request.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Encode`] if the parameters fail to serialise.
    fn to_request(&self) -> Result<Request, InvokeError> {
        Request::from_serializable(Self::TYPE, self)
    }
}

/// A sum type keyed by discriminator.
pub trait TaggedUnion: Sized {
    /// Name reported in [`DecodeError::UnknownVariant`].
    const NAME: &'static str;

    /// Decodes the variant named by `type_name` from the full object.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownVariant`] for unrecognised names and
    /// [`DecodeError::Payload`] for mismatched fields.
    fn decode_variant(type_name: &str, value: Value) -> Result<Self, DecodeError>;
}

/// Decodes a concrete object after checking its discriminator.
///
/// # Errors
///
/// Returns [`DecodeError::UnexpectedType`] on discriminator mismatch and
/// [`DecodeError::Payload`] when the fields do not match `T`.
pub fn decode_object<T: DeserializeOwned>(
    envelope: &Envelope,
    expected: &'static str,
) -> Result<T, DecodeError> {
    envelope.expect_type(expected)?;
    envelope.decode()
}

/// Decodes a sum type by dispatching on the discriminator.
///
/// # Errors
///
/// Propagates the errors of [`TaggedUnion::decode_variant`].
pub fn decode_union<T: TaggedUnion>(envelope: &Envelope) -> Result<T, DecodeError> {
    let value = envelope.to_value()?;
    T::decode_variant(envelope.type_name(), value)
}

/// Decodes an untyped object as one concrete variant.
///
/// # Errors
///
/// Returns [`DecodeError::Payload`] when the fields do not match `T`.
pub fn decode_payload<T: DeserializeOwned>(type_name: &str, value: Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|error| DecodeError::payload(type_name, error))
}

impl FromEnvelope for Envelope {
    fn from_envelope(envelope: &Envelope) -> Result<Self, DecodeError> {
        Ok(envelope.clone())
    }
}

impl FromEnvelope for Value {
    fn from_envelope(envelope: &Envelope) -> Result<Self, DecodeError> {
        envelope.to_value()
    }
}
