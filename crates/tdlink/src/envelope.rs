//! Wire envelopes exchanged with the native library.
//!
//! Every message on the stream is a flat JSON object whose `@type` key names
//! the object and whose optional `@extra` key carries the correlation id the
//! dispatcher stamped on the originating request. Inbound messages are only
//! parsed as far as those two keys; the raw text is retained for a typed
//! decode later on.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DecodeError, InvokeError};

/// Discriminator key present on every object.
pub const TYPE_KEY: &str = "@type";

/// Key carrying the correlation id on requests and their replies.
pub const EXTRA_KEY: &str = "@extra";

/// Discriminator used by the native library to report a failed request.
pub const ERROR_TYPE: &str = "error";

/// Identifier correlating a reply with its request.
pub type CorrelationId = u64;

/// Outbound request: a discriminator plus call-specific fields.
///
/// The correlation key is never stored on the request; the dispatcher stamps
/// it at send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    type_name: String,
    fields: Map<String, Value>,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    #[serde(rename = "@type")]
    type_name: &'a str,
    #[serde(flatten)]
    fields: &'a Map<String, Value>,
    #[serde(rename = "@extra", skip_serializing_if = "Option::is_none")]
    extra: Option<CorrelationId>,
}

impl Request {
    /// Creates a request without parameters.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Map::new(),
        }
    }

    /// Adds a parameter, returning the updated request.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds or replaces a parameter.
    ///
    /// The reserved `@type` and `@extra` keys are ignored.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let name = key.into();
        if is_reserved(&name) {
            return;
        }
        self.fields.insert(name, value.into());
    }

    /// Builds a request from an untyped JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MissingType`] when the value is not an object
    /// with a string `@type`.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let Value::Object(mut fields) = value else {
            return Err(DecodeError::MissingType);
        };
        let Some(Value::String(type_name)) = fields.remove(TYPE_KEY) else {
            return Err(DecodeError::MissingType);
        };
        fields.remove(EXTRA_KEY);
        Ok(Self { type_name, fields })
    }

    /// Builds a request from a serialisable parameter struct.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Encode`] when the parameters do not serialise to
    /// a JSON object.
    pub fn from_serializable<T>(type_name: &str, params: &T) -> Result<Self, InvokeError>
    where
        T: Serialize + ?Sized,
    {
        let value =
            serde_json::to_value(params).map_err(|error| InvokeError::encode(type_name, error))?;
        let mut fields = match value {
            Value::Object(fields) => fields,
            Value::Null => Map::new(),
            _ => {
                return Err(InvokeError::encode(
                    type_name,
                    <serde_json::Error as serde::ser::Error>::custom(
                        "request parameters must serialise to a JSON object",
                    ),
                ));
            }
        };
        fields.remove(TYPE_KEY);
        fields.remove(EXTRA_KEY);
        Ok(Self {
            type_name: type_name.to_owned(),
            fields,
        })
    }

    /// Discriminator of the request.
    #[must_use]
    pub const fn type_name(&self) -> &str {
        self.type_name.as_str()
    }

    /// Call-specific parameters.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Serialises the request, stamping the correlation id when present.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Encode`] if serialisation fails.
    pub fn to_wire(&self, id: Option<CorrelationId>) -> Result<String, InvokeError> {
        let wire = WireRequest {
            type_name: &self.type_name,
            fields: &self.fields,
            extra: id,
        };
        serde_json::to_string(&wire).map_err(|error| InvokeError::encode(&self.type_name, error))
    }
}

fn is_reserved(key: &str) -> bool {
    key == TYPE_KEY || key == EXTRA_KEY
}

#[derive(Deserialize)]
struct Header {
    #[serde(rename = "@type")]
    type_name: String,
    #[serde(rename = "@extra", default)]
    extra: Option<Value>,
}

/// Inbound message with its header decoded and its body kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    type_name: String,
    extra: Option<Value>,
    raw: String,
}

impl Envelope {
    /// Parses the header of a raw message.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] when the text is not a JSON object
    /// with a string `@type`.
    pub fn parse(raw: impl Into<String>) -> Result<Self, DecodeError> {
        let text = raw.into();
        let header: Header = serde_json::from_str(&text).map_err(DecodeError::malformed)?;
        Ok(Self {
            type_name: header.type_name,
            extra: header.extra,
            raw: text,
        })
    }

    /// Discriminator of the message.
    #[must_use]
    pub const fn type_name(&self) -> &str {
        self.type_name.as_str()
    }

    /// Raw `@extra` value as it arrived.
    #[must_use]
    pub const fn extra(&self) -> Option<&Value> {
        self.extra.as_ref()
    }

    /// Correlation id, when the message carries one the dispatcher issued.
    #[must_use]
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.extra.as_ref().and_then(Value::as_u64)
    }

    /// Raw JSON text of the whole message.
    #[must_use]
    pub const fn raw(&self) -> &str {
        self.raw.as_str()
    }

    /// Whether the message is an error envelope.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.type_name == ERROR_TYPE
    }

    /// Decodes the error payload when the message is an error envelope.
    #[must_use]
    pub fn error(&self) -> Option<Result<ErrorEnvelope, DecodeError>> {
        self.is_error().then(|| self.decode::<ErrorEnvelope>())
    }

    /// Converts an error envelope into [`InvokeError::Protocol`].
    ///
    /// # Errors
    ///
    /// Returns the protocol error carried by an error envelope, or a decode
    /// error when its payload is malformed.
    pub fn into_result(self) -> Result<Self, InvokeError> {
        match self.error() {
            None => Ok(self),
            Some(Ok(error)) => Err(error.into()),
            Some(Err(error)) => Err(error.into()),
        }
    }

    /// Fails unless the discriminator equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnexpectedType`] on mismatch.
    pub fn expect_type(&self, expected: &'static str) -> Result<(), DecodeError> {
        if self.type_name == expected {
            Ok(())
        } else {
            Err(DecodeError::UnexpectedType {
                expected,
                found: self.type_name.clone(),
            })
        }
    }

    /// Decodes the whole message into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Payload`] when the fields do not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        serde_json::from_str(&self.raw).map_err(|error| DecodeError::payload(&self.type_name, error))
    }

    /// Parses the whole message into an untyped JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Payload`] if the retained text fails to parse.
    pub fn to_value(&self) -> Result<Value, DecodeError> {
        self.decode()
    }
}

/// Payload of an error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorEnvelope {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

impl From<ErrorEnvelope> for InvokeError {
    fn from(error: ErrorEnvelope) -> Self {
        Self::Protocol {
            code: error.code,
            message: error.message,
        }
    }
}
