//! Result and update payload types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Empty success reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Ok {}

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    /// User identifier.
    pub id: i64,
    /// First name.
    #[serde(default)]
    pub first_name: String,
    /// Last name.
    #[serde(default)]
    pub last_name: String,
    /// Phone number, without the leading plus.
    #[serde(default)]
    pub phone_number: String,
}

/// A chat message. Only the fields the dispatcher tests rely on are typed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Message {
    /// Message identifier, unique within its chat.
    pub id: i64,
    /// Chat the message belongs to.
    pub chat_id: i64,
    /// Unix time the message was sent.
    #[serde(default)]
    pub date: i32,
    /// Whether the current user sent the message.
    #[serde(default)]
    pub is_outgoing: bool,
    /// Message content, left untyped.
    #[serde(default)]
    pub content: Value,
}

/// Text entities found by the native parser.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TextEntities {
    /// Entities in order of appearance.
    #[serde(default)]
    pub entities: Vec<TextEntity>,
}

/// One entity inside a piece of text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TextEntity {
    /// Offset in UTF-16 code units.
    pub offset: i32,
    /// Length in UTF-16 code units.
    pub length: i32,
    /// Entity kind, left untyped.
    #[serde(rename = "type", default)]
    pub kind: Value,
}

tl_object! {
    Ok => "ok",
    User => "user",
    Message => "message",
    TextEntities => "textEntities",
}

/// Boolean option value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OptionValueBoolean {
    /// The value.
    pub value: bool,
}

/// Integer option value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OptionValueInteger {
    /// The value.
    #[serde(with = "crate::int64")]
    pub value: i64,
}

/// String option value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OptionValueString {
    /// The value.
    pub value: String,
}

tagged_union! {
    /// Value of a native library option.
    pub enum OptionValue {
        /// A boolean.
        Boolean(OptionValueBoolean) => "optionValueBoolean",
        /// The option is unset.
        Empty => "optionValueEmpty",
        /// An integer.
        Integer(OptionValueInteger) => "optionValueInteger",
        /// A string.
        String(OptionValueString) => "optionValueString",
    }
}

/// The library is waiting for a confirmation code.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthorizationStateWaitCode {
    /// Where the code was sent, left untyped.
    #[serde(default)]
    pub code_info: Value,
}

/// The library is waiting for the two-step verification password.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthorizationStateWaitPassword {
    /// Hint for the password.
    #[serde(default)]
    pub password_hint: String,
    /// Whether a recovery email address is set.
    #[serde(default)]
    pub has_recovery_email_address: bool,
}

tagged_union! {
    /// Stage of the login flow.
    pub enum AuthorizationState {
        /// Library parameters must be supplied.
        WaitTdlibParameters => "authorizationStateWaitTdlibParameters",
        /// A phone number must be supplied.
        WaitPhoneNumber => "authorizationStateWaitPhoneNumber",
        /// A confirmation code must be supplied.
        WaitCode(AuthorizationStateWaitCode) => "authorizationStateWaitCode",
        /// A password must be supplied.
        WaitPassword(AuthorizationStateWaitPassword) => "authorizationStateWaitPassword",
        /// The session is authorised.
        Ready => "authorizationStateReady",
        /// The user is logging out.
        LoggingOut => "authorizationStateLoggingOut",
        /// The library is shutting down.
        Closing => "authorizationStateClosing",
        /// The library has shut down; the client must be discarded.
        Closed => "authorizationStateClosed",
    }
}

impl AuthorizationState {
    /// Whether the state ends the login flow without authorisation.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::LoggingOut | Self::Closing | Self::Closed)
    }
}

tagged_union! {
    /// Network connection state.
    pub enum ConnectionState {
        /// Waiting for the network to become available.
        WaitingForNetwork => "connectionStateWaitingForNetwork",
        /// Connecting to a proxy.
        ConnectingToProxy => "connectionStateConnectingToProxy",
        /// Connecting to the servers.
        Connecting => "connectionStateConnecting",
        /// Fetching missed updates.
        Updating => "connectionStateUpdating",
        /// Connected and up to date.
        Ready => "connectionStateReady",
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tdlink::{DecodeError, Envelope, FromEnvelope};

    use super::*;

    fn envelope(raw: &str) -> Envelope {
        Envelope::parse(raw).unwrap_or_else(|error| panic!("parse: {error}"))
    }

    #[rstest]
    #[case(r#"{"@type":"optionValueBoolean","value":true}"#, OptionValue::Boolean(OptionValueBoolean { value: true }))]
    #[case(r#"{"@type":"optionValueEmpty"}"#, OptionValue::Empty)]
    #[case(r#"{"@type":"optionValueInteger","value":"1700000000000"}"#, OptionValue::Integer(OptionValueInteger { value: 1_700_000_000_000 }))]
    #[case(r#"{"@type":"optionValueString","value":"1.8.0"}"#, OptionValue::String(OptionValueString { value: String::from("1.8.0") }))]
    fn option_values_decode_by_discriminator(#[case] raw: &str, #[case] expected: OptionValue) {
        let decoded = OptionValue::from_envelope(&envelope(raw))
            .unwrap_or_else(|error| panic!("decode: {error}"));

        assert_eq!(decoded, expected);
        assert_eq!(decoded.type_name(), envelope(raw).type_name());
    }

    #[rstest]
    fn unknown_option_value_is_not_coerced() {
        let decoded = OptionValue::from_envelope(&envelope(r#"{"@type":"optionValueFloat"}"#));

        assert!(matches!(
            decoded,
            Err(DecodeError::UnknownVariant { union: "OptionValue", found }) if found == "optionValueFloat"
        ));
    }

    #[rstest]
    fn objects_reject_other_discriminators() {
        let decoded = User::from_envelope(&envelope(r#"{"@type":"ok"}"#));

        assert!(matches!(decoded, Err(DecodeError::UnexpectedType { expected: "user", .. })));
    }

    #[rstest]
    fn users_decode_with_defaults() {
        let user = User::from_envelope(&envelope(r#"{"@type":"user","id":7,"first_name":"Ada"}"#))
            .unwrap_or_else(|error| panic!("decode: {error}"));

        assert_eq!(user.id, 7);
        assert_eq!(user.first_name, "Ada");
        assert!(user.phone_number.is_empty());
    }

    #[rstest]
    #[case(AuthorizationState::Closing, true)]
    #[case(AuthorizationState::WaitPhoneNumber, false)]
    fn terminal_states_are_recognised(#[case] state: AuthorizationState, #[case] terminal: bool) {
        assert_eq!(state.is_terminal(), terminal);
    }
}
