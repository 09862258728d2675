//! Typed view of unsolicited updates.

use serde::Deserialize;

use tdlink::{DecodeError, TaggedUnion};

use crate::objects::{AuthorizationState, ConnectionState, Message, OptionValue};

/// The authorization state changed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateAuthorizationState {
    /// New state.
    pub authorization_state: AuthorizationState,
}

/// The connection state changed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateConnectionState {
    /// New state.
    pub state: ConnectionState,
}

/// A message was received or sent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateNewMessage {
    /// The message.
    pub message: Message,
}

/// A library option changed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateOption {
    /// Option name.
    pub name: String,
    /// New value.
    pub value: OptionValue,
}

tagged_union! {
    /// An update the typed layer understands.
    ///
    /// The native schema evolves independently, so decoding an update with
    /// an unknown discriminator yields [`DecodeError::UnknownVariant`] rather
    /// than a fatal error.
    pub enum Update {
        /// See [`UpdateAuthorizationState`].
        AuthorizationState(UpdateAuthorizationState) => "updateAuthorizationState",
        /// See [`UpdateConnectionState`].
        ConnectionState(UpdateConnectionState) => "updateConnectionState",
        /// See [`UpdateNewMessage`].
        NewMessage(UpdateNewMessage) => "updateNewMessage",
        /// See [`UpdateOption`].
        Option(UpdateOption) => "updateOption",
    }
}

impl TryFrom<&tdlink::Update> for Update {
    type Error = DecodeError;

    fn try_from(update: &tdlink::Update) -> Result<Self, Self::Error> {
        let value = update.envelope().to_value()?;
        Self::decode_variant(update.type_name(), value)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;
    use serde_json::json;
    use tdlink::{Client, ClientOptions, ScriptedNative};

    use super::*;

    fn first_update(message: &serde_json::Value) -> tdlink::Update {
        let native = ScriptedNative::new();
        let client = Client::new(
            native.clone(),
            ClientOptions::default().with_receive_timeout(Duration::from_millis(10)),
        )
        .unwrap_or_else(|error| panic!("start: {error}"));
        let subscription = client.subscribe();
        native.push(message);
        subscription
            .recv_timeout(Duration::from_secs(2))
            .unwrap_or_else(|error| panic!("recv: {error}"))
    }

    #[rstest]
    fn nested_unions_decode() {
        let raw = first_update(&json!({
            "@type": "updateAuthorizationState",
            "authorization_state": {"@type": "authorizationStateWaitPassword", "password_hint": "pet"}
        }));

        let update = Update::try_from(&raw).unwrap_or_else(|error| panic!("decode: {error}"));

        match update {
            Update::AuthorizationState(UpdateAuthorizationState {
                authorization_state: AuthorizationState::WaitPassword(state),
            }) => assert_eq!(state.password_hint, "pet"),
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[rstest]
    fn option_updates_carry_typed_values() {
        let raw = first_update(&json!({
            "@type": "updateOption",
            "name": "unix_time",
            "value": {"@type": "optionValueInteger", "value": "1700000000"}
        }));

        let update = Update::try_from(&raw).unwrap_or_else(|error| panic!("decode: {error}"));

        assert_eq!(update.type_name(), "updateOption");
        assert!(matches!(
            update,
            Update::Option(UpdateOption { value: OptionValue::Integer(_), .. })
        ));
    }

    #[rstest]
    fn unknown_updates_are_reported() {
        let raw = first_update(&json!({"@type": "updateChatTitle", "chat_id": 1}));

        let decoded = Update::try_from(&raw);

        assert!(matches!(
            decoded,
            Err(DecodeError::UnknownVariant { union: "Update", .. })
        ));
    }

    #[rstest]
    fn unknown_nested_variants_fail_the_payload() {
        let raw = first_update(&json!({
            "@type": "updateConnectionState",
            "state": {"@type": "connectionStateDormant"}
        }));

        let decoded = Update::try_from(&raw);

        assert!(matches!(decoded, Err(DecodeError::Payload { .. })));
    }
}
