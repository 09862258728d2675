//! Declarative helpers standing in for schema-generated glue.

/// Implements [`tdlink::FromEnvelope`] for a concrete object with a fixed
/// discriminator.
macro_rules! tl_object {
    ($($object:ty => $name:literal),+ $(,)?) => {
        $(
            impl $object {
                /// Discriminator of this object on the wire.
                pub const TYPE: &'static str = $name;
            }

            impl ::tdlink::FromEnvelope for $object {
                fn from_envelope(
                    envelope: &::tdlink::Envelope,
                ) -> Result<Self, ::tdlink::DecodeError> {
                    ::tdlink::decode_object(envelope, $name)
                }
            }
        )+
    };
}

/// Implements [`tdlink::Function`] for a request type.
macro_rules! tl_function {
    ($($function:ty => $name:literal -> $output:ty),+ $(,)?) => {
        $(
            impl ::tdlink::Function for $function {
                const TYPE: &'static str = $name;
                type Output = $output;
            }
        )+
    };
}

/// Declares a sum type whose variant is selected by the `@type` key.
///
/// Variants either wrap a payload struct or carry no fields. Unknown
/// discriminators fail with [`tdlink::DecodeError::UnknownVariant`]; the
/// generated `Deserialize` impl lets the union appear inside other objects.
macro_rules! tagged_union {
    (
        $(#[$meta:meta])*
        pub enum $union:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $(($payload:ty))? => $name:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub enum $union {
            $(
                $(#[$variant_meta])*
                $variant $(($payload))?,
            )+
        }

        impl $union {
            /// Discriminator of the active variant.
            #[must_use]
            pub const fn type_name(&self) -> &'static str {
                match self {
                    $(Self::$variant { .. } => $name,)+
                }
            }
        }

        impl ::tdlink::TaggedUnion for $union {
            const NAME: &'static str = stringify!($union);

            fn decode_variant(
                type_name: &str,
                value: ::serde_json::Value,
            ) -> Result<Self, ::tdlink::DecodeError> {
                match type_name {
                    $(
                        $name => tagged_union!(
                            @decode type_name, value, Self::$variant $(, $payload)?
                        ),
                    )+
                    other => Err(::tdlink::DecodeError::unknown_variant(Self::NAME, other)),
                }
            }
        }

        impl ::tdlink::FromEnvelope for $union {
            fn from_envelope(
                envelope: &::tdlink::Envelope,
            ) -> Result<Self, ::tdlink::DecodeError> {
                ::tdlink::decode_union(envelope)
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $union {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                use ::serde::de::Error as _;

                let value = ::serde_json::Value::deserialize(deserializer)?;
                let type_name = value
                    .get(::tdlink::TYPE_KEY)
                    .and_then(::serde_json::Value::as_str)
                    .map(str::to_owned)
                    .ok_or_else(|| D::Error::custom(::tdlink::DecodeError::MissingType))?;
                <Self as ::tdlink::TaggedUnion>::decode_variant(&type_name, value)
                    .map_err(D::Error::custom)
            }
        }
    };
    (@decode $type_name:ident, $value:ident, $ctor:path, $payload:ty) => {
        ::tdlink::decode_payload::<$payload>($type_name, $value).map($ctor)
    };
    (@decode $type_name:ident, $value:ident, $ctor:path) => {{
        drop($value);
        ::core::result::Result::Ok($ctor)
    }};
}
