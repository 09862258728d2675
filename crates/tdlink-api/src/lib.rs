//! Typed requests, objects and updates on top of the `tdlink` dispatcher.
//!
//! The dispatcher moves untyped envelopes. This crate gives a working subset
//! of the native schema concrete Rust types:
//!
//! - [`functions`]: requests implementing [`tdlink::Function`], so
//!   [`tdlink::Client::call`] returns their typed result;
//! - [`objects`]: result objects and tagged unions such as
//!   [`AuthorizationState`];
//! - [`updates`]: the [`Update`] union, decoded from a
//!   [`tdlink::Update`] with `Update::try_from`;
//! - [`authorize`]: a driver for the login flow;
//! - [`configure_native_logging`]: control over the library's own log.

#[macro_use]
mod macros;

mod int64;

pub mod authorization;
pub mod functions;
pub mod logging;
pub mod objects;
pub mod updates;

#[cfg(test)]
mod tests;

pub use authorization::{
    AuthorizationError, AuthorizationHandler, CredentialsAuthorizer, authorize,
};
pub use logging::{apply_native_logging, configure_native_logging};
pub use objects::{AuthorizationState, ConnectionState, OptionValue, User};
pub use updates::Update;
