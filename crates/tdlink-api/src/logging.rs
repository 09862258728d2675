//! Control over the native library's own log.
//!
//! The library writes its log independently of `tracing`. Verbosity is set
//! with a synchronous `setLogVerbosityLevel` request, which is safe to issue
//! before any session exists.

use tracing::debug;

use tdlink::{Client, Config, InvokeError};

use crate::functions::SetLogVerbosityLevel;

const LOGGING_TARGET: &str = "tdlink_api::logging";

/// Sets the native log verbosity.
///
/// # Errors
///
/// Returns the error reported by [`Client::execute_function`].
pub fn configure_native_logging(client: &Client, verbosity: i32) -> Result<(), InvokeError> {
    client.execute_function(&SetLogVerbosityLevel {
        new_verbosity_level: verbosity,
    })?;
    debug!(target: LOGGING_TARGET, verbosity, "native log verbosity set");
    Ok(())
}

/// Applies the verbosity configured in `config`.
///
/// # Errors
///
/// See [`configure_native_logging`].
pub fn apply_native_logging(client: &Client, config: &Config) -> Result<(), InvokeError> {
    configure_native_logging(client, config.native_log_verbosity())
}
