//! Shared configuration for the tdlink native binding.
//!
//! Settings are layered by `ortho_config`: built-in defaults, then an
//! optional configuration file, then `TDLINK_*` environment variables, then
//! command-line flags. The dispatcher itself only consumes the resolved
//! values; it never reads the environment on its own.

mod defaults;
mod logging;
mod overflow;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_CALL_TIMEOUT_MS, DEFAULT_LOG_FILTER, DEFAULT_NATIVE_LOG_VERBOSITY,
    DEFAULT_RECEIVE_TIMEOUT_MS, DEFAULT_UPDATE_BUFFER, default_call_timeout_ms,
    default_log_filter, default_log_filter_string, default_log_format,
    default_native_log_verbosity, default_overflow_policy, default_receive_timeout_ms,
    default_update_buffer,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use overflow::{OverflowPolicy, OverflowPolicyParseError};

/// Resolved configuration for a tdlink client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TDLINK")]
pub struct Config {
    /// `tracing` filter expression applied by telemetry initialisation.
    #[serde(default = "default_log_filter_string")]
    log_filter: String,
    /// Output format for structured logs.
    #[serde(default = "default_log_format")]
    log_format: LogFormat,
    /// Upper bound on a single native receive call, in milliseconds.
    #[serde(default = "default_receive_timeout_ms")]
    receive_timeout_ms: u64,
    /// Deadline for calls that do not supply their own, in milliseconds.
    #[serde(default = "default_call_timeout_ms")]
    call_timeout_ms: u64,
    /// Number of updates buffered per subscriber.
    #[serde(default = "default_update_buffer")]
    update_buffer: usize,
    /// Behaviour when a subscriber's buffer is full.
    #[serde(default = "default_overflow_policy")]
    overflow_policy: OverflowPolicy,
    /// Verbosity requested from the native library's internal logger.
    #[serde(default = "default_native_log_verbosity")]
    native_log_verbosity: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            receive_timeout_ms: default_receive_timeout_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            update_buffer: default_update_buffer(),
            overflow_policy: default_overflow_policy(),
            native_log_verbosity: default_native_log_verbosity(),
        }
    }
}

/// Invalid values detected after the layers were merged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A duration setting was zero.
    #[error("{field} must be greater than zero")]
    ZeroDuration {
        /// Name of the offending setting.
        field: &'static str,
    },
    /// Subscribers need room for at least one update.
    #[error("update_buffer must be at least 1")]
    EmptyUpdateBuffer,
}

/// Errors raised by [`Config::load_validated`].
#[derive(Debug, Error)]
pub enum LoadError {
    /// A configuration layer could not be read or merged.
    #[error("failed to load configuration: {0}")]
    Load(#[source] Arc<OrthoError>),
    /// The merged configuration is not usable.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ConfigError),
}

impl Config {
    /// Loads configuration from every layer and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Load`] when a layer cannot be read or merged and
    /// [`LoadError::Invalid`] when the merged values fail [`Config::validate`].
    pub fn load_validated() -> Result<Self, LoadError> {
        Self::load_validated_from_iter(std::env::args_os())
    }

    /// Like [`Config::load_validated`] with explicit command-line arguments,
    /// the first of which is the program name.
    ///
    /// # Errors
    ///
    /// See [`Config::load_validated`].
    pub fn load_validated_from_iter<I, T>(args: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = Self::load_from_iter(args).map_err(LoadError::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the dispatcher relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a zero timeout or an empty update buffer.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.receive_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "receive_timeout_ms",
            });
        }
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "call_timeout_ms",
            });
        }
        if self.update_buffer == 0 {
            return Err(ConfigError::EmptyUpdateBuffer);
        }
        Ok(())
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Structured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Upper bound on a single native receive call.
    #[must_use]
    pub const fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    /// Deadline applied to calls without an explicit timeout.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Per-subscriber buffer capacity.
    #[must_use]
    pub const fn update_buffer(&self) -> usize {
        self.update_buffer
    }

    /// Policy applied when a subscriber's buffer is full.
    #[must_use]
    pub const fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }

    /// Verbosity requested from the native library's logger.
    #[must_use]
    pub const fn native_log_verbosity(&self) -> i32 {
        self.native_log_verbosity
    }

    /// Replaces the log filter.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Replaces the log format.
    #[must_use]
    pub const fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }
}
