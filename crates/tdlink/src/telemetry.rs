//! Structured logging setup for applications embedding the dispatcher.
//!
//! The library only emits `tracing` events. Installing a global subscriber is
//! left to the application, which may call [`initialise`] once at start-up.
//!
//! Events carry the emitting thread's name, so receiver activity shows up
//! under `tdlink-receiver` and call activity under the caller's thread.
//! Unless the configured filter names a `tdlink` target itself, warnings from
//! `tdlink::receiver` stay enabled: they are the only report of a failing
//! native transport.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use tdlink_config::{Config, LogFormat};

use crate::receiver::RECEIVER_TARGET;

static TELEMETRY: OnceCell<TelemetryHandle> = OnceCell::new();

/// Describes the subscriber installed by [`initialise`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryHandle {
    filter: String,
    format: LogFormat,
}

impl TelemetryHandle {
    /// Filter expression in effect, including any added receiver directive.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Output format in effect.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter '{filter}': {message}")]
    Filter {
        /// The rejected expression.
        filter: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global tracing subscriber on first use.
///
/// Later calls return the handle of the first installation without touching
/// the global state again, whatever `config` they pass.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an invalid filter expression and
/// [`TelemetryError::Subscriber`] when another subscriber is already
/// installed.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY
        .get_or_try_init(|| install_subscriber(config))
        .cloned()
}

fn install_subscriber(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    let handle = TelemetryHandle {
        filter: effective_filter(config.log_filter()),
        format: config.log_format(),
    };
    let filter = EnvFilter::try_new(&handle.filter).map_err(|error| TelemetryError::Filter {
        filter: handle.filter.clone(),
        message: error.to_string(),
    })?;

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match handle.format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;
    Ok(handle)
}

/// Appends a `warn` floor for the receiver target unless `filter` already
/// mentions a `tdlink` target or turns logging off.
fn effective_filter(filter: &str) -> String {
    let configured = filter.trim();
    let directives: Vec<&str> = configured
        .split(',')
        .map(str::trim)
        .filter(|directive| !directive.is_empty())
        .collect();
    let explicit = directives
        .iter()
        .any(|directive| directive.starts_with("tdlink") || *directive == "off");
    if explicit {
        return directives.join(",");
    }
    let receiver = format!("{RECEIVER_TARGET}=warn");
    if directives.is_empty() {
        return receiver;
    }
    format!("{},{receiver}", directives.join(","))
}
