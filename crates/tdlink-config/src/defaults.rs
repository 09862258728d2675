use crate::logging::LogFormat;
use crate::overflow::OverflowPolicy;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default upper bound on a single native receive call, in milliseconds.
///
/// This also bounds how long shutdown waits for the receiver thread.
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 500;

/// Default deadline applied to calls that do not supply their own.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 60_000;

/// Default number of updates buffered per subscriber.
pub const DEFAULT_UPDATE_BUFFER: usize = 1024;

/// Default verbosity requested from the native library's own logger.
pub const DEFAULT_NATIVE_LOG_VERBOSITY: i32 = 1;

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default receive poll interval in milliseconds.
#[must_use]
pub const fn default_receive_timeout_ms() -> u64 {
    DEFAULT_RECEIVE_TIMEOUT_MS
}

/// Default call deadline in milliseconds.
#[must_use]
pub const fn default_call_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}

/// Default per-subscriber buffer capacity.
#[must_use]
pub const fn default_update_buffer() -> usize {
    DEFAULT_UPDATE_BUFFER
}

/// Default subscriber overflow policy.
#[must_use]
pub const fn default_overflow_policy() -> OverflowPolicy {
    OverflowPolicy::DropOldest
}

/// Default native log verbosity.
#[must_use]
pub const fn default_native_log_verbosity() -> i32 {
    DEFAULT_NATIVE_LOG_VERBOSITY
}
