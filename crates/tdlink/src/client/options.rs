//! Runtime options for a [`Client`](super::Client).

use std::time::Duration;

use tdlink_config::{
    Config, DEFAULT_CALL_TIMEOUT_MS, DEFAULT_RECEIVE_TIMEOUT_MS, DEFAULT_UPDATE_BUFFER,
    OverflowPolicy,
};

/// Timeouts and buffering used by a client.
///
/// Built from a loaded [`Config`] or directly with the builder methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    receive_timeout: Duration,
    call_timeout: Duration,
    update_buffer: usize,
    overflow_policy: OverflowPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_millis(DEFAULT_RECEIVE_TIMEOUT_MS),
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            update_buffer: DEFAULT_UPDATE_BUFFER,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

impl From<&Config> for ClientOptions {
    fn from(config: &Config) -> Self {
        Self {
            receive_timeout: config.receive_timeout(),
            call_timeout: config.call_timeout(),
            update_buffer: config.update_buffer().max(1),
            overflow_policy: config.overflow_policy(),
        }
    }
}

impl ClientOptions {
    /// Sets the upper bound on a single native receive call.
    ///
    /// This also bounds how long [`Client::close`](super::Client::close)
    /// waits for the receiver thread.
    #[must_use]
    pub const fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Sets the deadline used by calls without an explicit timeout.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets the per-subscriber buffer capacity. Zero is raised to one.
    #[must_use]
    pub fn with_update_buffer(mut self, capacity: usize) -> Self {
        self.update_buffer = capacity.max(1);
        self
    }

    /// Sets the policy for subscribers whose buffer is full.
    #[must_use]
    pub const fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Upper bound on a single native receive call.
    #[must_use]
    pub const fn receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    /// Default call deadline.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Per-subscriber buffer capacity.
    #[must_use]
    pub const fn update_buffer(&self) -> usize {
        self.update_buffer
    }

    /// Overflow policy for lagging subscribers.
    #[must_use]
    pub const fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }
}
