//! Backpressure policy applied to update subscribers that stop draining.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// What the dispatcher does when a subscriber's buffer is full.
///
/// There is no blocking policy; the receiver never waits on a subscriber.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OverflowPolicy {
    /// Evict the oldest buffered update and report the gap to the subscriber
    /// on its next receive.
    #[default]
    DropOldest,
    /// Close the lagging subscription after its buffered updates are drained.
    Disconnect,
}

/// Errors encountered while parsing an [`OverflowPolicy`] from text.
pub type OverflowPolicyParseError = strum::ParseError;
