//! Console throttling configuration.

use std::time::Duration;

use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use super::{
    DEFAULT_DECAY_INTERVAL_MS, DEFAULT_LINE_RESET_INTERVAL_MS, DEFAULT_MAXIMUM_TRIGGER_COUNT,
    DEFAULT_STOP_GRACE_PERIOD_SECS, DEFAULT_THROTTLE_LINES,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Tunables governing how much console output a server may produce before the
/// supervisor intervenes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ConsoleThrottles {
    /// Whether console throttling is enforced at all.
    #[serde(default = "ConsoleThrottles::default_enabled")]
    #[builder(default = ConsoleThrottles::default_enabled())]
    pub(super) enabled: bool,

    /// The number of output chunks allowed within one reset window before the
    /// stream is suppressed.
    #[serde(default = "ConsoleThrottles::default_lines")]
    #[builder(default = ConsoleThrottles::default_lines())]
    pub(super) lines: u64,

    /// The length of the rolling window, in milliseconds, after which the
    /// line count and suppression flag are cleared.
    #[serde(default = "ConsoleThrottles::default_line_reset_interval")]
    #[builder(default = ConsoleThrottles::default_line_reset_interval())]
    pub(super) line_reset_interval: u64,

    /// The interval, in milliseconds, after which one recorded activation
    /// decays.
    #[serde(default = "ConsoleThrottles::default_decay_interval")]
    #[builder(default = ConsoleThrottles::default_decay_interval())]
    pub(super) decay_interval: u64,

    /// The number of activations tolerated before the process is forcibly
    /// stopped.
    #[serde(default = "ConsoleThrottles::default_maximum_trigger_count")]
    #[builder(default = ConsoleThrottles::default_maximum_trigger_count())]
    pub(super) maximum_trigger_count: u64,

    /// The number of seconds a throttled process is given to stop gracefully
    /// before being terminated.
    #[serde(default = "ConsoleThrottles::default_stop_grace_period")]
    #[builder(default = ConsoleThrottles::default_stop_grace_period())]
    pub(super) stop_grace_period: u64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ConsoleThrottles {
    /// Returns the default enforcement flag.
    pub fn default_enabled() -> bool {
        true
    }

    /// Returns the default chunk allowance per window.
    pub fn default_lines() -> u64 {
        DEFAULT_THROTTLE_LINES
    }

    /// Returns the default reset window in milliseconds.
    pub fn default_line_reset_interval() -> u64 {
        DEFAULT_LINE_RESET_INTERVAL_MS
    }

    /// Returns the default decay interval in milliseconds.
    pub fn default_decay_interval() -> u64 {
        DEFAULT_DECAY_INTERVAL_MS
    }

    /// Returns the default activation limit.
    pub fn default_maximum_trigger_count() -> u64 {
        DEFAULT_MAXIMUM_TRIGGER_COUNT
    }

    /// Returns the default stop grace period in seconds.
    pub fn default_stop_grace_period() -> u64 {
        DEFAULT_STOP_GRACE_PERIOD_SECS
    }

    /// The rolling window after which the line count resets.
    pub fn line_reset_window(&self) -> Duration {
        Duration::from_millis(self.line_reset_interval)
    }

    /// The interval after which one activation decays.
    pub fn decay_window(&self) -> Duration {
        Duration::from_millis(self.decay_interval)
    }

    /// The grace period a throttled process gets to stop on its own.
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_period)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for ConsoleThrottles {
    fn default() -> Self {
        Self::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
