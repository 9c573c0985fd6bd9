//! Default values shared by the configuration types.

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The default number of console lines allowed within one reset window before
/// output is suppressed.
pub const DEFAULT_THROTTLE_LINES: u64 = 2000;

/// The default length of the rolling window, in milliseconds, after which the
/// throttle clears its line count and suppression flag.
pub const DEFAULT_LINE_RESET_INTERVAL_MS: u64 = 100;

/// The default interval, in milliseconds, after which one recorded throttle
/// activation decays.
pub const DEFAULT_DECAY_INTERVAL_MS: u64 = 10_000;

/// The default number of throttle activations tolerated before the process is
/// forcibly stopped.
pub const DEFAULT_MAXIMUM_TRIGGER_COUNT: u64 = 5;

/// The default number of seconds a throttled process is given to stop
/// gracefully before being terminated.
pub const DEFAULT_STOP_GRACE_PERIOD_SECS: u64 = 15;

/// The default capacity of the console sink's broadcast channel.
pub const DEFAULT_CONSOLE_SINK_CAPACITY: usize = 256;
