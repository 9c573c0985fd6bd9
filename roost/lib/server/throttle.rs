use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::Instant,
};

use crate::{config::ConsoleThrottles, RoostError, RoostResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Rate accounting for a server's console output.
///
/// Every received chunk is counted into a rolling window; crossing the
/// configured allowance suppresses sink forwarding and records an activation
/// strike. Enough strikes in quick succession and
/// [`increment`](Self::increment) reports a persistent violation for the
/// caller to act on. All bookkeeping is atomic, so a reset can race ongoing
/// increments safely.
///
/// Window expiry and strike decay are maintained lazily inside `increment`;
/// the throttle runs no background tasks. The window ledger packs the
/// window's sequence number and its chunk count into one atomic word, so
/// rolling into a fresh window and counting a chunk happen in a single
/// atomic step — a chunk racing the roll is never dropped from the
/// accounting.
#[derive(Debug)]
pub struct ConsoleThrottle {
    /// The tunables this throttle enforces.
    config: ConsoleThrottles,

    /// Monotonic anchor the window timestamps are measured from.
    anchor: Instant,

    /// The window ledger: high half is the current window's sequence number,
    /// low half the chunks counted in it.
    window: AtomicU64,

    /// When the current decay window started, in milliseconds since the
    /// anchor.
    decay_started_ms: AtomicU64,

    /// Activation strikes currently on record.
    activations: AtomicU64,

    /// Whether output is currently suppressed.
    throttled: AtomicBool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ConsoleThrottle {
    /// Creates a throttle enforcing the given tunables.
    pub fn new(config: ConsoleThrottles) -> Self {
        Self {
            config,
            anchor: Instant::now(),
            window: AtomicU64::new(0),
            decay_started_ms: AtomicU64::new(0),
            activations: AtomicU64::new(0),
            throttled: AtomicBool::new(false),
        }
    }

    /// The tunables this throttle enforces.
    pub fn config(&self) -> &ConsoleThrottles {
        &self.config
    }

    /// Reports whether output should currently be withheld from the sink.
    /// Accounting continues regardless of this flag.
    pub fn throttled(&self) -> bool {
        self.throttled.load(Ordering::SeqCst)
    }

    /// Clears all accounting: the window count, the activation strikes and
    /// the suppression flag. Safe to call while other tasks increment.
    pub fn reset(&self) {
        let now_ms = self.elapsed_ms();
        self.window
            .store(Self::pack(self.window_epoch(now_ms), 0), Ordering::SeqCst);
        self.decay_started_ms.store(now_ms, Ordering::SeqCst);
        self.activations.store(0, Ordering::SeqCst);
        self.throttled.store(false, Ordering::SeqCst);
    }

    /// Counts one console chunk against the current window.
    ///
    /// Crossing the window allowance suppresses output, records a strike and
    /// invokes `on_trigger`. Once the strikes on record reach the configured
    /// maximum, returns [`RoostError::TooMuchConsoleData`] instead of
    /// invoking `on_trigger`; the caller is expected to stop the process.
    pub fn increment(&self, on_trigger: impl FnOnce()) -> RoostResult<()> {
        if !*self.config.get_enabled() {
            return Ok(());
        }

        let now_ms = self.elapsed_ms();
        self.decay_strikes(now_ms);

        let epoch = self.window_epoch(now_ms);
        let previous = self
            .window
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |packed| {
                let (window_epoch, counted) = Self::unpack(packed);
                if window_epoch == epoch {
                    Some(Self::pack(epoch, counted.saturating_add(1)))
                } else {
                    Some(Self::pack(epoch, 1))
                }
            })
            .unwrap_or_else(|packed| packed);

        let (previous_epoch, previous_count) = Self::unpack(previous);
        let count = if previous_epoch == epoch {
            u64::from(previous_count) + 1
        } else {
            // This chunk rolled the ledger into a fresh window, lifting the
            // previous window's suppression.
            self.throttled.store(false, Ordering::SeqCst);
            1
        };

        if count >= *self.config.get_lines() {
            self.throttled.store(true, Ordering::SeqCst);

            if self.activations.fetch_add(1, Ordering::SeqCst) + 1
                >= *self.config.get_maximum_trigger_count()
            {
                return Err(RoostError::TooMuchConsoleData);
            }

            on_trigger();
        }

        Ok(())
    }

    /// Expires the decay intervals that have elapsed by `now_ms`, removing
    /// one strike per roll. The compare-and-swap lets exactly one of several
    /// racing tasks roll the interval.
    fn decay_strikes(&self, now_ms: u64) {
        let decay = *self.config.get_decay_interval();
        let started = self.decay_started_ms.load(Ordering::SeqCst);
        if now_ms.saturating_sub(started) >= decay
            && self
                .decay_started_ms
                .compare_exchange(started, now_ms, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            let _ = self
                .activations
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |strikes| {
                    Some(strikes.saturating_sub(1))
                });
        }
    }

    /// The sequence number of the counting window containing `now_ms`,
    /// truncated to the 32 bits the ledger keeps for it.
    fn window_epoch(&self, now_ms: u64) -> u64 {
        (now_ms / (*self.config.get_line_reset_interval()).max(1)) & u64::from(u32::MAX)
    }

    /// Packs a window sequence number and its chunk count into one word.
    fn pack(epoch: u64, count: u32) -> u64 {
        (epoch << 32) | u64::from(count)
    }

    /// Splits a packed window word back into sequence number and count.
    fn unpack(packed: u64) -> (u64, u32) {
        (packed >> 32, packed as u32)
    }

    /// Milliseconds elapsed since the throttle was created.
    fn elapsed_ms(&self) -> u64 {
        self.anchor.elapsed().as_millis() as u64
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
