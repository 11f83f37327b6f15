/*!
 * Time Sources
 * Clock abstraction and millisecond-to-tick conversion
 */

use super::types::Millis;
use std::time::{Duration, Instant};

/// Monotonic time source used for release bookkeeping
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Host monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Convert milliseconds to a whole number of host ticks, rounding up
///
/// A zero tick is treated as nanosecond resolution.
pub fn millis_to_ticks(ms: Millis, tick: Duration) -> u64 {
    let tick_nanos = tick.as_nanos().max(1);
    let nanos = u128::from(ms) * 1_000_000;
    let ticks = (nanos + tick_nanos - 1) / tick_nanos;
    u64::try_from(ticks).unwrap_or(u64::MAX)
}

/// Duration covered by `ticks` host ticks
pub fn ticks_to_duration(ticks: u64, tick: Duration) -> Duration {
    let nanos = tick.as_nanos().max(1) * u128::from(ticks);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Round a millisecond value up to host tick resolution
#[inline]
pub fn quantize(ms: Millis, tick: Duration) -> Duration {
    ticks_to_duration(millis_to_ticks(ms, tick), tick)
}
