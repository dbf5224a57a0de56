// Copyright 2026 the timer-sched authors. MIT license.

//! Process-wide monotonic clock with a test-only offset.
//!
//! `start` on every [`crate::Scheduler`] reads [`current_time_ms`] to
//! compute a timer's deadline; `tick` is driven explicitly by the caller
//! with its own notion of "now" (usually also [`current_time_ms`]). Tests
//! use [`time_fly`] / [`time_reset`] to move the clock without sleeping.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use once_cell::sync::Lazy;

static BASELINE: Lazy<Instant> = Lazy::new(Instant::now);
static OFFSET_MS: AtomicI64 = AtomicI64::new(0);

/// Current monotonic time in milliseconds, with any test offset applied.
pub fn current_time_ms() -> i64 {
    let elapsed_ms = BASELINE.elapsed().as_millis() as i64;
    elapsed_ms + OFFSET_MS.load(Ordering::Relaxed)
}

/// Advance (or rewind, with a negative `delta_ms`) the test clock offset.
///
/// Production callers never call this; it exists for deterministic tests
/// that want to "fly" past a deadline without sleeping the thread.
pub fn time_fly(delta_ms: i64) {
    OFFSET_MS.fetch_add(delta_ms, Ordering::Relaxed);
}

/// Reset the test clock offset to zero.
pub fn time_reset() {
    OFFSET_MS.store(0, Ordering::Relaxed);
}

/// Render a monotonic millisecond timestamp as `HH:MM:SS.mmm` elapsed
/// since process start. Diagnostic only; not contract-bearing.
pub fn current_time_string(ms: i64) -> String {
    let ms = ms.max(0);
    let millis = ms % 1000;
    let total_secs = ms / 1000;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    let mins = total_mins % 60;
    let hours = total_mins / 60;
    format!("{hours:02}:{mins:02}:{secs:02}.{millis:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_fly_advances_current_time() {
        time_reset();
        let before = current_time_ms();
        time_fly(10_000);
        let after = current_time_ms();
        assert!(after - before >= 10_000);
        time_reset();
    }

    #[test]
    fn time_reset_clears_offset() {
        time_fly(5_000);
        time_reset();
        let a = current_time_ms();
        let b = current_time_ms();
        assert!(b - a < 1_000);
    }

    #[test]
    fn current_time_string_formats_hms() {
        assert_eq!(current_time_string(0), "00:00:00.000");
        assert_eq!(current_time_string(61_234), "00:01:01.234");
        assert_eq!(current_time_string(3_661_001), "01:01:01.001");
    }
}
