// Copyright 2026 the timer-sched authors. MIT license.

//! The "fatal assertion sink" named in the contract: invariant violations
//! are bugs, not recoverable conditions, so they are logged and then
//! panic rather than threaded through `Result`.

use crate::contract::{Millis, TimerId};

/// An invariant violation detected by a scheduler. Constructing one of
/// these and never calling [`Invariant::fatal`] is itself a bug in the
/// caller; the type exists so the failure mode is documented and
/// testable rather than an anonymous `unreachable!()`.
#[derive(Debug, thiserror::Error)]
pub enum Invariant {
    #[error(
        "timer {id} sat in wheel slot with remaining_rounds <= 0 but deadline {deadline} > now {now}"
    )]
    WheelMisplacement {
        id: TimerId,
        deadline: Millis,
        now: Millis,
    },

    #[error("timer {id} present in id index but unreachable from the primary structure")]
    OrphanedIdIndexEntry { id: TimerId },

    #[error(
        "heap index back-pointer for timer {id} recorded slot {recorded} but timer is actually at {actual}"
    )]
    HeapIndexMismatch {
        id: TimerId,
        recorded: usize,
        actual: usize,
    },
}

impl Invariant {
    /// Log the violation at `error` level and abort the process. This is
    /// the library's only panicking path; every other failure mode is
    /// total (returns `bool`/`0`/`usize`).
    #[cold]
    pub fn fatal(self) -> ! {
        log::error!("invariant violation: {self}");
        panic!("invariant violation: {self}");
    }
}

/// Log a clock regression at `error` level. `tick` callers see this as a
/// `0` return with no other side effect.
pub(crate) fn log_clock_regression(variant: &str, previous_now: Millis, now: Millis) {
    log::error!(
        "{variant}: tick observed clock regression ({now} < previous {previous_now}); ignoring"
    );
}
