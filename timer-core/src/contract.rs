// Copyright 2026 the timer-sched authors. MIT license.

//! The common contract all five scheduler variants implement, plus the
//! factory that selects among them.

use std::fmt;

/// Absolute or relative time in milliseconds. Deadlines and `tick`'s
/// `now_ms` are both `Millis`; durations passed to `start` are `u32`
/// (see [`Scheduler::start`]).
pub type Millis = i64;

/// A unique, non-zero, monotonically increasing timer identifier.
pub type TimerId = u64;

/// A one-shot, owned action. It receives a reborrow of the scheduler
/// that fired it, so a timer can `start` (or `cancel`) another timer
/// from inside its own callback without any interior mutability: by the
/// time an implementation invokes an action, the firing timer has
/// already been fully detached from the scheduler's internal state, so
/// handing back `&mut dyn Scheduler` here is an ordinary reborrow, not
/// an alias. Not `Send`: the contract is single-owner, single-thread
/// (see module docs).
pub type Action = Box<dyn FnOnce(&mut dyn Scheduler)>;

/// Which internal organization backs a [`Scheduler`]. `Display` renders
/// the same spelling used by the factory and by `timer-bench`'s
/// `--filter` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    BinaryHeap,
    QuadHeap,
    Tree,
    HashedWheel,
    HierarchicalWheel,
}

impl Variant {
    /// All five variants, in the order the benchmark harness reports them.
    pub const ALL: [Variant; 5] = [
        Variant::BinaryHeap,
        Variant::QuadHeap,
        Variant::Tree,
        Variant::HashedWheel,
        Variant::HierarchicalWheel,
    ];
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Variant::BinaryHeap => "binary-heap",
            Variant::QuadHeap => "quad-heap",
            Variant::Tree => "tree",
            Variant::HashedWheel => "hashed-wheel",
            Variant::HierarchicalWheel => "hierarchical-wheel",
        };
        f.write_str(s)
    }
}

/// The public operations every timer scheduler implements, independent
/// of its internal organization.
///
/// Implementors must fire timers in non-decreasing `(deadline, id)`
/// order, enforce the snapshot rule during `tick` (§4.1/§4.2 of the
/// design), and treat a clock regression between `tick` calls as a
/// logged no-op rather than an error return.
pub trait Scheduler {
    /// Schedule `action` to run `duration_ms` milliseconds from now
    /// (per [`crate::clock::current_time_ms`]) and return its id.
    fn start(&mut self, duration_ms: u32, action: Action) -> TimerId;

    /// Cancel the timer with the given id. Returns `true` if it was live
    /// and is now cancelled, `false` if it was unknown (already fired,
    /// already cancelled, or never existed).
    fn cancel(&mut self, id: TimerId) -> bool;

    /// Fire every live timer whose deadline is `<= now_ms`, subject to
    /// the snapshot rule, and return how many actions were invoked.
    fn tick(&mut self, now_ms: Millis) -> usize;

    /// Count of timers that are live (neither fired nor cancelled).
    fn size(&self) -> usize;

    /// Which variant this scheduler is.
    fn variant(&self) -> Variant;
}

/// Construct a scheduler of the requested variant.
pub fn create_scheduler(variant: Variant) -> Box<dyn Scheduler> {
    match variant {
        Variant::BinaryHeap => Box::new(crate::dheap::BinaryHeapScheduler::new()),
        Variant::QuadHeap => Box::new(crate::dheap::QuadHeapScheduler::new()),
        Variant::Tree => Box::new(crate::tree::TreeScheduler::new()),
        Variant::HashedWheel => Box::new(crate::hashed_wheel::HashedWheelScheduler::new()),
        Variant::HierarchicalWheel => {
            Box::new(crate::hierarchical_wheel::HierarchicalWheelScheduler::new())
        }
    }
}
