// Copyright 2026 the timer-sched authors. MIT license.

//! A single-level hashed timing wheel: 512 buckets of 100ms each.
//!
//! Timers more than 51.2 seconds out wrap around the wheel and wait for
//! `remaining_rounds` more full revolutions before they're eligible.
//! Intrusive bucket lists are realized as an arena of doubly-linked
//! nodes addressed by a small integer handle (Design Notes: this
//! eliminates the raw-pointer aliasing of the original source without
//! changing the wheel's O(1) amortized complexity).
//!
//! A bucket's entries become eligible once the *tick boundary* they sit
//! behind is reached, not once the caller's raw `now_ms` passes their
//! exact deadline (`HashedWheelTimer.cpp`'s `Tick` expires against
//! `started_at + TICK_DURATION*(ticks+1)`, not `now`) — the wheel only
//! ever had 100ms resolution, so a deadline that doesn't land on a tick
//! boundary is still due the moment its bucket is visited.

use std::collections::HashMap;

use crate::contract::{Action, Millis, Scheduler, TimerId, Variant};
use crate::error::{log_clock_regression, Invariant};
use crate::id::IdAllocator;

const WHEEL_SIZE: usize = 512;
const TICK_DURATION_MS: i64 = 100;

struct Node {
    id: TimerId,
    deadline: Millis,
    remaining_rounds: i64,
    action: Option<Action>,
    /// The bucket this node currently lives in, or `None` while it sits
    /// in `deferred` waiting for the next `tick` call.
    bucket: Option<usize>,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Default, Clone, Copy)]
struct Bucket {
    head: Option<usize>,
    tail: Option<usize>,
}

pub struct HashedWheelScheduler {
    arena: Vec<Option<Node>>,
    free: Vec<usize>,
    buckets: Vec<Bucket>,
    /// Timers whose placement landed at or behind the wheel's own
    /// `current_tick` — almost always a duration-0 timer started
    /// reentrantly from inside a firing action. These bypass the wheel
    /// entirely and are drained unconditionally at the top of the next
    /// `tick` call, so they're never stuck waiting out a bucket the
    /// wheel has already passed (possibly a full revolution away).
    deferred: Vec<usize>,
    index: HashMap<TimerId, usize>,
    current_tick: i64,
    started_at: Millis,
    ids: IdAllocator,
    last_now: Option<Millis>,
}

impl HashedWheelScheduler {
    pub fn new() -> Self {
        Self {
            arena: Vec::new(),
            free: Vec::new(),
            buckets: vec![Bucket::default(); WHEEL_SIZE],
            deferred: Vec::new(),
            index: HashMap::new(),
            current_tick: 0,
            started_at: crate::clock::current_time_ms(),
            ids: IdAllocator::new(),
            last_now: None,
        }
    }

    fn alloc_slot(&mut self, node: Node) -> usize {
        if let Some(slot) = self.free.pop() {
            self.arena[slot] = Some(node);
            slot
        } else {
            self.arena.push(Some(node));
            self.arena.len() - 1
        }
    }

    fn take_node(&mut self, slot: usize) -> Node {
        let node = self.arena[slot].take().expect("slot holds a live node");
        self.free.push(slot);
        node
    }

    fn append(&mut self, bucket_idx: usize, slot: usize) {
        let tail = self.buckets[bucket_idx].tail;
        {
            let node = self.arena[slot].as_mut().expect("slot holds a live node");
            node.prev = tail;
            node.next = None;
            node.bucket = Some(bucket_idx);
        }
        match tail {
            Some(t) => self.arena[t].as_mut().unwrap().next = Some(slot),
            None => self.buckets[bucket_idx].head = Some(slot),
        }
        self.buckets[bucket_idx].tail = Some(slot);
    }

    fn unlink(&mut self, bucket_idx: usize, slot: usize) {
        let (prev, next) = {
            let node = self.arena[slot].as_ref().expect("slot holds a live node");
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.arena[p].as_mut().unwrap().next = next,
            None => self.buckets[bucket_idx].head = next,
        }
        match next {
            Some(n) => self.arena[n].as_mut().unwrap().prev = prev,
            None => self.buckets[bucket_idx].tail = prev,
        }
    }

    /// Detach the entire bucket's list into a work-list of arena slots,
    /// in FIFO (insertion) order, leaving the bucket empty. Processing a
    /// snapshot rather than walking the live list means a reentrant
    /// `start` from inside a fired action can never be appended to and
    /// then observed within the same pass over this bucket.
    fn detach_bucket(&mut self, bucket_idx: usize) -> Vec<usize> {
        let mut work = Vec::new();
        let mut cursor = self.buckets[bucket_idx].head;
        while let Some(slot) = cursor {
            let node = self.arena[slot].as_mut().expect("slot holds a live node");
            cursor = node.next;
            node.prev = None;
            node.next = None;
            work.push(slot);
        }
        self.buckets[bucket_idx] = Bucket::default();
        work
    }

    fn place(&mut self, id: TimerId, deadline: Millis, action: Option<Action>) {
        let calculated = (deadline - self.started_at) / TICK_DURATION_MS;
        if calculated <= self.current_tick {
            let node = Node {
                id,
                deadline,
                remaining_rounds: 0,
                action,
                bucket: None,
                prev: None,
                next: None,
            };
            let arena_slot = self.alloc_slot(node);
            self.deferred.push(arena_slot);
            self.index.insert(id, arena_slot);
            return;
        }
        let remaining_rounds = (calculated - self.current_tick) / WHEEL_SIZE as i64;
        let slot = (calculated.max(self.current_tick)) as usize % WHEEL_SIZE;
        let node = Node {
            id,
            deadline,
            remaining_rounds,
            action,
            bucket: None,
            prev: None,
            next: None,
        };
        let arena_slot = self.alloc_slot(node);
        self.append(slot, arena_slot);
        self.index.insert(id, arena_slot);
    }
}

impl Default for HashedWheelScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for HashedWheelScheduler {
    fn start(&mut self, duration_ms: u32, action: Action) -> TimerId {
        let id = self.ids.alloc();
        let deadline = crate::clock::current_time_ms() + duration_ms as i64;
        self.place(id, deadline, Some(action));
        id
    }

    fn cancel(&mut self, id: TimerId) -> bool {
        let Some(&slot) = self.index.get(&id) else {
            return false;
        };
        let bucket = match self.arena.get(slot).and_then(Option::as_ref) {
            Some(node) if node.id == id => node.bucket,
            _ => Invariant::OrphanedIdIndexEntry { id }.fatal(),
        };
        match bucket {
            Some(bucket_idx) => self.unlink(bucket_idx, slot),
            None => self.deferred.retain(|&s| s != slot),
        }
        self.take_node(slot);
        self.index.remove(&id);
        true
    }

    fn tick(&mut self, now_ms: Millis) -> usize {
        if let Some(prev) = self.last_now {
            if now_ms < prev {
                log_clock_regression("hashed-wheel", prev, now_ms);
                return 0;
            }
        }
        self.last_now = Some(now_ms);

        let max_id = self.ids.max_issued();
        let mut fired = 0usize;

        // Entries deferred to "the very next tick call" bypass the
        // wheel's own advancing clock entirely, so they fire even if
        // `current_tick` already passed `now_ms` on a prior call with
        // the same argument.
        let deferred = std::mem::take(&mut self.deferred);
        for slot in deferred {
            self.process_deferred(slot, now_ms, max_id, &mut fired);
        }

        loop {
            let boundary = self.started_at + TICK_DURATION_MS * (self.current_tick + 1);
            if boundary > now_ms {
                break;
            }
            let bucket_idx = (self.current_tick as usize) % WHEEL_SIZE;
            let work = self.detach_bucket(bucket_idx);
            for slot in work {
                self.process_detached(slot, bucket_idx, boundary, max_id, &mut fired);
            }
            self.current_tick += 1;
        }
        fired
    }

    fn size(&self) -> usize {
        self.index.len()
    }

    fn variant(&self) -> Variant {
        Variant::HashedWheel
    }
}

impl HashedWheelScheduler {
    fn process_deferred(&mut self, slot: usize, now_ms: Millis, max_id: TimerId, fired: &mut usize) {
        let (id, deadline) = {
            let node = self.arena[slot].as_ref().unwrap();
            (node.id, node.deadline)
        };
        if deadline <= now_ms && id <= max_id {
            let mut node = self.take_node(slot);
            self.index.remove(&id);
            let action = node.action.take().expect("action present until fired");
            action(self);
            *fired += 1;
        } else {
            self.deferred.push(slot);
        }
    }

    fn process_detached(
        &mut self,
        slot: usize,
        bucket_idx: usize,
        boundary: Millis,
        max_id: TimerId,
        fired: &mut usize,
    ) {
        let remaining_rounds = self.arena[slot].as_ref().unwrap().remaining_rounds;
        if remaining_rounds > 0 {
            self.arena[slot].as_mut().unwrap().remaining_rounds -= 1;
            self.append(bucket_idx, slot);
            return;
        }

        let (id, deadline) = {
            let node = self.arena[slot].as_ref().unwrap();
            (node.id, node.deadline)
        };

        if deadline > boundary {
            Invariant::WheelMisplacement {
                id,
                deadline,
                now: boundary,
            }
            .fatal();
        }

        if id > max_id {
            // A timer started with duration ~0 from inside an action
            // fired earlier in this very tick call landed back in the
            // bucket this pass already snapshotted. Defer it rather
            // than re-appending it here, where it would wait out a
            // full revolution before being revisited.
            self.arena[slot].as_mut().unwrap().bucket = None;
            self.deferred.push(slot);
            return;
        }

        let mut node = self.take_node(slot);
        self.index.remove(&id);
        let action = node.action.take().expect("action present until fired");
        action(self);
        *fired += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn fresh_clock() {
        clock::time_reset();
    }

    #[test]
    fn placement_lands_in_expected_slot_for_immediate_timer() {
        fresh_clock();
        let mut sched = HashedWheelScheduler::new();
        let id = sched.start(0, Box::new(|_| {}));
        let slot = sched.index[&id];
        assert_eq!(sched.arena[slot].as_ref().unwrap().remaining_rounds, 0);
    }

    #[test]
    fn far_future_timer_gets_positive_remaining_rounds() {
        fresh_clock();
        let mut sched = HashedWheelScheduler::new();
        // 51200ms = one full revolution (512 * 100ms); ask for a bit more.
        let id = sched.start(60_000, Box::new(|_| {}));
        let slot = sched.index[&id];
        assert!(sched.arena[slot].as_ref().unwrap().remaining_rounds >= 1);
    }

    #[test]
    fn fires_exactly_once_at_or_after_deadline() {
        fresh_clock();
        let mut sched = HashedWheelScheduler::new();
        let fired = Rc::new(RefCell::new(0));
        let f = fired.clone();
        sched.start(250, Box::new(move |_: &mut dyn Scheduler| *f.borrow_mut() += 1));

        let start = clock::current_time_ms();
        assert_eq!(sched.tick(start), 0);
        assert_eq!(sched.tick(start + 100), 0);
        assert_eq!(sched.tick(start + 200), 0);
        let total = sched.tick(start + 300);
        assert_eq!(total, 1);
        assert_eq!(*fired.borrow(), 1);
        assert_eq!(sched.size(), 0);
    }

    #[test]
    fn cancel_before_fire_prevents_invocation() {
        fresh_clock();
        let mut sched = HashedWheelScheduler::new();
        let id = sched.start(100, Box::new(|_| panic!("must not fire")));
        assert!(sched.cancel(id));
        assert!(!sched.cancel(id));
        let fired = sched.tick(clock::current_time_ms() + 2_000);
        assert_eq!(fired, 0);
    }

    #[test]
    fn dense_cancellation_fires_only_uncancelled_half() {
        fresh_clock();
        let mut sched = HashedWheelScheduler::new();
        let mut ids = Vec::new();
        let fired = Rc::new(RefCell::new(0usize));
        for i in 0..200u32 {
            let f = fired.clone();
            let d = 1 + (i * 37) % 5000;
            ids.push(sched.start(d, Box::new(move |_: &mut dyn Scheduler| *f.borrow_mut() += 1)));
        }
        for (i, id) in ids.iter().enumerate() {
            if i % 2 == 0 {
                assert!(sched.cancel(*id));
            }
        }
        let start = clock::current_time_ms();
        let mut total = 0;
        let mut t = start;
        while t <= start + 6_000 {
            total += sched.tick(t);
            t += 1;
        }
        assert_eq!(total, 100);
        assert_eq!(*fired.borrow(), 100);
        assert_eq!(sched.size(), 0);
    }
}
