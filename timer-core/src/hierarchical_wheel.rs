// Copyright 2026 the timer-sched authors. MIT license.

//! A 9-level hierarchical timing wheel, modeled after the hierarchical
//! wheel timer of a well-known monolithic kernel: 64 slots per level,
//! each level covering 8x the range of the one below it. A timer's
//! placement migrates from coarse to fine levels as the clock
//! approaches its deadline — the **cascade**.
//!
//! Bucket lists are an arena of doubly-linked nodes (see
//! [`crate::hashed_wheel`] for the same technique at a single level);
//! the source's singly-linked "hash lists" can't support the O(1)
//! arbitrary cancel the contract requires, so both wheel variants here
//! share the doubly-linked arena design instead.
//!
//! A timer placed at or behind the wheel's own `clk` — typically a
//! duration-0 timer started reentrantly from inside a firing action —
//! is parked in a side list and drained unconditionally at the top of
//! the next `tick` call, rather than being placed into a slot `clk` has
//! already passed this revolution.

use std::collections::HashMap;

use crate::contract::{Action, Millis, Scheduler, TimerId, Variant};
use crate::error::{log_clock_regression, Invariant};
use crate::id::IdAllocator;

const LVL_SIZE: usize = 64;
const LVL_DEPTH: usize = 9;
const LVL_CLK_SHIFT: u32 = 3;
const WHEEL_SIZE: usize = LVL_SIZE * LVL_DEPTH;
const LVL_MASK: i64 = (LVL_SIZE as i64) - 1;

const fn lvl_gran(level: u32) -> i64 {
    1i64 << (level * LVL_CLK_SHIFT)
}

const fn lvl_start(level: u32) -> i64 {
    if level == 0 {
        0
    } else {
        LVL_MASK << ((level - 1) * LVL_CLK_SHIFT)
    }
}

const WHEEL_TIMEOUT_CUTOFF: i64 = lvl_start(LVL_DEPTH as u32);
const PENDING_WORDS: usize = (WHEEL_SIZE + 63) / 64;

struct Node {
    id: TimerId,
    deadline: Millis,
    action: Option<Action>,
    /// The flat wheel slot this node currently lives in, or `None` while
    /// it sits in `deferred` waiting for the next `tick` call.
    slot: Option<usize>,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Default, Clone, Copy)]
struct Bucket {
    head: Option<usize>,
    tail: Option<usize>,
}

pub struct HierarchicalWheelScheduler {
    arena: Vec<Option<Node>>,
    free: Vec<usize>,
    vectors: Vec<Bucket>,
    pending: [u64; PENDING_WORDS],
    /// Tick counter in the same absolute-millisecond frame as every
    /// stored deadline, so `compute_slot`'s `deadline - clk` arithmetic
    /// never has to reconcile a relative and an absolute timestamp.
    clk: i64,
    /// Timers whose placement landed at or behind `clk` — almost always
    /// a duration-0 timer started reentrantly from inside a firing
    /// action. Drained unconditionally at the top of the next `tick`
    /// call, so they're never stuck waiting for the wheel's own clock
    /// to advance (which, with the same `now_ms` repeated, might never
    /// happen again).
    deferred: Vec<usize>,
    index: HashMap<TimerId, usize>,
    ids: IdAllocator,
    last_now: Option<Millis>,
}

impl HierarchicalWheelScheduler {
    pub fn new() -> Self {
        Self {
            arena: Vec::new(),
            free: Vec::new(),
            vectors: vec![Bucket::default(); WHEEL_SIZE],
            pending: [0u64; PENDING_WORDS],
            clk: crate::clock::current_time_ms(),
            deferred: Vec::new(),
            index: HashMap::new(),
            ids: IdAllocator::new(),
            last_now: None,
        }
    }

    fn pending_get(&self, idx: usize) -> bool {
        self.pending[idx / 64] & (1u64 << (idx % 64)) != 0
    }

    fn pending_set(&mut self, idx: usize) {
        self.pending[idx / 64] |= 1u64 << (idx % 64);
    }

    fn pending_clear(&mut self, idx: usize) {
        self.pending[idx / 64] &= !(1u64 << (idx % 64));
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

    fn append(&mut self, idx: usize, slot: usize) {
        let tail = self.vectors[idx].tail;
        {
            let node = self.arena[slot].as_mut().expect("slot holds a live node");
            node.prev = tail;
            node.next = None;
            node.slot = Some(idx);
        }
        match tail {
            Some(t) => self.arena[t].as_mut().unwrap().next = Some(slot),
            None => self.vectors[idx].head = Some(slot),
        }
        self.vectors[idx].tail = Some(slot);
        self.pending_set(idx);
    }

    fn unlink(&mut self, idx: usize, slot: usize) {
        let (prev, next) = {
            let node = self.arena[slot].as_ref().expect("slot holds a live node");
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.arena[p].as_mut().unwrap().next = next,
            None => self.vectors[idx].head = next,
        }
        match next {
            Some(n) => self.arena[n].as_mut().unwrap().prev = prev,
            None => self.vectors[idx].tail = prev,
        }
        if self.vectors[idx].head.is_none() {
            self.pending_clear(idx);
        }
    }

    /// Detach `vectors[idx]` entirely into a work-list of arena slots, in
    /// FIFO order, clearing the pending bit in the same step.
    fn detach_slot(&mut self, idx: usize) -> Vec<usize> {
        let mut work = Vec::new();
        let mut cursor = self.vectors[idx].head;
        while let Some(slot) = cursor {
            let node = self.arena[slot].as_mut().expect("slot holds a live node");
            cursor = node.next;
            node.prev = None;
            node.next = None;
            work.push(slot);
        }
        self.vectors[idx] = Bucket::default();
        self.pending_clear(idx);
        work
    }

    /// Flat slot index (`0..WHEEL_SIZE`) for `deadline` given the
    /// current `clk`, per the hierarchical wheel's level/slot formula.
    fn compute_slot(&self, deadline: Millis) -> usize {
        let clk = self.clk;
        let delta = deadline - clk;
        if delta < 0 {
            return (clk & LVL_MASK) as usize;
        }
        if delta >= WHEEL_TIMEOUT_CUTOFF {
            let level = (LVL_DEPTH - 1) as u32;
            let expires = clk + WHEEL_TIMEOUT_CUTOFF - lvl_gran(LVL_DEPTH as u32 - 1);
            let inner = ((expires + lvl_gran(level)) >> (level * LVL_CLK_SHIFT)) & LVL_MASK;
            return (level as usize) * LVL_SIZE + inner as usize;
        }
        let mut level = 0u32;
        while (level as usize) < LVL_DEPTH - 1 && delta >= lvl_start(level + 1) {
            level += 1;
        }
        let inner = ((deadline + lvl_gran(level)) >> (level * LVL_CLK_SHIFT)) & LVL_MASK;
        (level as usize) * LVL_SIZE + inner as usize
    }

    fn place(&mut self, id: TimerId, deadline: Millis, action: Option<Action>) {
        if deadline <= self.clk {
            let node = Node {
                id,
                deadline,
                action,
                slot: None,
                prev: None,
                next: None,
            };
            let arena_slot = self.alloc_slot(node);
            self.deferred.push(arena_slot);
            self.index.insert(id, arena_slot);
            return;
        }
        let idx = self.compute_slot(deadline);
        let node = Node {
            id,
            deadline,
            action,
            slot: None,
            prev: None,
            next: None,
        };
        let arena_slot = self.alloc_slot(node);
        self.append(idx, arena_slot);
        self.index.insert(id, arena_slot);
    }

    /// Collect every non-empty slot reachable by cascading from level 0
    /// at tick value `t`, deepest level stopped at first un-rolled-over
    /// level. Returns `(level, arena slots)` pairs in level order
    /// (shallow to deep); re-insertion walks this list in reverse so
    /// coarser levels are re-placed before finer ones, matching the
    /// deadline arithmetic that depends on the *current* `clk`.
    fn collect_expired(&mut self, t: i64) -> Vec<(usize, Vec<usize>)> {
        let mut collected = Vec::new();
        for level in 0..LVL_DEPTH {
            if level > 0 {
                let mask = (1i64 << ((level as u32) * LVL_CLK_SHIFT)) - 1;
                if t & mask != 0 {
                    break;
                }
            }
            let t_i = t >> (level as u32 * LVL_CLK_SHIFT);
            let idx = (t_i & LVL_MASK) as usize + level * LVL_SIZE;
            if self.pending_get(idx) {
                let work = self.detach_slot(idx);
                collected.push((level, work));
            }
        }
        collected
    }

    fn reinsert_or_fire(
        &mut self,
        slot: usize,
        now_ms: Millis,
        max_id: TimerId,
        fired: &mut usize,
    ) {
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
            return;
        }
        let mut node = self.take_node(slot);
        let action = node.action.take();
        self.place(id, deadline, action);
    }

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
}

impl Default for HierarchicalWheelScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for HierarchicalWheelScheduler {
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
        let idx = match self.arena.get(slot).and_then(Option::as_ref) {
            Some(node) if node.id == id => node.slot,
            _ => Invariant::OrphanedIdIndexEntry { id }.fatal(),
        };
        match idx {
            Some(i) => self.unlink(i, slot),
            None => self.deferred.retain(|&s| s != slot),
        }
        self.take_node(slot);
        self.index.remove(&id);
        true
    }

    fn tick(&mut self, now_ms: Millis) -> usize {
        if let Some(prev) = self.last_now {
            if now_ms < prev {
                log_clock_regression("hierarchical-wheel", prev, now_ms);
                return 0;
            }
        }
        self.last_now = Some(now_ms);

        let max_id = self.ids.max_issued();
        let target = now_ms;
        let mut fired = 0usize;

        // Entries deferred to "the very next tick call" bypass `clk`
        // entirely, so they fire even if `clk` already passed `now_ms`
        // on a prior call with the same argument.
        let deferred = std::mem::take(&mut self.deferred);
        for slot in deferred {
            self.process_deferred(slot, now_ms, max_id, &mut fired);
        }

        while self.clk <= target {
            let t = self.clk;
            let collected = self.collect_expired(t);
            self.clk += 1;
            for (_, work) in collected.into_iter().rev() {
                for slot in work {
                    self.reinsert_or_fire(slot, now_ms, max_id, &mut fired);
                }
            }
        }
        fired
    }

    fn size(&self) -> usize {
        self.index.len()
    }

    fn variant(&self) -> Variant {
        Variant::HierarchicalWheel
    }
}
