// Copyright 2026 the timer-sched authors. MIT license.

//! A d-ary min-heap scheduler, generic over its branching factor `D`.
//!
//! The binary heap (`D = 2`) and the 4-ary heap (`D = 4`) named in the
//! design are the same algorithm at different constants: same sift-up,
//! same sift-down-by-pairs, same index back-pointer discipline. Sharing
//! the implementation does not change either variant's asymptotic or
//! constant-factor behavior (the const generic is monomorphized
//! separately for each `D`), it just avoids maintaining two copies of
//! the same forty lines of pointer-juggling.

use std::collections::HashMap;

use crate::contract::{Action, Millis, Scheduler, TimerId, Variant};
use crate::error::{log_clock_regression, Invariant};
use crate::id::IdAllocator;

struct Entry {
    id: TimerId,
    deadline: Millis,
    action: Option<Action>,
}

fn key(e: &Entry) -> (Millis, TimerId) {
    (e.deadline, e.id)
}

/// A min-heap of `(deadline, id)` with `D` children per node and an id
/// index tracking each timer's current array slot for O(log_D n)
/// cancellation.
pub struct DHeapScheduler<const D: usize> {
    heap: Vec<Entry>,
    index: HashMap<TimerId, usize>,
    ids: IdAllocator,
    last_now: Option<Millis>,
}

/// The binary heap scheduler (`D = 2`).
pub type BinaryHeapScheduler = DHeapScheduler<2>;
/// The 4-ary heap scheduler (`D = 4`).
pub type QuadHeapScheduler = DHeapScheduler<4>;

impl<const D: usize> DHeapScheduler<D> {
    pub fn new() -> Self {
        assert!(D >= 2, "heap arity must be at least 2");
        Self {
            heap: Vec::new(),
            index: HashMap::new(),
            ids: IdAllocator::new(),
            last_now: None,
        }
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        self.index.insert(self.heap[i].id, i);
        self.index.insert(self.heap[j].id, j);
    }

    fn parent(i: usize) -> Option<usize> {
        if i == 0 {
            None
        } else {
            Some((i - 1) / D)
        }
    }

    fn first_child(i: usize) -> Option<usize> {
        // Guards against the overflow edge case explicitly: an
        // overflowing child-index computation is treated as "no child".
        i.checked_mul(D).and_then(|base| base.checked_add(1))
    }

    fn sift_up(&mut self, mut i: usize) {
        while let Some(p) = Self::parent(i) {
            if key(&self.heap[i]) < key(&self.heap[p]) {
                self.swap(i, p);
                i = p;
            } else {
                break;
            }
        }
    }

    /// Returns whether any swap occurred.
    fn sift_down(&mut self, mut i: usize) -> bool {
        let start = i;
        loop {
            let Some(first) = Self::first_child(i) else {
                break;
            };
            if first >= self.heap.len() {
                break;
            }
            let last = (first + D).min(self.heap.len());

            // Compare children in pairs: one comparison to find each
            // pair's winner, one more to fold it against the running
            // smallest, instead of D-1 linear comparisons.
            let mut smallest = i;
            let mut c = first;
            while c < last {
                let candidate = if c + 1 < last && key(&self.heap[c + 1]) < key(&self.heap[c]) {
                    c + 1
                } else {
                    c
                };
                if key(&self.heap[candidate]) < key(&self.heap[smallest]) {
                    smallest = candidate;
                }
                c += 2;
            }

            if smallest == i {
                break;
            }
            self.swap(i, smallest);
            i = smallest;
        }
        i != start
    }

    fn variant_of() -> Variant {
        match D {
            2 => Variant::BinaryHeap,
            4 => Variant::QuadHeap,
            _ => panic!("DHeapScheduler is only wired up for D = 2 and D = 4"),
        }
    }
}

impl<const D: usize> Default for DHeapScheduler<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize> Scheduler for DHeapScheduler<D> {
    fn start(&mut self, duration_ms: u32, action: Action) -> TimerId {
        let id = self.ids.alloc();
        let deadline = crate::clock::current_time_ms() + duration_ms as i64;
        let idx = self.heap.len();
        self.heap.push(Entry {
            id,
            deadline,
            action: Some(action),
        });
        self.index.insert(id, idx);
        self.sift_up(idx);
        id
    }

    fn cancel(&mut self, id: TimerId) -> bool {
        let Some(&i) = self.index.get(&id) else {
            return false;
        };
        match self.heap.get(i) {
            Some(entry) if entry.id == id => {}
            Some(_) => {
                let actual = self.heap.iter().position(|e| e.id == id).unwrap_or(usize::MAX);
                Invariant::HeapIndexMismatch {
                    id,
                    recorded: i,
                    actual,
                }
                .fatal();
            }
            None => Invariant::OrphanedIdIndexEntry { id }.fatal(),
        }
        let last = self.heap.len() - 1;
        self.swap(i, last);
        self.index.remove(&id);
        self.heap.pop();
        if i < self.heap.len() && !self.sift_down(i) {
            self.sift_up(i);
        }
        true
    }

    fn tick(&mut self, now_ms: Millis) -> usize {
        if let Some(prev) = self.last_now {
            if now_ms < prev {
                log_clock_regression(&Self::variant_of().to_string(), prev, now_ms);
                return 0;
            }
        }
        self.last_now = Some(now_ms);

        let max_id = self.ids.max_issued();
        let mut fired = 0usize;
        loop {
            let due = matches!(self.heap.first(), Some(top) if top.deadline <= now_ms && top.id <= max_id);
            if !due {
                break;
            }
            let last = self.heap.len() - 1;
            self.swap(0, last);
            let mut entry = self.heap.pop().expect("heap is non-empty");
            self.index.remove(&entry.id);
            if !self.heap.is_empty() {
                self.sift_down(0);
            }
            let action = entry.action.take().expect("entry action taken exactly once");
            action(self);
            fired += 1;
        }
        fired
    }

    fn size(&self) -> usize {
        self.heap.len()
    }

    fn variant(&self) -> Variant {
        Self::variant_of()
    }
}
