// Copyright 2026 the timer-sched authors. MIT license.

//! The ordered-tree scheduler: a `BTreeMap<(deadline, id), action>`.
//!
//! The design document treats "a generic ordered-map implementation" as
//! an external collaborator, specified only where its semantics differ
//! from a standard balanced tree — they don't differ here, so
//! `std::collections::BTreeMap` fills the role directly. Its natural
//! ordering over the `(Millis, TimerId)` tuple key already gives the
//! lexicographic deadline-then-id order the contract requires.

use std::collections::{BTreeMap, HashMap};

use crate::contract::{Action, Millis, Scheduler, TimerId, Variant};
use crate::error::{log_clock_regression, Invariant};
use crate::id::IdAllocator;

type NodeKey = (Millis, TimerId);

pub struct TreeScheduler {
    tree: BTreeMap<NodeKey, Action>,
    index: HashMap<TimerId, NodeKey>,
    ids: IdAllocator,
    last_now: Option<Millis>,
}

impl TreeScheduler {
    pub fn new() -> Self {
        Self {
            tree: BTreeMap::new(),
            index: HashMap::new(),
            ids: IdAllocator::new(),
            last_now: None,
        }
    }
}

impl Default for TreeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TreeScheduler {
    fn start(&mut self, duration_ms: u32, action: Action) -> TimerId {
        let id = self.ids.alloc();
        let deadline = crate::clock::current_time_ms() + duration_ms as i64;
        let key = (deadline, id);
        self.tree.insert(key, action);
        self.index.insert(id, key);
        id
    }

    fn cancel(&mut self, id: TimerId) -> bool {
        let Some(key) = self.index.remove(&id) else {
            return false;
        };
        if self.tree.remove(&key).is_none() {
            Invariant::OrphanedIdIndexEntry { id }.fatal();
        }
        true
    }

    fn tick(&mut self, now_ms: Millis) -> usize {
        if let Some(prev) = self.last_now {
            if now_ms < prev {
                log_clock_regression("tree", prev, now_ms);
                return 0;
            }
        }
        self.last_now = Some(now_ms);

        let max_id = self.ids.max_issued();
        let mut fired = 0usize;
        loop {
            let Some((&key, _)) = self.tree.iter().next() else {
                break;
            };
            if key.0 > now_ms || key.1 > max_id {
                break;
            }
            let action = self.tree.remove(&key).expect("key just observed present");
            self.index.remove(&key.1);
            action(self);
            fired += 1;
        }
        fired
    }

    fn size(&self) -> usize {
        self.tree.len()
    }

    fn variant(&self) -> Variant {
        Variant::Tree
    }
}
