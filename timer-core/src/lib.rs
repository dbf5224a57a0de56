// Copyright 2026 the timer-sched authors. MIT license.

//! # timer-core
//!
//! Five interchangeable one-shot timer schedulers behind a single contract:
//! a binary min-heap, a 4-ary min-heap, a `BTreeMap`-backed ordered tree, a
//! single-level hashed timing wheel, and a 9-level hierarchical timing
//! wheel. All five accept `start(duration, action) -> id`, `cancel(id)`,
//! `tick(now_ms) -> fired_count`, and `size()`, and agree on exact fire
//! ordering (ascending `(deadline, id)`, FIFO within a deadline).
//!
//! Pick a variant with [`create_scheduler`]; drive it with an external
//! clock, typically [`clock::current_time_ms`].

pub mod clock;
pub mod contract;
pub mod dheap;
pub mod error;
pub mod hashed_wheel;
pub mod hierarchical_wheel;
pub mod id;
pub mod tree;

pub use contract::{create_scheduler, Action, Millis, Scheduler, TimerId, Variant};
