// Copyright 2026 the timer-sched authors. MIT license.

//! Ad-hoc sweep harness comparing the five scheduler variants under a
//! common workload, printed as a results table. This is the spiritual
//! successor of the original source's `Benchmark.h`/`test/main.cpp`
//! pairing, minus the custom gflags-style registry: flags here are a
//! plain `clap` derive struct and each scenario is just a function.

use std::time::Instant;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use timer_core::{create_scheduler, Variant};

#[derive(Parser, Debug)]
#[command(name = "timer-bench", about = "Compare timer-core scheduler variants")]
struct Flags {
    /// Minimum number of timers to start per scenario.
    #[arg(long, default_value_t = 10_000)]
    min_iterations: u64,

    /// Soft wall-clock budget per scenario, in milliseconds.
    #[arg(long, default_value_t = 2_000)]
    time_budget_ms: u64,

    /// Only run variants whose display name contains this substring
    /// (e.g. "wheel" to run just the two wheel variants).
    #[arg(long)]
    filter: Option<String>,
}

struct Report {
    variant: Variant,
    started: u64,
    fired: u64,
    elapsed_ms: f64,
}

fn run_dense_insert_cancel_drain(variant: Variant, iterations: u64, budget_ms: u64) -> Report {
    let mut sched = create_scheduler(variant);
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let started_at = Instant::now();
    let mut started = 0u64;
    let mut ids = Vec::with_capacity(iterations as usize);

    while started < iterations && started_at.elapsed().as_millis() < budget_ms as u128 {
        let duration = rng.gen_range(0..5_000);
        let id = sched.start(duration, Box::new(|_| {}));
        ids.push(id);
        started += 1;
    }

    for id in &ids {
        if rng.gen_bool(0.3) {
            sched.cancel(*id);
        }
    }

    let wall = timer_core::clock::current_time_ms();
    let mut fired = 0u64;
    for step in 0..6_000i64 {
        fired += sched.tick(wall + step) as u64;
    }

    Report {
        variant,
        started,
        fired,
        elapsed_ms: started_at.elapsed().as_secs_f64() * 1000.0,
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let flags = Flags::parse();

    log::info!(
        "running dense insert/cancel/drain sweep: min_iterations={}, time_budget_ms={}",
        flags.min_iterations,
        flags.time_budget_ms
    );

    println!("{:<20} {:>12} {:>12} {:>12}", "variant", "started", "fired", "elapsed_ms");
    for variant in Variant::ALL {
        let name = variant.to_string();
        if let Some(filter) = &flags.filter {
            if !name.contains(filter.as_str()) {
                continue;
            }
        }
        let report = run_dense_insert_cancel_drain(variant, flags.min_iterations, flags.time_budget_ms);
        println!(
            "{:<20} {:>12} {:>12} {:>12.2}",
            name, report.started, report.fired, report.elapsed_ms
        );
    }

    Ok(())
}
