//! weft quickstart: a three-stage pipeline over two resources.
//!
//! Demonstrates:
//!   1. Declaring resources and units with read/write sets
//!   2. Dispatching work from a unit body onto the job system
//!   3. Running cycles in a fixed order with true refreshes
//!   4. The stale-handle pitfall and the refresh-and-wait fix
//!   5. Running the same schedule on a background thread
//!
//! Run with:
//!   RUST_LOG=weft_engine=debug cargo run --example quickstart

use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;
use weft_core::{ResourceId, ResourceSet, UnitId};
use weft_engine::{BackgroundScheduler, CycleEngine, SchedulerConfig};

// ─── Resources ──────────────────────────────────────────────────

const INPUT: ResourceId = ResourceId(0);
const TOTAL: ResourceId = ResourceId(1);

fn only(id: ResourceId) -> ResourceSet {
    [id].into_iter().collect()
}

// ─── Schedule ───────────────────────────────────────────────────
//
// produce (order 0) writes INPUT.
// accumulate (order 10) reads INPUT, writes TOTAL.
// report (order 20) reads TOTAL and forces a refresh before reading.

fn build(input: Arc<AtomicU64>, total: Arc<AtomicU64>) -> SchedulerConfig {
    let produce_input = Arc::clone(&input);
    let acc_input = Arc::clone(&input);
    let acc_total = Arc::clone(&total);
    let report_total = total;

    SchedulerConfig::default()
        .register_fn(0, "produce", ResourceSet::empty(), only(INPUT), move |ctx| {
            let input = Arc::clone(&produce_input);
            ctx.dispatch(move || {
                thread::sleep(Duration::from_millis(1));
                input.fetch_add(1, Ordering::SeqCst);
            });
            Ok(())
        })
        .register_fn(10, "accumulate", only(INPUT), only(TOTAL), move |ctx| {
            let input = Arc::clone(&acc_input);
            let total = Arc::clone(&acc_total);
            ctx.dispatch(move || {
                total.fetch_add(input.load(Ordering::SeqCst), Ordering::SeqCst);
            });
            Ok(())
        })
        .register_fn(20, "report", only(TOTAL), ResourceSet::empty(), move |ctx| {
            ctx.refresh_and_complete_dependency();
            info!(
                cycle = ctx.cycle().0,
                total = report_total.load(Ordering::SeqCst),
                "report"
            );
            Ok(())
        })
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 1. Lockstep: the caller drives each cycle.
    let input = Arc::new(AtomicU64::new(0));
    let total = Arc::new(AtomicU64::new(0));
    let mut engine = CycleEngine::new(build(Arc::clone(&input), Arc::clone(&total)))?;

    for plan_pos in 0..engine.unit_count() {
        let late = engine.plan().late_writers_for(plan_pos);
        if !late.is_empty() {
            info!(position = plan_pos, ?late, "reads written later in the cycle");
        }
    }

    for result in engine.run_cycles(5)? {
        info!(
            cycle = result.cycle.0,
            total_us = result.metrics.total_us,
            refreshes = result.metrics.refreshes,
            stale_reuses = result.metrics.stale_reuses,
            "cycle done"
        );
    }
    engine.complete_all();
    // 1 + 2 + 3 + 4 + 5
    info!(total = total.load(Ordering::SeqCst), "lockstep finished");

    // 2. Peeking a unit's dependency between cycles clears its refresh
    //    flag; its next pre-turn reuses that handle.
    engine.unit_dependency(UnitId(20));
    let result = engine.run_cycle()?;
    info!(
        stale_reuses = result.metrics.stale_reuses,
        "cycle after host peek"
    );

    // 3. Background: the same engine on its own thread at 100 Hz.
    engine.reset();
    let bg = BackgroundScheduler::start(engine, Some(100.0))?;
    thread::sleep(Duration::from_millis(100));
    let cycles = bg.cycles_run();
    let engine = bg.stop()?;
    engine.complete_all();
    info!(
        cycles,
        current = engine.current_cycle().0,
        total = total.load(Ordering::SeqCst),
        "background finished"
    );

    Ok(())
}
