//! Cycle engine: the single-threaded scheduler loop.
//!
//! [`CycleEngine`] drives every registered unit through the turn
//! protocol once per cycle, in ascending order index:
//!
//! 1. **Pre-turn.** Pull the unit's combined dependency if it is flagged
//!    for refresh, otherwise reuse the cached handle, then wait on it.
//! 2. **Running.** Call the body with a [`TurnContext`]. Panics are
//!    caught and reported as [`UnitError::Panicked`].
//! 3. **Post-turn.** Register the work the body dispatched against the
//!    unit's declared resources. A faulting unit skips this step, so
//!    its last good publication stays in the registry.
//!
//! Coordination never leaves the calling thread; only the work units
//! dispatch runs on the [`JobSystem`].

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use tracing::{debug, warn};
use weft_core::{CycleError, CycleId, UnitError, UnitId};
use weft_job::{panic_message, JobHandle, JobSystem};
use weft_sched::{
    validate_schedule, DependencyPlan, DependencyPull, DependencyRegistry, TurnContext, TurnPhase,
    Unit, UnitContext, UnitRegistration,
};

use crate::config::{ConfigError, FaultPolicy, SchedulerConfig};
use crate::metrics::CycleMetrics;

// ── CycleResult ────────────────────────────────────────────────────

/// A unit body that failed during a cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitFault {
    /// Order index of the faulting unit.
    pub unit: UnitId,
    /// Name of the faulting unit.
    pub name: String,
    /// What went wrong.
    pub error: UnitError,
}

impl fmt::Display for UnitFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit '{}' (order {}): {}", self.name, self.unit, self.error)
    }
}

/// Outcome of a cycle that ran to the end of its fault policy.
#[derive(Debug)]
pub struct CycleResult {
    /// The cycle that just ran.
    pub cycle: CycleId,
    /// Units that faulted. Always empty under [`FaultPolicy::Abort`],
    /// which turns the first fault into an error instead.
    pub faults: Vec<UnitFault>,
    /// Timing and counters for this cycle.
    pub metrics: CycleMetrics,
}

impl CycleResult {
    /// Whether every unit published.
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

// ── CycleEngine ────────────────────────────────────────────────────

/// Single-threaded scheduler loop.
///
/// Owns the units, their contexts, the registry and the job system.
/// Units, contexts and the plan all share one indexing: execution
/// position.
pub struct CycleEngine {
    units: Vec<Box<dyn Unit>>,
    contexts: Vec<UnitContext>,
    plan: DependencyPlan,
    registry: DependencyRegistry,
    jobs: JobSystem,
    fault_policy: FaultPolicy,
    max_consecutive_faults: u32,
    current_cycle: CycleId,
    consecutive_fault_count: u32,
    disabled: bool,
    last_metrics: CycleMetrics,
}

impl CycleEngine {
    /// Construct an engine from a [`SchedulerConfig`].
    ///
    /// Validates the configuration, builds the dependency plan, orders
    /// the units by order index and starts the worker pool.
    pub fn new(config: SchedulerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let plan = validate_schedule(&config.units)?;
        for overlap in plan.write_overlaps() {
            debug!(
                resource = %overlap.resource,
                first = %overlap.first_writer,
                second = %overlap.second_writer,
                "adjacent writers; later publication supersedes"
            );
        }
        let jobs = JobSystem::new(&config.jobs)?;

        let mut slots: Vec<Option<UnitRegistration>> = config.units.into_iter().map(Some).collect();
        let mut units = Vec::with_capacity(slots.len());
        let mut contexts = Vec::with_capacity(slots.len());
        for &index in plan.execution_order() {
            if let Some(reg) = slots.get_mut(index).and_then(Option::take) {
                contexts.push(UnitContext::new(
                    reg.order,
                    reg.unit.name(),
                    reg.unit.reads(),
                    reg.unit.writes(),
                ));
                units.push(reg.unit);
            }
        }
        debug!(
            units = units.len(),
            workers = jobs.worker_count(),
            "cycle engine ready"
        );

        Ok(Self {
            units,
            contexts,
            plan,
            registry: DependencyRegistry::new(),
            jobs,
            fault_policy: config.fault_policy,
            max_consecutive_faults: config.max_consecutive_faults,
            current_cycle: CycleId(0),
            consecutive_fault_count: 0,
            disabled: false,
            last_metrics: CycleMetrics::default(),
        })
    }

    /// Run one cycle over every unit.
    ///
    /// Under [`FaultPolicy::Abort`] the first fault ends the cycle and is
    /// returned as [`CycleError::UnitFailed`]. The other policies report
    /// faults in the [`CycleResult`]. Units that published before the
    /// fault keep their publications either way.
    pub fn run_cycle(&mut self) -> Result<CycleResult, CycleError> {
        let cycle_start = Instant::now();

        // 0. Check if the engine is disabled.
        if self.disabled {
            return Err(CycleError::SchedulerDisabled);
        }

        let cycle = CycleId(self.current_cycle.0 + 1);
        let dispatched_before = self.jobs.stats().dispatched;
        debug!(cycle = cycle.0, "cycle start");

        let mut per_unit_us = Vec::with_capacity(self.units.len());
        let mut wait_us = Vec::with_capacity(self.units.len());
        let mut refreshes = 0;
        let mut stale_reuses = 0;
        let mut faults = Vec::new();

        for (unit, ctx) in self.units.iter_mut().zip(self.contexts.iter_mut()) {
            let unit_start = Instant::now();

            // 1. Pre-turn: bind and wait.
            match ctx.begin_turn(&self.registry) {
                DependencyPull::Refreshed => refreshes += 1,
                DependencyPull::Reused => stale_reuses += 1,
            }
            wait_us.push((ctx.name().to_string(), elapsed_us(unit_start)));

            // 2. Running.
            ctx.enter_running();
            let (result, output) = {
                let mut turn = TurnContext::new(ctx, &self.registry, &self.jobs, cycle);
                let result = panic::catch_unwind(AssertUnwindSafe(|| unit.run(&mut turn)))
                    .unwrap_or_else(|payload| {
                        Err(UnitError::Panicked {
                            message: panic_message(&*payload),
                        })
                    });
                (result, turn.finish())
            };

            // 3. Post-turn.
            let stop = match result {
                Ok(()) => {
                    ctx.publish(&mut self.registry, &output);
                    false
                }
                Err(error) => {
                    warn!(
                        unit = %ctx.name(),
                        cycle = cycle.0,
                        %error,
                        "unit faulted; publication skipped"
                    );
                    ctx.abandon_turn();
                    ctx.invalidate();
                    faults.push(UnitFault {
                        unit: ctx.id(),
                        name: ctx.name().to_string(),
                        error,
                    });
                    self.fault_policy != FaultPolicy::Continue
                }
            };

            per_unit_us.push((ctx.name().to_string(), elapsed_us(unit_start)));
            if stop {
                break;
            }
        }

        // 4. Update state.
        self.current_cycle = cycle;
        if faults.is_empty() {
            self.consecutive_fault_count = 0;
        } else {
            self.consecutive_fault_count += 1;
            if self.consecutive_fault_count >= self.max_consecutive_faults {
                self.disabled = true;
                warn!(
                    cycle = cycle.0,
                    consecutive = self.consecutive_fault_count,
                    "scheduler disabled after consecutive faulting cycles"
                );
            }
        }

        // 5. Build metrics.
        let metrics = CycleMetrics {
            total_us: elapsed_us(cycle_start),
            per_unit_us,
            wait_us,
            refreshes,
            stale_reuses,
            faults: faults.len() as u32,
            jobs_dispatched: self
                .jobs
                .stats()
                .dispatched
                .saturating_sub(dispatched_before),
        };
        self.last_metrics = metrics.clone();
        debug!(
            cycle = cycle.0,
            total_us = metrics.total_us,
            faults = metrics.faults,
            "cycle complete"
        );

        if self.fault_policy == FaultPolicy::Abort {
            if let Some(fault) = faults.into_iter().next() {
                return Err(CycleError::UnitFailed {
                    name: fault.name,
                    reason: fault.error,
                });
            }
            return Ok(CycleResult {
                cycle,
                faults: Vec::new(),
                metrics,
            });
        }

        Ok(CycleResult {
            cycle,
            faults,
            metrics,
        })
    }

    /// Run `n` cycles, stopping at the first error.
    pub fn run_cycles(&mut self, n: u64) -> Result<Vec<CycleResult>, CycleError> {
        let mut results = Vec::with_capacity(n.min(1024) as usize);
        for _ in 0..n {
            results.push(self.run_cycle()?);
        }
        Ok(results)
    }

    /// A unit's combined dependency, pulled from the registry first if
    /// the unit is flagged for refresh.
    ///
    /// A pull clears the flag. A unit whose dependency is read here
    /// between cycles reuses that handle at its next pre-turn instead
    /// of refreshing.
    pub fn unit_dependency(&mut self, id: UnitId) -> Option<JobHandle> {
        let pos = self.plan.position_of(id)?;
        Some(self.contexts[pos].dependency(&self.registry).clone())
    }

    /// Wait on a unit's combined dependency, pulling first if flagged.
    pub fn complete_unit_dependency(&mut self, id: UnitId) -> Option<DependencyPull> {
        let pos = self.plan.position_of(id)?;
        Some(self.contexts[pos].complete_dependency(&self.registry))
    }

    /// Flag a unit so its next access pulls from the registry.
    ///
    /// Returns `false` if no unit has that order index.
    pub fn invalidate_unit_dependency(&mut self, id: UnitId) -> bool {
        match self.plan.position_of(id) {
            Some(pos) => {
                self.contexts[pos].invalidate();
                true
            }
            None => false,
        }
    }

    /// The context of a unit.
    pub fn unit_context(&self, id: UnitId) -> Option<&UnitContext> {
        self.plan.position_of(id).map(|pos| &self.contexts[pos])
    }

    /// Where a unit is within the current or most recent cycle.
    pub fn unit_phase(&self, id: UnitId) -> Option<TurnPhase> {
        self.unit_context(id).map(UnitContext::phase)
    }

    /// Number of registered units.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// The dependency registry.
    pub fn registry(&self) -> &DependencyRegistry {
        &self.registry
    }

    /// The plan built at construction.
    pub fn plan(&self) -> &DependencyPlan {
        &self.plan
    }

    /// The job system executing dispatched work.
    pub fn jobs(&self) -> &JobSystem {
        &self.jobs
    }

    /// The most recently started cycle; zero before the first.
    pub fn current_cycle(&self) -> CycleId {
        self.current_cycle
    }

    /// Whether cycles are refused after too many consecutive faults.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Number of consecutive cycles that contained a fault.
    pub fn consecutive_fault_count(&self) -> u32 {
        self.consecutive_fault_count
    }

    /// Metrics from the most recent cycle.
    pub fn last_metrics(&self) -> &CycleMetrics {
        &self.last_metrics
    }

    /// Block until every published handle has completed.
    pub fn complete_all(&self) {
        self.registry.complete_all();
    }

    /// Reset the engine to its initial state.
    ///
    /// Waits for outstanding work, clears the registry and gives every
    /// unit a fresh context. Units themselves keep their internal state.
    pub fn reset(&mut self) {
        self.complete_all();
        self.registry.clear();
        for ctx in &mut self.contexts {
            *ctx = UnitContext::new(
                ctx.id(),
                ctx.name(),
                ctx.reads().clone(),
                ctx.writes().clone(),
            );
        }
        self.current_cycle = CycleId(0);
        self.disabled = false;
        self.consecutive_fault_count = 0;
        self.last_metrics = CycleMetrics::default();
        debug!("cycle engine reset");
    }
}

impl fmt::Debug for CycleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CycleEngine")
            .field("units", &self.contexts)
            .field("current_cycle", &self.current_cycle)
            .field("fault_policy", &self.fault_policy)
            .field("disabled", &self.disabled)
            .finish()
    }
}

fn elapsed_us(start: Instant) -> u64 {
    start.elapsed().as_micros() as u64
}
