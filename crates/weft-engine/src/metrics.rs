//! Per-cycle metrics for the scheduler loop.

/// Timing and bookkeeping counters collected during a single cycle.
///
/// All durations are in microseconds. The engine fills this in after
/// each [`run_cycle()`](crate::CycleEngine::run_cycle); the most recent
/// value is available from
/// [`last_metrics()`](crate::CycleEngine::last_metrics).
#[derive(Clone, Debug, Default)]
pub struct CycleMetrics {
    /// Wall-clock time for the whole cycle.
    pub total_us: u64,
    /// Per-unit turn times, pre-turn wait included: `(name, microseconds)`.
    pub per_unit_us: Vec<(String, u64)>,
    /// Per-unit pre-turn wait times: `(name, microseconds)`.
    pub wait_us: Vec<(String, u64)>,
    /// Pre-turn pulls that queried the registry.
    pub refreshes: u32,
    /// Pre-turn pulls that reused a cached handle.
    pub stale_reuses: u32,
    /// Units whose body failed this cycle.
    pub faults: u32,
    /// Jobs handed to the job system during the cycle.
    pub jobs_dispatched: u64,
}

impl CycleMetrics {
    /// Total time spent blocked in pre-turn waits.
    pub fn total_wait_us(&self) -> u64 {
        self.wait_us.iter().map(|(_, us)| us).sum()
    }
}
