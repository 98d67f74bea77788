//! Per-unit dependency state and the turn protocol.
//!
//! [`UnitContext`] caches the unit's combined dependency together with
//! a `needs_refresh` flag. Publishing sets the flag; the next access to
//! the combined handle pulls a fresh one from the registry and clears
//! it. While the flag is clear, the cached handle is reused as-is, even
//! if other units have published since it was pulled.
//!
//! That reuse window is deliberate. A unit that waits on its cached
//! handle without forcing a refresh can observe a resource that a unit
//! published after the pull is still writing. Bodies that need final
//! contents call [`TurnContext::refresh_and_complete_dependency`].

use smallvec::SmallVec;
use tracing::trace;
use weft_core::{CycleId, ResourceSet, UnitId};
use weft_job::{combine, JobHandle, JobSystem};

use crate::registry::DependencyRegistry;

/// Where a unit is within the current cycle's turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnPhase {
    /// Has not pulled its dependency this cycle.
    Fresh,
    /// Pulled (or reused) its combined dependency and is waiting on it.
    Bound,
    /// Body executing.
    Running,
    /// Posted its new handle to the registry.
    Published,
}

/// How an access to the combined dependency was satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DependencyPull {
    /// `needs_refresh` was set; a fresh handle was queried from the registry.
    Refreshed,
    /// `needs_refresh` was clear; the cached handle was reused.
    Reused,
}

/// Dependency state for one registered unit.
#[derive(Debug)]
pub struct UnitContext {
    id: UnitId,
    name: String,
    reads: ResourceSet,
    writes: ResourceSet,
    combined: JobHandle,
    needs_refresh: bool,
    phase: TurnPhase,
}

impl UnitContext {
    /// Create the context for a unit at registration.
    ///
    /// A new context starts flagged for refresh: it has never pulled, so
    /// its first turn must see whatever earlier units have published.
    pub fn new(
        id: UnitId,
        name: impl Into<String>,
        reads: ResourceSet,
        writes: ResourceSet,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            reads,
            writes,
            combined: JobHandle::completed(),
            needs_refresh: true,
            phase: TurnPhase::Fresh,
        }
    }

    /// The unit's order index.
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// The unit's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared reads.
    pub fn reads(&self) -> &ResourceSet {
        &self.reads
    }

    /// Declared writes.
    pub fn writes(&self) -> &ResourceSet {
        &self.writes
    }

    /// Whether the next access to the combined handle pulls from the registry.
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh
    }

    /// Current phase within the cycle.
    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// The cached combined handle, without triggering a pull.
    pub fn cached(&self) -> &JobHandle {
        &self.combined
    }

    /// Pull a fresh combined handle if `needs_refresh` is set.
    pub fn refresh_if_needed(&mut self, registry: &DependencyRegistry) -> DependencyPull {
        if self.needs_refresh {
            self.combined = registry.query_dependency(&self.reads, &self.writes);
            self.needs_refresh = false;
            trace!(unit = %self.name, "dependency refreshed");
            DependencyPull::Refreshed
        } else {
            trace!(unit = %self.name, "cached dependency reused");
            DependencyPull::Reused
        }
    }

    /// Access the combined handle, pulling first if flagged.
    pub fn dependency(&mut self, registry: &DependencyRegistry) -> &JobHandle {
        self.refresh_if_needed(registry);
        &self.combined
    }

    /// Wait on the combined handle, pulling first if flagged.
    pub fn complete_dependency(&mut self, registry: &DependencyRegistry) -> DependencyPull {
        let pull = self.refresh_if_needed(registry);
        self.combined.wait();
        pull
    }

    /// Force the next access to pull from the registry.
    pub fn invalidate(&mut self) {
        self.needs_refresh = true;
    }

    /// Pre-turn: bind the combined handle and wait on it.
    pub fn begin_turn(&mut self, registry: &DependencyRegistry) -> DependencyPull {
        self.phase = TurnPhase::Fresh;
        let pull = self.refresh_if_needed(registry);
        self.phase = TurnPhase::Bound;
        self.combined.wait();
        pull
    }

    /// Mark the body as executing.
    pub fn enter_running(&mut self) {
        self.phase = TurnPhase::Running;
    }

    /// Post-turn: register `output` against the declared resources and
    /// cache the result, flagged for refresh.
    pub fn publish(&mut self, registry: &mut DependencyRegistry, output: &JobHandle) {
        self.combined = registry.register_access(&self.reads, &self.writes, output);
        self.needs_refresh = true;
        self.phase = TurnPhase::Published;
    }

    /// Fault path: end the turn without publishing.
    pub fn abandon_turn(&mut self) {
        self.phase = TurnPhase::Fresh;
    }
}

// ── TurnContext ────────────────────────────────────────────────────

/// What a unit body sees during its turn.
///
/// Work dispatched through the context is combined into the handle the
/// scheduler publishes when the turn ends.
pub struct TurnContext<'a> {
    unit: &'a mut UnitContext,
    registry: &'a DependencyRegistry,
    jobs: &'a JobSystem,
    cycle: CycleId,
    produced: SmallVec<[JobHandle; 4]>,
}

impl<'a> TurnContext<'a> {
    /// Construct a turn context. Called by the scheduler loop between
    /// the pre-turn wait and the body.
    pub fn new(
        unit: &'a mut UnitContext,
        registry: &'a DependencyRegistry,
        jobs: &'a JobSystem,
        cycle: CycleId,
    ) -> Self {
        Self {
            unit,
            registry,
            jobs,
            cycle,
            produced: SmallVec::new(),
        }
    }

    /// The cycle this turn belongs to.
    pub fn cycle(&self) -> CycleId {
        self.cycle
    }

    /// The running unit's order index.
    pub fn unit(&self) -> UnitId {
        self.unit.id()
    }

    /// The running unit's name.
    pub fn name(&self) -> &str {
        self.unit.name()
    }

    /// Run `work` on the job system after the unit's bound dependency.
    pub fn dispatch<F>(&mut self, work: F) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let wait_on = self.unit.cached().clone();
        self.dispatch_after(work, &wait_on)
    }

    /// Run `work` on the job system once `wait_on` completes.
    pub fn dispatch_after<F>(&mut self, work: F, wait_on: &JobHandle) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = self.jobs.dispatch(work, wait_on);
        self.produced.push(handle.clone());
        handle
    }

    /// Include externally produced work in this turn's published handle.
    pub fn track(&mut self, handle: &JobHandle) {
        self.produced.push(handle.clone());
    }

    /// The unit's combined dependency, pulled first if flagged.
    pub fn dependency(&mut self) -> JobHandle {
        self.unit.dependency(self.registry).clone()
    }

    /// Explicit mid-turn wait on the combined dependency.
    ///
    /// Pulls first only if `needs_refresh` is set. Inside a body the flag
    /// is normally clear, so this waits on the handle bound at pre-turn.
    pub fn complete_dependency(&mut self) -> DependencyPull {
        self.unit.complete_dependency(self.registry)
    }

    /// Force a pull from the registry, then wait on the result.
    pub fn refresh_and_complete_dependency(&mut self) {
        self.unit.invalidate();
        self.unit.complete_dependency(self.registry);
    }

    /// Number of handles this turn will publish.
    pub fn produced_count(&self) -> usize {
        self.produced.len()
    }

    /// End the body and return the handle to publish.
    pub fn finish(self) -> JobHandle {
        combine(&self.produced)
    }
}
