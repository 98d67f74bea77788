//! Reusable unit fixtures for engine and integration tests.
//!
//! - [`NoopUnit`]: declares access, does nothing.
//! - [`CounterUnit`]: dispatches a job that bumps a shared counter,
//!   optionally after a fixed or seeded-random delay.
//! - [`ObservingUnit`]: reads the shared counter during its turn and
//!   logs what it saw.
//! - [`RecordingUnit`]: appends its name to a shared log each turn.
//! - [`FailingUnit`]: fails deterministically after N successful turns.
//! - [`PanickingUnit`]: panics on every turn.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use weft_core::{CycleId, ResourceSet, UnitError};
use weft_sched::{TurnContext, Unit};

use crate::set;

/// Declares access and does nothing.
pub struct NoopUnit {
    name: String,
    reads: ResourceSet,
    writes: ResourceSet,
}

impl NoopUnit {
    pub fn new(name: impl Into<String>, reads: &[u32], writes: &[u32]) -> Self {
        Self {
            name: name.into(),
            reads: set(reads),
            writes: set(writes),
        }
    }
}

impl Unit for NoopUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn reads(&self) -> ResourceSet {
        self.reads.clone()
    }

    fn writes(&self) -> ResourceSet {
        self.writes.clone()
    }

    fn run(&mut self, _ctx: &mut TurnContext<'_>) -> Result<(), UnitError> {
        Ok(())
    }
}

enum Delay {
    None,
    Fixed(Duration),
    Jitter { rng: ChaCha8Rng, max_us: u64 },
}

/// Writes its resources by dispatching a job that increments a counter.
///
/// The increment lands in the job, not in the body, so the counter only
/// reflects this unit's work once the published handle completes.
pub struct CounterUnit {
    name: String,
    writes: ResourceSet,
    counter: Arc<AtomicU64>,
    delay: Delay,
}

impl CounterUnit {
    pub fn new(name: impl Into<String>, writes: &[u32], counter: Arc<AtomicU64>) -> Self {
        Self {
            name: name.into(),
            writes: set(writes),
            counter,
            delay: Delay::None,
        }
    }

    /// Sleep for `delay` inside the job before incrementing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Delay::Fixed(delay);
        self
    }

    /// Sleep for a seeded-random time in `[0, max)` before incrementing.
    pub fn with_jitter(mut self, seed: u64, max: Duration) -> Self {
        self.delay = Delay::Jitter {
            rng: ChaCha8Rng::seed_from_u64(seed),
            max_us: (max.as_micros() as u64).max(1),
        };
        self
    }

    fn next_delay(&mut self) -> Option<Duration> {
        match &mut self.delay {
            Delay::None => None,
            Delay::Fixed(d) => Some(*d),
            Delay::Jitter { rng, max_us } => Some(Duration::from_micros(rng.next_u64() % *max_us)),
        }
    }
}

impl Unit for CounterUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn reads(&self) -> ResourceSet {
        ResourceSet::empty()
    }

    fn writes(&self) -> ResourceSet {
        self.writes.clone()
    }

    fn run(&mut self, ctx: &mut TurnContext<'_>) -> Result<(), UnitError> {
        let delay = self.next_delay();
        let counter = Arc::clone(&self.counter);
        ctx.dispatch(move || {
            if let Some(d) = delay {
                thread::sleep(d);
            }
            counter.fetch_add(1, Ordering::SeqCst);
        });
        Ok(())
    }
}

/// What an [`ObservingUnit`] saw on one turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Observation {
    pub cycle: CycleId,
    pub value: u64,
}

/// Reads a shared counter during its turn.
///
/// By default the body trusts whatever its pre-turn wait covered. With
/// [`refreshing()`](ObservingUnit::refreshing) it forces a registry pull
/// and waits before reading.
pub struct ObservingUnit {
    name: String,
    reads: ResourceSet,
    counter: Arc<AtomicU64>,
    log: Arc<Mutex<Vec<Observation>>>,
    refresh: bool,
}

impl ObservingUnit {
    pub fn new(
        name: impl Into<String>,
        reads: &[u32],
        counter: Arc<AtomicU64>,
        log: Arc<Mutex<Vec<Observation>>>,
    ) -> Self {
        Self {
            name: name.into(),
            reads: set(reads),
            counter,
            log,
            refresh: false,
        }
    }

    /// Force a refresh-and-wait before every read.
    pub fn refreshing(mut self) -> Self {
        self.refresh = true;
        self
    }
}

impl Unit for ObservingUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn reads(&self) -> ResourceSet {
        self.reads.clone()
    }

    fn run(&mut self, ctx: &mut TurnContext<'_>) -> Result<(), UnitError> {
        if self.refresh {
            ctx.refresh_and_complete_dependency();
        }
        let value = self.counter.load(Ordering::SeqCst);
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Observation {
                cycle: ctx.cycle(),
                value,
            });
        Ok(())
    }
}

/// Appends its name to a shared log every turn.
pub struct RecordingUnit {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingUnit {
    pub fn new(name: impl Into<String>, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.into(),
            log,
        }
    }
}

impl Unit for RecordingUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn reads(&self) -> ResourceSet {
        ResourceSet::empty()
    }

    fn run(&mut self, _ctx: &mut TurnContext<'_>) -> Result<(), UnitError> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.name.clone());
        Ok(())
    }
}

/// Succeeds for `succeed_count` turns, then fails on every turn after.
pub struct FailingUnit {
    name: String,
    writes: ResourceSet,
    call_count: AtomicUsize,
    succeed_count: usize,
}

impl FailingUnit {
    pub fn new(name: impl Into<String>, writes: &[u32], succeed_count: usize) -> Self {
        Self {
            name: name.into(),
            writes: set(writes),
            call_count: AtomicUsize::new(0),
            succeed_count,
        }
    }
}

impl Unit for FailingUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn reads(&self) -> ResourceSet {
        ResourceSet::empty()
    }

    fn writes(&self) -> ResourceSet {
        self.writes.clone()
    }

    fn run(&mut self, _ctx: &mut TurnContext<'_>) -> Result<(), UnitError> {
        let n = self.call_count.fetch_add(1, Ordering::Relaxed);
        if n >= self.succeed_count {
            Err(UnitError::failed(format!("deliberate failure on turn {n}")))
        } else {
            Ok(())
        }
    }
}

/// Panics on every turn.
pub struct PanickingUnit {
    name: String,
}

impl PanickingUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Unit for PanickingUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn reads(&self) -> ResourceSet {
        ResourceSet::empty()
    }

    fn run(&mut self, _ctx: &mut TurnContext<'_>) -> Result<(), UnitError> {
        panic!("{} exploded", self.name);
    }
}
