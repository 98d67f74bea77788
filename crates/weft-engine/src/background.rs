//! Running a [`CycleEngine`] on a dedicated thread.
//!
//! The cycle thread owns the engine exclusively (moved in at
//! [`start()`](BackgroundScheduler::start)) and hands it back through
//! its `JoinHandle` on shutdown. Faults travel to the owner over an
//! unbounded crossbeam channel; nothing on the cycle path takes a lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};
use weft_core::{CycleError, CycleId};

use crate::config::{cycle_period, ConfigError};
use crate::cycle::{CycleEngine, UnitFault};

/// A faulting cycle observed by the cycle thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FaultReport {
    /// The cycle ran to the end of its fault policy with faults.
    Faults {
        /// The cycle that faulted.
        cycle: CycleId,
        /// Units that faulted.
        faults: Vec<UnitFault>,
    },
    /// The cycle returned an error.
    Failed {
        /// The cycle that failed.
        cycle: CycleId,
        /// The error.
        error: CycleError,
    },
}

impl FaultReport {
    /// The cycle this report belongs to.
    pub fn cycle(&self) -> CycleId {
        match self {
            Self::Faults { cycle, .. } | Self::Failed { cycle, .. } => *cycle,
        }
    }
}

/// Result of shutting the cycle thread down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StopReport {
    /// Cycles the thread ran, faulting ones included.
    pub cycles_run: u64,
    /// Time from the shutdown request to the join, in milliseconds.
    pub shutdown_ms: u64,
    /// Whether the thread was joined and the engine recovered.
    pub joined: bool,
}

/// A [`CycleEngine`] running on its own thread.
pub struct BackgroundScheduler {
    thread: Option<JoinHandle<CycleEngine>>,
    shutdown: Arc<AtomicBool>,
    cycles_run: Arc<AtomicU64>,
    faults_rx: Receiver<FaultReport>,
    recovered: Option<CycleEngine>,
}

impl BackgroundScheduler {
    /// Move `engine` onto a new thread named `weft-cycle` and start cycling.
    ///
    /// With `cycle_rate_hz` set, each cycle is padded to the target
    /// period; otherwise cycles run back to back.
    pub fn start(engine: CycleEngine, cycle_rate_hz: Option<f64>) -> Result<Self, ConfigError> {
        let period = cycle_rate_hz.map(cycle_period).transpose()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let cycles_run = Arc::new(AtomicU64::new(0));
        let (faults_tx, faults_rx) = crossbeam_channel::unbounded();

        let thread_shutdown = Arc::clone(&shutdown);
        let thread_cycles = Arc::clone(&cycles_run);
        let thread = thread::Builder::new()
            .name("weft-cycle".into())
            .spawn(move || {
                let state = CycleThreadState {
                    engine,
                    shutdown: thread_shutdown,
                    cycles_run: thread_cycles,
                    faults_tx,
                    period,
                };
                state.run()
            })
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: format!("cycle thread: {e}"),
            })?;

        Ok(Self {
            thread: Some(thread),
            shutdown,
            cycles_run,
            faults_rx,
            recovered: None,
        })
    }

    /// Cycles run so far.
    pub fn cycles_run(&self) -> u64 {
        self.cycles_run.load(Ordering::Acquire)
    }

    /// Whether the cycle thread is still alive.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// The channel fault reports arrive on.
    pub fn faults(&self) -> &Receiver<FaultReport> {
        &self.faults_rx
    }

    /// Collect every fault report received so far.
    pub fn drain_faults(&self) -> Vec<FaultReport> {
        self.faults_rx.try_iter().collect()
    }

    /// Stop the cycle thread and keep the engine for [`take_engine()`](Self::take_engine).
    ///
    /// Idempotent. The cycle in progress, if any, runs to completion.
    pub fn shutdown(&mut self) -> StopReport {
        let start = Instant::now();
        self.shutdown.store(true, Ordering::Release);

        let joined = match self.thread.take() {
            Some(handle) => {
                handle.thread().unpark();
                match handle.join() {
                    Ok(engine) => {
                        self.recovered = Some(engine);
                        true
                    }
                    Err(_) => {
                        warn!("cycle thread panicked; engine lost");
                        false
                    }
                }
            }
            None => self.recovered.is_some(),
        };

        StopReport {
            cycles_run: self.cycles_run(),
            shutdown_ms: start.elapsed().as_millis() as u64,
            joined,
        }
    }

    /// Take the engine recovered by [`shutdown()`](Self::shutdown).
    pub fn take_engine(&mut self) -> Result<CycleEngine, ConfigError> {
        self.recovered.take().ok_or(ConfigError::EngineRecoveryFailed)
    }

    /// Stop the cycle thread and return the engine.
    pub fn stop(mut self) -> Result<CycleEngine, ConfigError> {
        self.shutdown();
        self.take_engine()
    }
}

impl Drop for BackgroundScheduler {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}

/// State owned by the cycle thread.
struct CycleThreadState {
    engine: CycleEngine,
    shutdown: Arc<AtomicBool>,
    cycles_run: Arc<AtomicU64>,
    faults_tx: Sender<FaultReport>,
    period: Option<Duration>,
}

impl CycleThreadState {
    /// Main loop. Runs until `shutdown` is set and returns the engine.
    fn run(mut self) -> CycleEngine {
        debug!("cycle thread started");
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            // A disabled engine refuses cycles; idle until shutdown.
            if self.engine.is_disabled() {
                self.idle_until_shutdown();
                break;
            }

            let cycle_start = Instant::now();
            let report = match self.engine.run_cycle() {
                Ok(result) if result.is_clean() => None,
                Ok(result) => Some(FaultReport::Faults {
                    cycle: result.cycle,
                    faults: result.faults,
                }),
                Err(error) => Some(FaultReport::Failed {
                    cycle: self.engine.current_cycle(),
                    error,
                }),
            };
            self.cycles_run.fetch_add(1, Ordering::Release);
            if let Some(report) = report {
                // Best-effort: the owner may have dropped the receiver.
                let _ = self.faults_tx.send(report);
            }

            if let Some(period) = self.period {
                if let Some(remaining) = period.checked_sub(cycle_start.elapsed()) {
                    thread::park_timeout(remaining);
                }
            }
        }
        debug!(
            cycles = self.cycles_run.load(Ordering::Acquire),
            "cycle thread stopped"
        );
        self.engine
    }

    fn idle_until_shutdown(&self) {
        while !self.shutdown.load(Ordering::Acquire) {
            thread::park_timeout(Duration::from_millis(10));
        }
    }
}
