//! The weft scheduler loop.
//!
//! [`CycleEngine`] owns the units, their [`UnitContext`](weft_sched::UnitContext)s,
//! the [`DependencyRegistry`](weft_sched::DependencyRegistry) and the
//! [`JobSystem`](weft_job::JobSystem). Each [`run_cycle()`](CycleEngine::run_cycle)
//! walks the units in ascending order index through the pre-turn,
//! running and post-turn phases. [`BackgroundScheduler`] drives an
//! engine on its own thread.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod background;
pub mod config;
pub mod cycle;
pub mod metrics;

pub use background::{BackgroundScheduler, FaultReport, StopReport};
pub use config::{ConfigError, FaultPolicy, SchedulerConfig};
pub use cycle::{CycleEngine, CycleResult, UnitFault};
pub use metrics::CycleMetrics;
