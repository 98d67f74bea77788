//! weft: a dependency-tracking cycle scheduler.
//!
//! Units declare the resources they read and write and run once per
//! cycle in a fixed order. Each unit's work is published to a registry
//! as a [`JobHandle`](jobs::JobHandle); later units pull the handles
//! covering their reads and wait on them before running. The pull
//! happens on demand and is cached until the unit publishes again.
//!
//! This is the facade crate re-exporting the public API of the weft
//! sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//! use weft::prelude::*;
//!
//! let x = ResourceId(0);
//! let counter = Arc::new(AtomicU64::new(0));
//!
//! let mut config = SchedulerConfig::default();
//! for (order, name) in ["a", "b", "c"].into_iter().enumerate() {
//!     let counter = Arc::clone(&counter);
//!     config = config.register_fn(
//!         order as u32,
//!         name,
//!         ResourceSet::empty(),
//!         [x].into_iter().collect(),
//!         move |ctx| {
//!             let counter = Arc::clone(&counter);
//!             ctx.dispatch(move || {
//!                 counter.fetch_add(1, Ordering::SeqCst);
//!             });
//!             Ok(())
//!         },
//!     );
//! }
//!
//! let mut engine = CycleEngine::new(config).unwrap();
//! engine.run_cycle().unwrap();
//! engine.registry().writer(x).wait();
//! assert_eq!(counter.load(Ordering::SeqCst), 3);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `weft-core` | IDs, `ResourceSet`, error types |
//! | [`jobs`] | `weft-job` | `JobHandle`, `combine`, `JobSystem` |
//! | [`sched`] | `weft-sched` | `Unit`, `DependencyRegistry`, `UnitContext`, schedule validation |
//! | [`engine`] | `weft-engine` | `CycleEngine`, `BackgroundScheduler`, configuration |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and IDs (`weft-core`).
pub use weft_core as types;

/// Job handles and the worker pool (`weft-job`).
///
/// [`jobs::JobHandle`] is the unit of synchronization throughout weft.
pub use weft_job as jobs;

/// Units, the dependency registry and the turn protocol (`weft-sched`).
pub use weft_sched as sched;

/// The scheduler loop (`weft-engine`).
///
/// [`engine::CycleEngine`] for caller-driven cycles,
/// [`engine::BackgroundScheduler`] for a dedicated cycle thread.
pub use weft_engine as engine;

/// Common imports for typical weft usage.
///
/// ```rust
/// use weft::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use weft_core::{CycleId, ResourceId, ResourceSet, UnitId};

    // Errors
    pub use weft_core::{CycleError, UnitError};

    // Jobs
    pub use weft_job::{combine, JobHandle};

    // Units
    pub use weft_sched::{DependencyPull, FnUnit, TurnContext, TurnPhase, Unit};

    // Engine
    pub use weft_engine::{
        BackgroundScheduler, ConfigError, CycleEngine, CycleMetrics, CycleResult, FaultPolicy,
        SchedulerConfig,
    };
}
