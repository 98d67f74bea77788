//! Scheduler configuration, validation, and error types.
//!
//! [`SchedulerConfig`] is the builder input for a [`CycleEngine`](crate::CycleEngine).
//! [`validate()`](SchedulerConfig::validate) checks structural invariants
//! at startup; the engine constructor calls
//! [`validate_schedule()`](weft_sched::validate_schedule) itself to obtain
//! the [`DependencyPlan`](weft_sched::DependencyPlan).

use std::error::Error;
use std::fmt;
use std::time::Duration;

use weft_core::{ResourceSet, UnitError};
use weft_job::{JobConfig, JobError};
use weft_sched::{validate_schedule, FnUnit, ScheduleError, TurnContext, Unit, UnitRegistration};

// ── FaultPolicy ────────────────────────────────────────────────────

/// What the engine does when a unit body fails or panics.
///
/// In every case the faulting unit's post-turn publication is skipped,
/// so its previously published handle stays in the registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Stop the cycle and return [`CycleError::UnitFailed`](weft_core::CycleError::UnitFailed).
    #[default]
    Abort,
    /// Stop the cycle, skip the remaining units, report the fault in the result.
    SkipRemaining,
    /// Report the fault and continue with the next unit.
    Continue,
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while building or driving a scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Schedule validation failed.
    Schedule(ScheduleError),
    /// `max_consecutive_faults` is zero.
    InvalidFaultLimit,
    /// Target cycle rate is NaN, infinite, zero, or negative.
    InvalidCycleRate {
        /// The invalid value.
        value: f64,
    },
    /// A worker or background thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of which thread failed.
        reason: String,
    },
    /// Engine could not be recovered from the background thread.
    EngineRecoveryFailed,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schedule(e) => write!(f, "schedule: {e}"),
            Self::InvalidFaultLimit => write!(f, "max_consecutive_faults must be at least 1"),
            Self::InvalidCycleRate { value } => {
                write!(f, "cycle rate must be finite and positive, got {value}")
            }
            Self::ThreadSpawnFailed { reason } => write!(f, "thread spawn failed: {reason}"),
            Self::EngineRecoveryFailed => {
                write!(f, "engine could not be recovered from background thread")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Schedule(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ScheduleError> for ConfigError {
    fn from(e: ScheduleError) -> Self {
        Self::Schedule(e)
    }
}

impl From<JobError> for ConfigError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::ThreadSpawnFailed { reason } => Self::ThreadSpawnFailed { reason },
        }
    }
}

// ── SchedulerConfig ────────────────────────────────────────────────

/// Complete configuration for constructing a [`CycleEngine`](crate::CycleEngine).
pub struct SchedulerConfig {
    /// Registered units. Execution order follows each unit's order
    /// index, not its position in this list.
    pub units: Vec<UnitRegistration>,
    /// Reaction to a failing unit body. Default: [`FaultPolicy::Abort`].
    pub fault_policy: FaultPolicy,
    /// Consecutive faulting cycles before the engine disables itself.
    /// Default: 3. Minimum: 1.
    pub max_consecutive_faults: u32,
    /// Worker pool sizing.
    pub jobs: JobConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            units: Vec::new(),
            fault_policy: FaultPolicy::default(),
            max_consecutive_faults: 3,
            jobs: JobConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Register a unit at `order`.
    pub fn register_unit(mut self, order: u32, unit: impl Unit) -> Self {
        self.units.push(UnitRegistration::new(order, unit));
        self
    }

    /// Register a closure body at `order` with the given access sets.
    pub fn register_fn<F>(
        self,
        order: u32,
        name: impl Into<String>,
        reads: ResourceSet,
        writes: ResourceSet,
        body: F,
    ) -> Self
    where
        F: FnMut(&mut TurnContext<'_>) -> Result<(), UnitError> + Send + 'static,
    {
        self.register_unit(order, FnUnit::new(name, reads, writes, body))
    }

    /// Set the fault policy.
    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    /// Set the worker count (`None` auto-detects).
    pub fn with_workers(mut self, worker_count: Option<usize>) -> Self {
        self.jobs.worker_count = worker_count;
        self
    }

    /// Validate all structural invariants.
    ///
    /// Pure validation pass; the plan built by schedule validation is
    /// discarded here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 1. Fault limit >= 1.
        if self.max_consecutive_faults == 0 {
            return Err(ConfigError::InvalidFaultLimit);
        }
        // 2. Schedule structure.
        let _ = validate_schedule(&self.units)?;
        Ok(())
    }
}

impl fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("units", &self.units)
            .field("fault_policy", &self.fault_policy)
            .field("max_consecutive_faults", &self.max_consecutive_faults)
            .field("jobs", &self.jobs)
            .finish()
    }
}

/// Turn a target cycle rate into the period between cycle starts.
///
/// Rejects rates that are not positive and finite, and rates whose
/// period does not fit in a [`Duration`].
pub(crate) fn cycle_period(hz: f64) -> Result<Duration, ConfigError> {
    if !hz.is_finite() || hz <= 0.0 {
        return Err(ConfigError::InvalidCycleRate { value: hz });
    }
    Duration::try_from_secs_f64(1.0 / hz).map_err(|_| ConfigError::InvalidCycleRate { value: hz })
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::UnitId;
    use weft_test_utils::{set, NoopUnit};

    fn valid_config() -> SchedulerConfig {
        SchedulerConfig::default()
            .register_unit(0, NoopUnit::new("writer", &[], &[0]))
            .register_unit(1, NoopUnit::new("reader", &[0], &[]))
    }

    #[test]
    fn validate_valid_config_succeeds() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_empty_schedule_fails() {
        let cfg = SchedulerConfig::default();
        match cfg.validate() {
            Err(ConfigError::Schedule(ScheduleError::EmptySchedule)) => {}
            other => panic!("expected Schedule(EmptySchedule), got {other:?}"),
        }
    }

    #[test]
    fn validate_duplicate_order_fails() {
        let cfg = valid_config().register_unit(1, NoopUnit::new("again", &[], &[]));
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Schedule(ScheduleError::DuplicateOrder { .. }))
        ));
    }

    #[test]
    fn validate_zero_fault_limit_fails() {
        let mut cfg = valid_config();
        cfg.max_consecutive_faults = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidFaultLimit));
    }

    #[test]
    fn register_fn_adds_closure_unit() {
        let cfg = SchedulerConfig::default().register_fn(
            7,
            "closure",
            set(&[1]),
            ResourceSet::empty(),
            |_ctx| Ok(()),
        );
        assert_eq!(cfg.units.len(), 1);
        assert_eq!(cfg.units[0].order, UnitId(7));
        assert_eq!(cfg.units[0].unit.name(), "closure");
    }

    #[test]
    fn cycle_rate_validation() {
        assert_eq!(cycle_period(4.0).unwrap(), Duration::from_millis(250));
        for bad in [
            0.0,
            -1.0,
            f64::NAN,
            f64::INFINITY,
            f64::MIN_POSITIVE / 1024.0,
            1e-20,
        ] {
            assert!(
                matches!(cycle_period(bad), Err(ConfigError::InvalidCycleRate { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn schedule_error_chains_source() {
        let err = ConfigError::from(ScheduleError::EmptySchedule);
        assert_eq!(err.to_string(), "schedule: schedule has no units");
        assert!(err.source().is_some());
    }

    #[test]
    fn job_error_maps_to_spawn_failure() {
        let err = ConfigError::from(JobError::ThreadSpawnFailed {
            reason: "no threads".into(),
        });
        assert_eq!(
            err,
            ConfigError::ThreadSpawnFailed {
                reason: "no threads".into()
            }
        );
    }
}
