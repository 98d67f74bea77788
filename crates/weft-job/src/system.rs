//! Worker pool executing dispatched jobs.
//!
//! Each worker receives [`Job`]s via a shared crossbeam channel, waits on
//! the job's `wait_on` handle, runs the closure, and completes the job's
//! signal. Jobs are pulled in dispatch order, and a job can only wait on
//! handles that existed when it was dispatched, so the earliest
//! unfinished job never waits on anything still queued behind it.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, warn};

use crate::handle::{combine, JobHandle, JobSignal};

// ── JobConfig ──────────────────────────────────────────────────────

/// Configuration for a [`JobSystem`].
#[derive(Clone, Debug, Default)]
pub struct JobConfig {
    /// Number of worker threads. `None` = auto-detect
    /// (`available_parallelism / 2`, clamped to `[2, 16]`).
    pub worker_count: Option<usize>,
}

impl JobConfig {
    /// Resolve the actual worker count, applying auto-detection if `None`.
    ///
    /// Explicit values are clamped to `[1, 64]`. Zero workers would leave
    /// every dispatched job unexecuted.
    pub fn resolved_worker_count(&self) -> usize {
        match self.worker_count {
            Some(n) => n.clamp(1, 64),
            None => {
                let cpus = thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4);
                (cpus / 2).clamp(2, 16)
            }
        }
    }
}

// ── JobError ───────────────────────────────────────────────────────

/// Errors constructing a [`JobSystem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// A worker thread could not be spawned.
    ThreadSpawnFailed {
        /// The OS error description.
        reason: String,
    },
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThreadSpawnFailed { reason } => write!(f, "worker spawn failed: {reason}"),
        }
    }
}

impl Error for JobError {}

// ── JobStats ───────────────────────────────────────────────────────

/// Cumulative job counters since the system was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JobStats {
    /// Jobs handed to [`JobSystem::dispatch`].
    pub dispatched: u64,
    /// Jobs whose closure has returned or unwound.
    pub completed: u64,
    /// Jobs whose closure panicked.
    pub panicked: u64,
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> JobStats {
        JobStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

// ── Job ────────────────────────────────────────────────────────────

struct Job {
    work: Box<dyn FnOnce() + Send + 'static>,
    wait_on: JobHandle,
    signal: JobSignal,
}

/// Render a panic payload as text for logs and error values.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn run_job(job: Job, counters: &Counters) {
    let Job {
        work,
        wait_on,
        signal,
    } = job;
    wait_on.wait();
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
        counters.panicked.fetch_add(1, Ordering::Relaxed);
        error!(
            work = %signal.id(),
            message = %panic_message(payload.as_ref()),
            "job panicked"
        );
    }
    counters.completed.fetch_add(1, Ordering::Relaxed);
    signal.complete();
}

fn worker_loop(rx: Receiver<Job>, counters: Arc<Counters>, index: usize) {
    debug!(worker = index, "job worker started");
    while let Ok(job) = rx.recv() {
        run_job(job, &counters);
    }
    // Channel closed: the system was dropped.
    debug!(worker = index, "job worker exiting");
}

// ── JobSystem ──────────────────────────────────────────────────────

/// Fixed pool of worker threads executing dispatched closures.
///
/// Dropping the system closes the job channel, lets the workers drain
/// every job already queued, and joins them.
pub struct JobSystem {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl JobSystem {
    /// Spawn the worker pool described by `config`.
    pub fn new(config: &JobConfig) -> Result<Self, JobError> {
        let count = config.resolved_worker_count();
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let counters = Arc::new(Counters::default());

        let mut workers = Vec::with_capacity(count);
        for i in 0..count {
            let rx = receiver.clone();
            let c = Arc::clone(&counters);
            let handle = thread::Builder::new()
                .name(format!("weft-job-{i}"))
                .spawn(move || worker_loop(rx, c, i))
                .map_err(|e| JobError::ThreadSpawnFailed {
                    reason: format!("weft-job-{i}: {e}"),
                })?;
            workers.push(handle);
        }
        debug!(workers = count, "job system started");

        Ok(Self {
            sender: Some(sender),
            workers,
            counters,
        })
    }

    /// Run `work` on a worker once `wait_on` has completed.
    ///
    /// Returns a handle that completes when `work` has returned (or
    /// panicked).
    pub fn dispatch<F>(&self, work: F, wait_on: &JobHandle) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let (signal, handle) = JobHandle::signal();
        let job = Job {
            work: Box::new(work),
            wait_on: wait_on.clone(),
            signal,
        };
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);

        let rejected = match &self.sender {
            Some(tx) => tx.send(job).err().map(|e| e.into_inner()),
            None => Some(job),
        };
        if let Some(job) = rejected {
            // Only reachable if every worker has exited.
            warn!("job channel closed; running job on the dispatching thread");
            run_job(job, &self.counters);
        }
        handle
    }

    /// Combine handles into one that completes when every input does.
    pub fn combine<'a, I>(&self, handles: I) -> JobHandle
    where
        I: IntoIterator<Item = &'a JobHandle>,
    {
        combine(handles)
    }

    /// Block until `handle` completes.
    pub fn wait(&self, handle: &JobHandle) {
        handle.wait();
    }

    /// Whether `handle` has completed.
    pub fn is_complete(&self, handle: &JobHandle) -> bool {
        handle.is_complete()
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Cumulative job counters.
    pub fn stats(&self) -> JobStats {
        self.counters.snapshot()
    }
}

impl fmt::Debug for JobSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSystem")
            .field("workers", &self.workers.len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        self.sender.take();
        let mut joined = 0usize;
        for handle in self.workers.drain(..) {
            if handle.join().is_ok() {
                joined += 1;
            }
        }
        debug!(joined, "job system stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    fn system(workers: usize) -> JobSystem {
        JobSystem::new(&JobConfig {
            worker_count: Some(workers),
        })
        .unwrap()
    }

    #[test]
    fn resolved_worker_count_clamps() {
        let cfg = JobConfig {
            worker_count: Some(0),
        };
        assert_eq!(cfg.resolved_worker_count(), 1);
        let cfg = JobConfig {
            worker_count: Some(1000),
        };
        assert_eq!(cfg.resolved_worker_count(), 64);
        let auto = JobConfig::default().resolved_worker_count();
        assert!((2..=16).contains(&auto));
    }

    #[test]
    fn dispatched_job_runs_and_completes() {
        let jobs = system(2);
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let h = jobs.dispatch(
            move || {
                c.fetch_add(1, Ordering::SeqCst);
            },
            &JobHandle::completed(),
        );
        jobs.wait(&h);
        assert!(jobs.is_complete(&h));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn job_waits_on_its_dependency() {
        let jobs = system(4);
        let log = Arc::new(Mutex::new(Vec::new()));

        let l1 = Arc::clone(&log);
        let first = jobs.dispatch(
            move || {
                std::thread::sleep(Duration::from_millis(20));
                l1.lock().unwrap().push("first");
            },
            &JobHandle::completed(),
        );
        let l2 = Arc::clone(&log);
        let second = jobs.dispatch(move || l2.lock().unwrap().push("second"), &first);

        second.wait();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn long_dependency_chain_on_single_worker_does_not_deadlock() {
        let jobs = system(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let mut prev = JobHandle::completed();
        for _ in 0..64 {
            let c = Arc::clone(&counter);
            prev = jobs.dispatch(
                move || {
                    c.fetch_add(1, Ordering::SeqCst);
                },
                &prev,
            );
        }
        assert!(prev.wait_timeout(Duration::from_secs(5)));
        assert_eq!(counter.load(Ordering::SeqCst), 64);
    }

    #[test]
    fn panicking_job_still_completes_its_handle() {
        let jobs = system(1);
        let h = jobs.dispatch(|| panic!("boom"), &JobHandle::completed());
        assert!(h.wait_timeout(Duration::from_secs(5)));
        // The worker survives the panic and keeps serving jobs.
        let h2 = jobs.dispatch(|| {}, &JobHandle::completed());
        assert!(h2.wait_timeout(Duration::from_secs(5)));
        let stats = jobs.stats();
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.dispatched, 2);
        assert_eq!(stats.completed, 2);
    }

    #[test]
    fn drop_drains_queued_jobs() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let jobs = system(2);
            for _ in 0..32 {
                let c = Arc::clone(&counter);
                jobs.dispatch(
                    move || {
                        c.fetch_add(1, Ordering::SeqCst);
                    },
                    &JobHandle::completed(),
                );
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn panic_message_extracts_strings() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(s.as_ref()), "owned");
        let s: Box<dyn Any + Send> = Box::new(7u32);
        assert_eq!(panic_message(s.as_ref()), "non-string panic payload");
    }
}
