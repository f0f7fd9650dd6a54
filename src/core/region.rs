//! Per-region admission gate and bounded job executor.
//!
//! A region admits at most `max_simultaneous_jobs` jobs at once. Admission
//! reserves a slot with a CAS loop, so concurrent submitters can never push
//! the active count past the limit. Admitted jobs run on the region's own
//! executor threads, one per slot, and hold their slot until the worker is
//! back in the shared pool.
//!
//! A full region turns new jobs away immediately instead of queueing them.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::core::dispatcher::DispatchShared;
use crate::core::handle::{self, JobHandle};
use crate::core::job::{Job, JobTask};
use crate::core::{DispatchError, Rider};

/// Why a region turned a job away. A normal outcome, not a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The region has been shut down.
    #[error("region is shut down")]
    ShutDown,
    /// Every slot is taken.
    #[error("region at capacity ({max} active jobs)")]
    AtCapacity {
        /// Configured maximum of simultaneous jobs.
        max: u32,
    },
}

/// Snapshot of a region's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionStats {
    /// Region name.
    pub name: String,
    /// Configured maximum of simultaneous jobs.
    pub max_simultaneous_jobs: u32,
    /// Jobs currently holding a slot.
    pub active_jobs: u32,
    /// Jobs that completed.
    pub completed_jobs: u64,
    /// Jobs that ended cancelled.
    pub cancelled_jobs: u64,
    /// Submissions turned away.
    pub rejected_jobs: u64,
    /// Whether the region stopped admitting jobs.
    pub shut_down: bool,
}

/// Counters shared between the gate and its running jobs.
#[derive(Debug, Default)]
pub(crate) struct RegionCounters {
    active: AtomicU32,
    completed: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
}

/// A reserved region slot. Dropping it frees the slot, on every exit path.
#[derive(Debug)]
pub(crate) struct SlotPermit {
    counters: Arc<RegionCounters>,
}

impl SlotPermit {
    /// Free the slot, recording how the job ended.
    pub(crate) fn release(self, completed: bool) {
        let counter = if completed {
            &self.counters.completed
        } else {
            &self.counters.cancelled
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Number of live executor threads, with a `Condvar` to wait for zero.
#[derive(Debug, Default)]
struct Executors {
    live: Mutex<usize>,
    exited: Condvar,
}

/// Held by an executor thread for its whole life.
struct ExecutorGuard {
    executors: Arc<Executors>,
}

impl ExecutorGuard {
    fn enter(executors: &Arc<Executors>) -> Self {
        *executors.live.lock() += 1;
        Self {
            executors: Arc::clone(executors),
        }
    }
}

impl Drop for ExecutorGuard {
    fn drop(&mut self) {
        let mut live = self.executors.live.lock();
        *live -= 1;
        if *live == 0 {
            self.executors.exited.notify_all();
        }
    }
}

/// Admission gate plus bounded executor for one region.
pub struct RegionGate {
    name: Arc<str>,
    max_jobs: u32,
    counters: Arc<RegionCounters>,
    shutdown: AtomicBool,
    /// Job sender (to executors). `None` once shut down.
    task_tx: Mutex<Option<Sender<JobTask>>>,
    executors: Arc<Executors>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shared: Arc<DispatchShared>,
}

impl RegionGate {
    /// Create the region and start `max_jobs` executor threads.
    pub(crate) fn new(
        name: &str,
        max_jobs: u32,
        shared: Arc<DispatchShared>,
    ) -> Result<Self, DispatchError> {
        if max_jobs == 0 {
            return Err(DispatchError::InvalidConfig(format!(
                "region `{name}`: max_simultaneous_jobs must be greater than 0"
            )));
        }
        let name: Arc<str> = Arc::from(name);
        let slots = usize::try_from(max_jobs)
            .map_err(|e| DispatchError::InvalidConfig(format!("region `{name}`: {e}")))?;

        // Admission bounds queued + running jobs to `slots`, so try_send never sees Full.
        let (task_tx, task_rx) = bounded::<JobTask>(slots);
        let executors = Arc::new(Executors::default());
        let mut handles = Vec::with_capacity(slots);

        for idx in 0..slots {
            match spawn_executor(&name, idx, task_rx.clone(), &executors) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Dropping the sender lets the threads already started exit.
                    drop(task_tx);
                    return Err(DispatchError::Spawn(format!("region `{name}`: {e}")));
                }
            }
        }

        info!(region = %name, max_simultaneous_jobs = max_jobs, "region initialized");

        Ok(Self {
            name,
            max_jobs,
            counters: Arc::new(RegionCounters::default()),
            shutdown: AtomicBool::new(false),
            task_tx: Mutex::new(Some(task_tx)),
            executors,
            handles: Mutex::new(handles),
            shared,
        })
    }

    /// Region name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured maximum of simultaneous jobs.
    #[must_use]
    pub const fn max_simultaneous_jobs(&self) -> u32 {
        self.max_jobs
    }

    /// Jobs currently holding a slot.
    #[must_use]
    pub fn active_jobs(&self) -> u32 {
        self.counters.active.load(Ordering::Acquire)
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Admit a job for `rider` if the region is open and has a free slot.
    ///
    /// On admission the job gets the next global ID, counts as awaiting a
    /// worker, and is queued for this region's executors. Rejected requests
    /// consume no ID.
    ///
    /// # Errors
    ///
    /// - `Rejection::ShutDown` if the region has been shut down
    /// - `Rejection::AtCapacity` if every slot is taken
    pub fn submit(&self, rider: Arc<Rider>) -> Result<JobHandle, Rejection> {
        let task_tx = self.task_tx.lock();
        let Some(tx) = task_tx.as_ref().filter(|_| !self.is_shut_down()) else {
            return Err(self.reject(rider.name(), Rejection::ShutDown));
        };
        let Some(permit) = self.try_reserve_slot() else {
            return Err(self.reject(
                rider.name(),
                Rejection::AtCapacity { max: self.max_jobs },
            ));
        };

        let job_id = self.shared.next_job_id.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.awaiting.fetch_add(1, Ordering::AcqRel);
        let job = Job::new(job_id, rider);
        self.shared.events.log_event(&job, "admitted");
        let (completer, handle) = handle::channel(job_id, Arc::clone(&self.name));

        match tx.try_send(JobTask::new(job, Arc::clone(&self.shared), permit, completer)) {
            Ok(()) => {
                debug!(region = %self.name, job_id, "job queued for execution");
                Ok(handle)
            }
            Err(err) => {
                self.shared.awaiting.fetch_sub(1, Ordering::AcqRel);
                let rejection = match err {
                    TrySendError::Full(_) => Rejection::AtCapacity { max: self.max_jobs },
                    TrySendError::Disconnected(_) => Rejection::ShutDown,
                };
                error!(region = %self.name, job_id, %rejection, "admitted job could not be queued");
                // The dropped task frees its slot and disconnects its handle.
                Err(rejection)
            }
        }
    }

    /// Stop admitting jobs. Jobs already admitted run to completion.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(region = %self.name, active_jobs = self.active_jobs(), "region shutting down");
        // Executors drain what is queued, then see the channel close and exit.
        *self.task_tx.lock() = None;
    }

    /// Wait up to `timeout` for every executor thread to exit.
    ///
    /// Only meaningful after [`shutdown`](Self::shutdown); returns `false` if
    /// the region is still open or threads are still running at the deadline.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        if !self.is_shut_down() {
            warn!(region = %self.name, "await_termination called on an open region");
            return false;
        }

        {
            let deadline = Instant::now().checked_add(timeout);
            let mut live = self.executors.live.lock();
            while *live > 0 {
                match deadline {
                    Some(deadline) => {
                        let timed_out = self.executors.exited.wait_until(&mut live, deadline).timed_out();
                        if timed_out && *live > 0 {
                            warn!(
                                region = %self.name,
                                live = *live,
                                "executors still running at deadline"
                            );
                            return false;
                        }
                    }
                    None => self.executors.exited.wait(&mut live),
                }
            }
        }

        for handle in self.handles.lock().drain(..) {
            if handle.join().is_err() {
                warn!(region = %self.name, "executor thread panicked");
            }
        }
        info!(region = %self.name, "region terminated");
        true
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> RegionStats {
        RegionStats {
            name: self.name.to_string(),
            max_simultaneous_jobs: self.max_jobs,
            active_jobs: self.active_jobs(),
            completed_jobs: self.counters.completed.load(Ordering::Relaxed),
            cancelled_jobs: self.counters.cancelled.load(Ordering::Relaxed),
            rejected_jobs: self.counters.rejected.load(Ordering::Relaxed),
            shut_down: self.is_shut_down(),
        }
    }

    /// Try to reserve one slot atomically using a CAS loop.
    fn try_reserve_slot(&self) -> Option<SlotPermit> {
        let mut current = self.counters.active.load(Ordering::Acquire);
        loop {
            if current >= self.max_jobs {
                return None;
            }
            match self.counters.active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(SlotPermit {
                        counters: Arc::clone(&self.counters),
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn reject(&self, rider: &str, rejection: Rejection) -> Rejection {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        warn!(region = %self.name, rider, %rejection, "job rejected");
        rejection
    }
}

impl Drop for RegionGate {
    fn drop(&mut self) {
        // Signal shutdown but don't join: in-flight jobs keep their threads.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            *self.task_tx.lock() = None;
            debug!(region = %self.name, "region dropped without explicit shutdown");
        }
    }
}

impl std::fmt::Debug for RegionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionGate")
            .field("name", &self.name)
            .field("max_jobs", &self.max_jobs)
            .field("active", &self.active_jobs())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

/// Spawn an executor thread.
fn spawn_executor(
    region: &Arc<str>,
    idx: usize,
    task_rx: Receiver<JobTask>,
    executors: &Arc<Executors>,
) -> std::io::Result<JoinHandle<()>> {
    let guard = ExecutorGuard::enter(executors);
    let region = Arc::clone(region);
    thread::Builder::new()
        .name(format!("region-{region}-{idx}"))
        .spawn(move || {
            let _guard = guard;
            debug!(region = %region, executor = idx, "executor thread started");

            // Blocking recv, no polling. Exits once the sender is dropped and
            // the queue is drained.
            while let Ok(task) = task_rx.recv() {
                let job_id = task.job_id();
                if panic::catch_unwind(AssertUnwindSafe(|| task.run())).is_err() {
                    error!(region = %region, executor = idx, job_id, "job task panicked");
                }
            }

            debug!(region = %region, executor = idx, "executor thread exiting");
        })
}
