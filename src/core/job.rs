//! Jobs, their lifecycle, and the task that drives one to completion.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::core::dispatcher::DispatchShared;
use crate::core::handle::{Completer, JobOutcome};
use crate::core::region::SlotPermit;
use crate::core::{
    CancelToken, DispatchError, RefusedWorker, Rider, Worker, WorkerPool, WorkerProfile,
};
use crate::util::clock::now_ms;

/// Globally unique, sequential job identifier. The first job is `1`.
pub type JobId = u64;

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Admitted by a region, not yet started.
    Created,
    /// Waiting for a worker from the shared pool.
    AwaitingWorker,
    /// Worker is travelling to the rider.
    Pickup,
    /// Worker is driving the rider to the destination.
    Travel,
    /// Rider arrived; worker returned.
    Completed,
    /// Interrupted; any held worker was returned.
    Cancelled,
}

impl JobState {
    /// Whether the job can no longer change state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// A unit of work: one rider, at most one worker.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    rider: Arc<Rider>,
    worker: Option<Arc<WorkerProfile>>,
    created_at: Instant,
    created_at_ms: u128,
    duration: Duration,
    state: JobState,
}

impl Job {
    pub(crate) fn new(id: JobId, rider: Arc<Rider>) -> Self {
        Self {
            id,
            rider,
            worker: None,
            created_at: Instant::now(),
            created_at_ms: now_ms(),
            duration: Duration::ZERO,
            state: JobState::Created,
        }
    }

    /// Job identifier.
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// Rider being transported.
    #[must_use]
    pub const fn rider(&self) -> &Arc<Rider> {
        &self.rider
    }

    /// Name of the assigned worker, once one is assigned.
    #[must_use]
    pub fn worker_name(&self) -> Option<&str> {
        self.worker.as_deref().map(WorkerProfile::name)
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> JobState {
        self.state
    }

    /// Pickup plus travel time accumulated so far.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Creation timestamp in milliseconds since epoch.
    #[must_use]
    pub const fn created_at_ms(&self) -> u128 {
        self.created_at_ms
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.id,
            self.worker_name().unwrap_or("null"),
            self.rider.name()
        )
    }
}

/// Immutable outcome of a completed job.
#[derive(Debug, Clone)]
pub struct JobResult {
    /// Job identifier.
    pub id: JobId,
    /// Rider that was transported.
    pub rider: Arc<Rider>,
    /// Worker that did the job.
    pub worker: Arc<WorkerProfile>,
    /// Pickup plus travel time.
    pub duration: Duration,
    /// Wall-clock time from job creation to arrival, including time spent
    /// waiting for a worker.
    pub elapsed: Duration,
}

/// Drives one admitted job on a region executor thread.
pub(crate) struct JobTask {
    job: Job,
    shared: Arc<DispatchShared>,
    permit: SlotPermit,
    completer: Completer,
}

impl JobTask {
    pub(crate) const fn new(
        job: Job,
        shared: Arc<DispatchShared>,
        permit: SlotPermit,
        completer: Completer,
    ) -> Self {
        Self {
            job,
            shared,
            permit,
            completer,
        }
    }

    pub(crate) const fn job_id(&self) -> JobId {
        self.job.id
    }

    /// Execute the job, release its region slot, then resolve the handle.
    pub(crate) fn run(mut self) {
        let outcome = self.execute();
        let Self {
            permit, completer, ..
        } = self;
        permit.release(outcome.is_ok());
        completer.resolve(outcome);
    }

    fn execute(&mut self) -> JobOutcome {
        let shared = Arc::clone(&self.shared);

        self.job.state = JobState::AwaitingWorker;
        shared.events.log_event(&self.job, "awaiting worker");

        let acquired = shared.pool.take_cancellable(&shared.cancel);
        // Assigned or abandoned, the job no longer counts as awaiting.
        shared.awaiting.fetch_sub(1, Ordering::AcqRel);
        let worker = match acquired {
            Ok(worker) => worker,
            Err(err) => {
                self.job.state = JobState::Cancelled;
                shared.events.log_event(&self.job, "cancelled while awaiting worker");
                return Err(err);
            }
        };
        let profile = Arc::clone(worker.profile());
        self.job.worker = Some(Arc::clone(&profile));
        debug!(job_id = self.job.id, worker = worker.name(), "worker assigned");

        let checked_out = CheckedOut::new(&shared.pool, worker);
        let phases = self.drive(&shared, &profile);

        match checked_out.give_back(&shared.cancel) {
            Ok(()) => shared.events.log_event(&self.job, "worker returned to pool"),
            Err(refused) => {
                error!(
                    job_id = self.job.id,
                    worker = refused.worker.name(),
                    capacity = shared.pool.capacity(),
                    error = %refused.error,
                    "failed to return worker to pool; effective capacity reduced"
                );
                shared.events.log_event(&self.job, "failed to return worker to pool");
            }
        }

        match phases {
            Ok(()) => {
                self.job.state = JobState::Completed;
                shared.events.log_event(&self.job, "completed");
                Ok(JobResult {
                    id: self.job.id,
                    rider: Arc::clone(&self.job.rider),
                    worker: profile,
                    duration: self.job.duration,
                    elapsed: self.job.created_at.elapsed(),
                })
            }
            Err(err) => {
                let phase = self.job.state;
                self.job.state = JobState::Cancelled;
                shared
                    .events
                    .log_event(&self.job, &format!("cancelled during {phase:?}"));
                Err(err)
            }
        }
    }

    /// Run the pickup and travel phases, accumulating their durations.
    fn drive(
        &mut self,
        shared: &DispatchShared,
        worker: &WorkerProfile,
    ) -> Result<(), DispatchError> {
        self.job.state = JobState::Pickup;
        let pickup = worker.pickup_delay();
        shared.events.log_event(&self.job, "picking up rider");
        shared.cancel.sleep(pickup)?;
        self.job.duration += pickup;

        self.job.state = JobState::Travel;
        let travel = self.job.rider.travel_time();
        shared.events.log_event(&self.job, "travelling to destination");
        shared.cancel.sleep(travel)?;
        self.job.duration += travel;

        Ok(())
    }
}

/// A worker checked out to a running job.
///
/// [`give_back`](Self::give_back) returns it under the pool's overflow policy.
/// If a phase panics instead, dropping the guard puts the worker back without
/// blocking.
struct CheckedOut<'a> {
    pool: &'a WorkerPool,
    worker: Option<Worker>,
}

impl<'a> CheckedOut<'a> {
    const fn new(pool: &'a WorkerPool, worker: Worker) -> Self {
        Self {
            pool,
            worker: Some(worker),
        }
    }

    fn give_back(mut self, cancel: &CancelToken) -> Result<(), RefusedWorker> {
        self.worker
            .take()
            .map_or(Ok(()), |worker| self.pool.put_cancellable(worker, cancel))
    }
}

impl Drop for CheckedOut<'_> {
    fn drop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        match self.pool.try_put(worker) {
            Ok(()) => warn!("worker returned to pool after an aborted job"),
            Err(lost) => error!(worker = lost.name(), "worker lost after an aborted job"),
        }
    }
}
