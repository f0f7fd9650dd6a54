//! Single-resolution result handle for an admitted job.
//!
//! The task side holds a [`Completer`], the caller holds a [`JobHandle`]. Both
//! share a slot guarded by a `Mutex` + `Condvar`, so waiting never polls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::core::{DispatchError, JobId, JobResult};

/// Outcome a job resolves to.
pub type JobOutcome = Result<JobResult, DispatchError>;

#[derive(Debug)]
enum SlotState {
    /// Waiting for the task to finish.
    Pending,
    /// Outcome is ready to be taken.
    Ready(JobOutcome),
    /// Outcome was handed to the caller.
    Taken,
}

#[derive(Debug)]
struct Slot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl Slot {
    fn take_ready(state: &mut SlotState) -> Option<JobOutcome> {
        match std::mem::replace(state, SlotState::Taken) {
            SlotState::Ready(outcome) => Some(outcome),
            SlotState::Taken => Some(Err(DispatchError::ResultConsumed)),
            SlotState::Pending => {
                *state = SlotState::Pending;
                None
            }
        }
    }

    fn wait(&self) -> JobOutcome {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = Self::take_ready(&mut state) {
                return outcome;
            }
            self.ready.wait(&mut state);
        }
    }
}

/// Create a connected completer/handle pair.
pub(crate) fn channel(job_id: JobId, region: Arc<str>) -> (Completer, JobHandle) {
    let slot = Arc::new(Slot {
        state: Mutex::new(SlotState::Pending),
        ready: Condvar::new(),
    });
    (
        Completer {
            job_id,
            slot: Some(Arc::clone(&slot)),
        },
        JobHandle { job_id, region, slot },
    )
}

/// Task-side end of a handle. Resolves exactly once; dropping it unresolved
/// resolves the handle with `DispatchError::Disconnected`.
#[derive(Debug)]
pub(crate) struct Completer {
    job_id: JobId,
    slot: Option<Arc<Slot>>,
}

impl Completer {
    pub(crate) fn resolve(mut self, outcome: JobOutcome) {
        self.store(outcome);
    }

    fn store(&mut self, outcome: JobOutcome) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        let mut state = slot.state.lock();
        if matches!(*state, SlotState::Pending) {
            *state = SlotState::Ready(outcome);
            slot.ready.notify_all();
            debug!(job_id = self.job_id, "job handle resolved");
        }
    }
}

impl Drop for Completer {
    fn drop(&mut self) {
        if self.slot.is_some() {
            warn!(job_id = self.job_id, "job task dropped without resolving its handle");
            self.store(Err(DispatchError::Disconnected));
        }
    }
}

/// Caller-side handle that eventually carries a [`JobResult`].
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    region: Arc<str>,
    slot: Arc<Slot>,
}

impl JobHandle {
    /// Identifier of the admitted job.
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.job_id
    }

    /// Region that admitted the job.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Whether the outcome is available (or was already taken).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        !matches!(*self.slot.state.lock(), SlotState::Pending)
    }

    /// Take the outcome if it is ready, without blocking.
    #[must_use]
    pub fn try_result(&self) -> Option<JobOutcome> {
        Slot::take_ready(&mut self.slot.state.lock())
    }

    /// Block until the job resolves and return its outcome.
    ///
    /// # Errors
    ///
    /// - `DispatchError::Cancelled` if the job was interrupted
    /// - `DispatchError::Disconnected` if the task died without resolving
    /// - `DispatchError::ResultConsumed` if the outcome was already taken
    pub fn wait(self) -> JobOutcome {
        self.slot.wait()
    }

    /// Block for at most `timeout` waiting for the outcome.
    ///
    /// A timeout leaves the handle usable; wait on it again later.
    ///
    /// # Errors
    ///
    /// Same as [`wait`](Self::wait), plus `DispatchError::Timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> JobOutcome {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.slot.wait();
        };
        let mut state = self.slot.state.lock();
        loop {
            if let Some(outcome) = Slot::take_ready(&mut state) {
                return outcome;
            }
            if self.slot.ready.wait_until(&mut state, deadline).timed_out() {
                return Slot::take_ready(&mut state).unwrap_or(Err(DispatchError::Timeout));
            }
        }
    }

    /// Await the outcome from async code.
    ///
    /// The `Condvar` wait runs on tokio's blocking thread pool so it never
    /// stalls the async executor.
    ///
    /// # Errors
    ///
    /// Same as [`wait`](Self::wait); a failed blocking task maps to
    /// `DispatchError::Disconnected`.
    #[cfg(feature = "tokio-runtime")]
    pub async fn wait_async(self) -> JobOutcome {
        let slot = Arc::clone(&self.slot);
        tokio::task::spawn_blocking(move || slot.wait())
            .await
            .unwrap_or(Err(DispatchError::Disconnected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn region() -> Arc<str> {
        Arc::from("North")
    }

    #[test]
    fn test_wait_timeout_then_resolve() {
        let (completer, handle) = channel(1, region());
        assert!(!handle.is_finished());
        assert!(matches!(
            handle.wait_timeout(Duration::from_millis(10)),
            Err(DispatchError::Timeout)
        ));

        completer.resolve(Err(DispatchError::Cancelled));
        assert!(handle.is_finished());
        assert!(matches!(handle.wait(), Err(DispatchError::Cancelled)));
    }

    #[test]
    fn test_outcome_taken_once() {
        let (completer, handle) = channel(7, region());
        completer.resolve(Err(DispatchError::Cancelled));

        assert!(matches!(handle.try_result(), Some(Err(DispatchError::Cancelled))));
        assert!(matches!(
            handle.try_result(),
            Some(Err(DispatchError::ResultConsumed))
        ));
        assert_eq!(handle.id(), 7);
        assert_eq!(handle.region(), "North");
    }

    #[test]
    fn test_dropped_completer_disconnects() {
        let (completer, handle) = channel(2, region());
        let dropper = thread::spawn(move || drop(completer));
        dropper.join().unwrap();
        assert!(matches!(handle.wait(), Err(DispatchError::Disconnected)));
    }

    #[cfg(feature = "tokio-runtime")]
    #[tokio::test]
    async fn test_wait_async() {
        let (completer, handle) = channel(3, region());
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            completer.resolve(Err(DispatchError::Cancelled));
        });
        assert!(matches!(handle.wait_async().await, Err(DispatchError::Cancelled)));
    }
}
