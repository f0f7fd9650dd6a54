//! Shared, bounded FIFO pool of idle workers.
//!
//! Every region's jobs draw from the same pool, so this is the main
//! cross-region coordination point. Takers line up with a ticket: the worker
//! at the front of the idle queue always goes to the taker at the front of
//! the wait line. A taker that gives up (timeout or cancellation) leaves the
//! line and its ticket is skipped.
//!
//! # Design Principles
//!
//! - **No polling**: takers and blocked putters sleep on `Condvar`s
//! - **Move semantics**: a [`Worker`] is moved out on take and back in on put,
//!   so it can never be both idle and checked out

use std::collections::{BTreeSet, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::config::{OverflowPolicy, WorkerPoolConfig};
use crate::core::{CancelToken, DispatchError, Worker};

/// Default capacity, large enough to mean "no practical limit".
pub const DEFAULT_POOL_CAPACITY: usize = 999;

#[derive(Debug, Default)]
struct PoolState {
    idle: VecDeque<Worker>,
    /// Ticket handed to the next taker to arrive.
    next_ticket: u64,
    /// Ticket allowed to take the next worker.
    now_serving: u64,
    /// Tickets whose holders left the line before being served.
    abandoned: BTreeSet<u64>,
}

impl PoolState {
    fn advance(&mut self) {
        self.now_serving += 1;
        while self.abandoned.remove(&self.now_serving) {
            self.now_serving += 1;
        }
    }

    fn abandon(&mut self, ticket: u64) {
        if ticket == self.now_serving {
            self.advance();
        } else {
            self.abandoned.insert(ticket);
        }
    }

    fn can_serve(&self, ticket: u64) -> bool {
        self.now_serving == ticket && !self.idle.is_empty()
    }

    fn waiting(&self) -> usize {
        let in_line = self.next_ticket - self.now_serving;
        usize::try_from(in_line).unwrap_or(usize::MAX) - self.abandoned.len()
    }
}

/// A worker the pool would not accept, handed back with the reason.
#[derive(Debug)]
pub struct RefusedWorker {
    /// The refused worker.
    pub worker: Worker,
    /// `DispatchError::PoolOverflow` or `DispatchError::Cancelled`.
    pub error: DispatchError,
}

/// Why a bounded wait for a worker ended without one.
enum WaitEnd {
    Cancelled,
    TimedOut,
}

/// Bounded, thread-safe FIFO collection of idle workers.
#[derive(Debug)]
pub struct WorkerPool {
    capacity: usize,
    overflow: OverflowPolicy,
    state: Mutex<PoolState>,
    /// Signalled when a worker is added or the head of the line changes.
    available: Condvar,
    /// Signalled when a worker is removed, for putters blocked on a full pool.
    space: Condvar,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY, OverflowPolicy::default())
    }
}

impl WorkerPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            capacity,
            overflow,
            state: Mutex::new(PoolState::default()),
            available: Condvar::new(),
            space: Condvar::new(),
        }
    }

    /// Create a pool from configuration.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidConfig` if the configuration is invalid.
    pub fn from_config(config: &WorkerPoolConfig) -> Result<Self, DispatchError> {
        config.validate().map_err(DispatchError::InvalidConfig)?;
        Ok(Self::new(config.capacity, config.overflow))
    }

    /// Maximum number of idle workers the pool holds.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Policy applied by [`put`](Self::put) when the pool is full.
    #[must_use]
    pub const fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow
    }

    /// Number of idle workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Whether no worker is idle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().idle.is_empty()
    }

    /// Number of takers currently waiting in line.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.state.lock().waiting()
    }

    /// Insert a worker, honouring the configured overflow policy.
    ///
    /// With [`OverflowPolicy::Block`] this waits for room and always succeeds;
    /// with [`OverflowPolicy::Reject`] a full pool drops the worker and `false`
    /// is returned.
    pub fn put(&self, worker: Worker) -> bool {
        match self.put_until(worker, None) {
            Ok(()) => true,
            Err(refused) => {
                warn!(
                    worker = refused.worker.name(),
                    capacity = self.capacity,
                    error = %refused.error,
                    "worker rejected"
                );
                false
            }
        }
    }

    /// Like [`put`](Self::put), but a wait for room under
    /// [`OverflowPolicy::Block`] gives up once `cancel` is tripped.
    ///
    /// Callers that trip the token must follow up with
    /// [`interrupt_waiters`](Self::interrupt_waiters) so blocked putters notice.
    ///
    /// # Errors
    ///
    /// Hands the worker back with `DispatchError::PoolOverflow` if the pool is
    /// full under [`OverflowPolicy::Reject`], or with
    /// `DispatchError::Cancelled` if the token was tripped while waiting.
    pub fn put_cancellable(
        &self,
        worker: Worker,
        cancel: &CancelToken,
    ) -> Result<(), RefusedWorker> {
        self.put_until(worker, Some(cancel))
    }

    /// Insert a worker without blocking.
    ///
    /// # Errors
    ///
    /// Hands the worker back if the pool is at capacity.
    pub fn try_put(&self, worker: Worker) -> Result<(), Worker> {
        let mut state = self.state.lock();
        if state.idle.len() >= self.capacity {
            return Err(worker);
        }
        self.push(&mut state, worker);
        Ok(())
    }

    /// Remove and return the front worker, blocking until one is available.
    pub fn take(&self) -> Worker {
        let mut state = self.state.lock();
        let ticket = Self::join_line(&mut state);
        loop {
            if state.can_serve(ticket) {
                return self.serve(&mut state);
            }
            self.available.wait(&mut state);
        }
    }

    /// Like [`take`](Self::take), but gives up once `cancel` is tripped.
    ///
    /// Callers that trip the token must follow up with
    /// [`interrupt_waiters`](Self::interrupt_waiters) so sleeping takers notice.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Cancelled` if the token was tripped before a
    /// worker became available.
    pub fn take_cancellable(&self, cancel: &CancelToken) -> Result<Worker, DispatchError> {
        self.take_until(Some(cancel), None).map_err(|_| DispatchError::Cancelled)
    }

    /// Like [`take`](Self::take), but gives up after `timeout`.
    #[must_use]
    pub fn take_timeout(&self, timeout: Duration) -> Option<Worker> {
        let deadline = Instant::now().checked_add(timeout);
        if deadline.is_none() {
            return Some(self.take());
        }
        self.take_until(None, deadline).ok()
    }

    /// Take a worker only if one is idle and nobody is already waiting.
    #[must_use]
    pub fn try_take(&self) -> Option<Worker> {
        let mut state = self.state.lock();
        if state.waiting() > 0 || state.idle.is_empty() {
            return None;
        }
        let ticket = Self::join_line(&mut state);
        debug_assert!(state.can_serve(ticket));
        Some(self.serve(&mut state))
    }

    /// Wake every sleeping taker and putter so they re-check their exit conditions.
    pub fn interrupt_waiters(&self) {
        let _state = self.state.lock();
        self.available.notify_all();
        self.space.notify_all();
    }

    fn take_until(
        &self,
        cancel: Option<&CancelToken>,
        deadline: Option<Instant>,
    ) -> Result<Worker, WaitEnd> {
        let mut state = self.state.lock();
        let ticket = Self::join_line(&mut state);
        loop {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                self.leave_line(&mut state, ticket);
                return Err(WaitEnd::Cancelled);
            }
            if state.can_serve(ticket) {
                return Ok(self.serve(&mut state));
            }
            match deadline {
                Some(deadline) => {
                    let timed_out = self.available.wait_until(&mut state, deadline).timed_out();
                    if timed_out && !state.can_serve(ticket) {
                        self.leave_line(&mut state, ticket);
                        return Err(WaitEnd::TimedOut);
                    }
                }
                None => self.available.wait(&mut state),
            }
        }
    }

    fn put_until(
        &self,
        worker: Worker,
        cancel: Option<&CancelToken>,
    ) -> Result<(), RefusedWorker> {
        let mut state = self.state.lock();
        while state.idle.len() >= self.capacity {
            let error = match self.overflow {
                OverflowPolicy::Reject => DispatchError::PoolOverflow {
                    capacity: self.capacity,
                },
                OverflowPolicy::Block if cancel.is_some_and(CancelToken::is_cancelled) => {
                    DispatchError::Cancelled
                }
                OverflowPolicy::Block => {
                    self.space.wait(&mut state);
                    continue;
                }
            };
            return Err(RefusedWorker { worker, error });
        }
        self.push(&mut state, worker);
        Ok(())
    }

    fn push(&self, state: &mut PoolState, worker: Worker) {
        debug!(worker = worker.name(), "worker added to pool");
        state.idle.push_back(worker);
        // Only the head of the line may take, so wake everyone and let it sort out.
        self.available.notify_all();
    }

    fn join_line(state: &mut PoolState) -> u64 {
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        ticket
    }

    fn leave_line(&self, state: &mut PoolState, ticket: u64) {
        state.abandon(ticket);
        self.available.notify_all();
    }

    fn serve(&self, state: &mut PoolState) -> Worker {
        let worker = state.idle.pop_front();
        state.advance();
        self.space.notify_one();
        if !state.idle.is_empty() {
            self.available.notify_all();
        }
        // can_serve() guarantees the queue was non-empty.
        worker.unwrap_or_else(|| unreachable!("served an empty pool"))
    }
}
