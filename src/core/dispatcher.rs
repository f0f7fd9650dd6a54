//! Top-level dispatcher: routes jobs to regions over one shared worker pool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::builders::DispatcherBuilder;
use crate::config::DispatchConfig;
use crate::core::events::{EventLog, EventSink, StdoutEventSink};
use crate::core::{
    CancelToken, DispatchError, JobHandle, RegionGate, RegionStats, Rider, Worker, WorkerPool,
};

/// State shared by the dispatcher, every region, and every running job.
#[derive(Debug)]
pub(crate) struct DispatchShared {
    pub(crate) pool: WorkerPool,
    /// Last job ID handed out; the next one is this plus one.
    pub(crate) next_job_id: AtomicU64,
    /// Admitted jobs that do not have a worker yet, across all regions.
    pub(crate) awaiting: AtomicUsize,
    pub(crate) events: EventLog,
    pub(crate) cancel: CancelToken,
}

/// Snapshot of dispatcher-wide counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Workers idle in the pool.
    pub idle_workers: usize,
    /// Pool capacity.
    pub pool_capacity: usize,
    /// Admitted jobs still waiting for a worker.
    pub awaiting_worker: usize,
    /// Jobs admitted since start.
    pub jobs_created: u64,
    /// Per-region counters, sorted by region name.
    pub regions: Vec<RegionStats>,
}

/// Owns the worker pool and the regions, and routes incoming jobs.
#[derive(Debug)]
pub struct Dispatcher {
    shared: Arc<DispatchShared>,
    regions: HashMap<String, RegionGate>,
}

impl Dispatcher {
    /// Create a dispatcher from a region map (name to maximum simultaneous
    /// jobs) with default pool settings, printing job events to stdout when
    /// `log_events` is set.
    ///
    /// # Errors
    ///
    /// - `DispatchError::InvalidConfig` if the regions are invalid
    /// - `DispatchError::Spawn` if an executor thread cannot be started
    pub fn with_regions(
        regions: &HashMap<String, u32>,
        log_events: bool,
    ) -> Result<Self, DispatchError> {
        let mut builder = Self::builder().log_events(log_events);
        for (name, max) in regions {
            builder = builder.region(name.clone(), *max);
        }
        builder.build()
    }

    /// Create a dispatcher from configuration, printing events to stdout.
    ///
    /// # Errors
    ///
    /// Same as [`with_regions`](Self::with_regions).
    pub fn new(config: DispatchConfig) -> Result<Self, DispatchError> {
        Self::with_sink(config, Box::new(StdoutEventSink))
    }

    /// Start a fluent builder.
    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Create a dispatcher from configuration with a custom event sink.
    ///
    /// # Errors
    ///
    /// Same as [`with_regions`](Self::with_regions).
    pub fn with_sink(
        config: DispatchConfig,
        sink: Box<dyn EventSink>,
    ) -> Result<Self, DispatchError> {
        config.validate().map_err(DispatchError::InvalidConfig)?;

        let shared = Arc::new(DispatchShared {
            pool: WorkerPool::from_config(&config.worker_pool)?,
            next_job_id: AtomicU64::new(0),
            awaiting: AtomicUsize::new(0),
            events: EventLog::new(config.log_events, sink),
            cancel: CancelToken::new(),
        });

        let mut regions = HashMap::with_capacity(config.regions.len());
        for (name, region) in &config.regions {
            info!(region = %name, "creating region");
            let gate = RegionGate::new(name, region.max_simultaneous_jobs, Arc::clone(&shared))?;
            regions.insert(name.clone(), gate);
        }

        info!(
            regions = regions.len(),
            pool_capacity = shared.pool.capacity(),
            log_events = shared.events.is_enabled(),
            "dispatcher initialized"
        );

        Ok(Self { shared, regions })
    }

    /// Submit a job for `rider` to the named region.
    ///
    /// `Ok(None)` means the region turned the job away (shut down or at
    /// capacity), which is a normal outcome.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::UnknownRegion` if no region has that name.
    pub fn submit(
        &self,
        rider: Arc<Rider>,
        region: &str,
    ) -> Result<Option<JobHandle>, DispatchError> {
        let gate = self
            .regions
            .get(region)
            .ok_or_else(|| DispatchError::UnknownRegion(region.to_string()))?;
        Ok(gate.submit(rider).ok())
    }

    /// Add an idle worker to the shared pool.
    ///
    /// Returns `false` if the pool refused the worker: it was full under the
    /// reject policy, or [`cancel`](Self::cancel) interrupted a wait for room.
    pub fn add_worker(&self, worker: Worker) -> bool {
        match self.shared.pool.put_cancellable(worker, &self.shared.cancel) {
            Ok(()) => true,
            Err(refused) => {
                warn!(worker = refused.worker.name(), error = %refused.error, "worker not added");
                false
            }
        }
    }

    /// Take a worker from the front of the pool, blocking until one is idle.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Cancelled` if the dispatcher is cancelled
    /// before a worker becomes available.
    pub fn get_worker(&self) -> Result<Worker, DispatchError> {
        self.shared.pool.take_cancellable(&self.shared.cancel)
    }

    /// Number of admitted jobs, across all regions, still waiting for a worker.
    #[must_use]
    pub fn awaiting_count(&self) -> usize {
        self.shared.awaiting.load(Ordering::Acquire)
    }

    /// Number of idle workers in the pool.
    #[must_use]
    pub fn idle_workers(&self) -> usize {
        self.shared.pool.len()
    }

    /// The shared worker pool.
    #[must_use]
    pub fn pool(&self) -> &WorkerPool {
        &self.shared.pool
    }

    /// Look up a region by name.
    #[must_use]
    pub fn region(&self, name: &str) -> Option<&RegionGate> {
        self.regions.get(name)
    }

    /// Names of all configured regions, sorted.
    #[must_use]
    pub fn region_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.regions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Tell every region to stop admitting jobs.
    ///
    /// Does not wait for in-flight jobs; await their handles or call
    /// [`await_termination`](Self::await_termination) for that.
    pub fn shutdown(&self) {
        for (name, region) in &self.regions {
            info!(region = %name, "shutting down region");
            region.shutdown();
        }
    }

    /// Shut down and interrupt in-flight jobs.
    ///
    /// Jobs waiting for a worker or inside a timed phase resolve with
    /// `DispatchError::Cancelled`; held workers go back to the pool first.
    pub fn cancel(&self) {
        self.shutdown();
        warn!(awaiting = self.awaiting_count(), "cancelling in-flight jobs");
        self.shared.cancel.cancel();
        self.shared.pool.interrupt_waiters();
    }

    /// Whether [`cancel`](Self::cancel) was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Wait up to `timeout` for every region's executors to exit.
    ///
    /// Returns `false` if any region is still open or still running.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        self.regions.values().all(|region| {
            let remaining = deadline.map_or(Duration::MAX, |d| {
                d.saturating_duration_since(Instant::now())
            });
            region.await_termination(remaining)
        })
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        let mut regions: Vec<RegionStats> = self.regions.values().map(RegionGate::stats).collect();
        regions.sort_by(|a, b| a.name.cmp(&b.name));
        DispatchStats {
            idle_workers: self.shared.pool.len(),
            pool_capacity: self.shared.pool.capacity(),
            awaiting_worker: self.awaiting_count(),
            jobs_created: self.shared.next_job_id.load(Ordering::Acquire),
            regions,
        }
    }
}
