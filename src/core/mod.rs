//! Core dispatch engine: worker pool, region admission, job execution.

pub mod cancel;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod handle;
pub mod job;
pub mod participants;
pub mod region;
pub mod worker_pool;

pub use cancel::CancelToken;
pub use dispatcher::{DispatchStats, Dispatcher};
pub use error::{AppResult, DispatchError};
pub use events::{build_job_event, EventSink, InMemoryEventSink, JobEvent, StdoutEventSink};
pub use handle::{JobHandle, JobOutcome};
pub use job::{Job, JobId, JobResult, JobState};
pub use participants::{DurationSource, Rider, UniformDelay, Worker, WorkerProfile};
pub use region::{RegionGate, RegionStats, Rejection};
pub use worker_pool::{RefusedWorker, WorkerPool, DEFAULT_POOL_CAPACITY};
