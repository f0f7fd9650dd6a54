//! # Prometheus Dispatch
//!
//! Region-partitioned job dispatch over a shared pool of workers.
//!
//! Jobs (a rider that needs transporting) are submitted to a named region.
//! Each region admits a bounded number of simultaneous jobs and runs them on
//! its own executor threads; every job then competes for a worker from one
//! pool shared by all regions.
//!
//! ## Key Features
//!
//! - **Atomic Admission**: a CAS-reserved slot per job; a full or shut-down
//!   region rejects immediately, and rejected jobs consume no ID
//! - **Fair Worker Pool**: bounded, FIFO both for idle workers and for the
//!   takers waiting on them
//! - **Result Handles**: block, block with timeout, or `.await` a job outcome
//! - **Cancellation**: in-flight jobs can be interrupted at every wait, and
//!   always hand their worker and region slot back first
//! - **Observability**: `tracing` throughout plus an optional per-job event log
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use prometheus_dispatch::core::{Dispatcher, Rider, Worker};
//!
//! let dispatcher = Dispatcher::builder()
//!     .region("North", 2)
//!     .region("South", 2)
//!     .log_events(true)
//!     .build()?;
//!
//! dispatcher.add_worker(Worker::new("Barbara", Duration::from_millis(100)));
//!
//! let rider = Arc::new(Rider::with_max_travel("Alex", Duration::from_millis(100)));
//! if let Some(handle) = dispatcher.submit(rider, "North")? {
//!     let result = handle.wait()?;
//!     println!("job {} took {:?}", result.id, result.duration);
//! }
//!
//! dispatcher.shutdown();
//! # Ok::<(), prometheus_dispatch::core::DispatchError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core dispatch engine: worker pool, region admission, job execution.
pub mod core;
/// Configuration models for the dispatcher, regions, and worker pool.
pub mod config;
/// Builders to construct a dispatcher from configuration.
pub mod builders;
/// Shared utilities.
pub mod util;
