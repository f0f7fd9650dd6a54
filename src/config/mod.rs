//! Configuration models for the dispatcher, its regions, and the worker pool.

pub mod dispatch;

pub use dispatch::{DispatchConfig, OverflowPolicy, RegionConfig, WorkerPoolConfig};
