//! Workers and riders: the value objects a job moves between.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

/// Source of the travel-phase duration for a rider.
///
/// Implementations must be cheap and thread-safe; the duration is sampled once
/// per job from a region executor thread.
pub trait DurationSource: Send + Sync {
    /// Produce the duration for one trip.
    fn next_duration(&self) -> Duration;
}

/// A fixed duration is its own source.
impl DurationSource for Duration {
    fn next_duration(&self) -> Duration {
        *self
    }
}

/// Uniformly random duration in `[0, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformDelay {
    max: Duration,
}

impl UniformDelay {
    /// Create a source sampling from `[0, max)`.
    #[must_use]
    pub const fn new(max: Duration) -> Self {
        Self { max }
    }

    /// Upper bound (exclusive) of the sampled range.
    #[must_use]
    pub const fn max(&self) -> Duration {
        self.max
    }
}

impl DurationSource for UniformDelay {
    fn next_duration(&self) -> Duration {
        sample_below(self.max)
    }
}

/// Sample uniformly in `[0, max)`; a zero bound always yields zero.
fn sample_below(max: Duration) -> Duration {
    let nanos = u64::try_from(max.as_nanos()).unwrap_or(u64::MAX);
    if nanos == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rand::rng().random_range(0..nanos))
}

/// Identity and pickup parameter of a worker.
///
/// Shared by reference with job results, so a result can name its worker
/// after the worker itself has gone back to the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerProfile {
    name: String,
    max_delay: Duration,
}

impl WorkerProfile {
    /// Worker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Upper bound (exclusive) of the pickup delay.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Sample a pickup delay uniformly in `[0, max_delay)`.
    #[must_use]
    pub fn pickup_delay(&self) -> Duration {
        sample_below(self.max_delay)
    }
}

/// A worker (driver) that can be checked out of the pool.
///
/// Not `Clone`: a worker has exactly one holder at a time,
/// either the [`WorkerPool`](crate::core::WorkerPool) or a running job.
#[derive(Debug)]
pub struct Worker {
    profile: Arc<WorkerProfile>,
}

impl Worker {
    /// Create a worker whose pickup phase lasts up to `max_delay`.
    pub fn new(name: impl Into<String>, max_delay: Duration) -> Self {
        Self {
            profile: Arc::new(WorkerProfile {
                name: name.into(),
                max_delay,
            }),
        }
    }

    /// Worker name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.profile.name()
    }

    /// Upper bound (exclusive) of the pickup delay.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.profile.max_delay()
    }

    /// Shared identity of this worker.
    #[must_use]
    pub const fn profile(&self) -> &Arc<WorkerProfile> {
        &self.profile
    }

    /// Sample a pickup delay uniformly in `[0, max_delay)`.
    #[must_use]
    pub fn pickup_delay(&self) -> Duration {
        self.profile.pickup_delay()
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A rider (passenger) being transported. Read-only to the dispatcher.
pub struct Rider {
    name: String,
    travel: Box<dyn DurationSource>,
}

impl Rider {
    /// Create a rider with an arbitrary travel-time source.
    pub fn new(name: impl Into<String>, travel: impl DurationSource + 'static) -> Self {
        Self {
            name: name.into(),
            travel: Box::new(travel),
        }
    }

    /// Create a rider whose trips last uniformly up to `max_travel`.
    pub fn with_max_travel(name: impl Into<String>, max_travel: Duration) -> Self {
        Self::new(name, UniformDelay::new(max_travel))
    }

    /// Rider name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sample the duration of the next trip.
    #[must_use]
    pub fn travel_time(&self) -> Duration {
        self.travel.next_duration()
    }
}

impl fmt::Debug for Rider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rider").field("name", &self.name).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_delay_is_zero() {
        let worker = Worker::new("Barbara", Duration::ZERO);
        for _ in 0..10 {
            assert_eq!(worker.pickup_delay(), Duration::ZERO);
        }
    }

    #[test]
    fn test_pickup_delay_is_bounded() {
        let worker = Worker::new("Barbara", Duration::from_millis(5));
        for _ in 0..100 {
            assert!(worker.pickup_delay() < Duration::from_millis(5));
        }
    }

    #[test]
    fn test_fixed_travel_time() {
        let rider = Rider::new("Alex", Duration::from_millis(7));
        assert_eq!(rider.travel_time(), Duration::from_millis(7));
        assert_eq!(rider.name(), "Alex");
    }

    #[test]
    fn test_uniform_travel_time_bounded() {
        let rider = Rider::with_max_travel("Alex", Duration::from_millis(3));
        for _ in 0..100 {
            assert!(rider.travel_time() < Duration::from_millis(3));
        }
    }

    #[test]
    fn test_profile_outlives_worker() {
        let worker = Worker::new("Carol", Duration::from_millis(1));
        let profile = Arc::clone(worker.profile());
        drop(worker);
        assert_eq!(profile.name(), "Carol");
        assert_eq!(profile.max_delay(), Duration::from_millis(1));
    }
}
