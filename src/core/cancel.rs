//! One-way cancellation signal observed at every suspension point of a job.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::core::DispatchError;

/// Cloneable cancellation token.
///
/// Once cancelled it stays cancelled. Timed phases sleep on the token's
/// `Condvar`, so cancelling wakes them immediately instead of letting the
/// sleep run out.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the token and wake every sleeper.
    pub fn cancel(&self) {
        let (flag, condvar) = self.inner.as_ref();
        *flag.lock() = true;
        condvar.notify_all();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Block for `duration` unless the token is tripped first.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Cancelled` if the token is or becomes cancelled
    /// before the duration elapses.
    pub fn sleep(&self, duration: Duration) -> Result<(), DispatchError> {
        let (flag, condvar) = self.inner.as_ref();
        let Some(deadline) = Instant::now().checked_add(duration) else {
            // Effectively forever: wait for cancellation only.
            let mut cancelled = flag.lock();
            while !*cancelled {
                condvar.wait(&mut cancelled);
            }
            return Err(DispatchError::Cancelled);
        };

        let mut cancelled = flag.lock();
        while !*cancelled {
            if condvar.wait_until(&mut cancelled, deadline).timed_out() {
                return if *cancelled {
                    Err(DispatchError::Cancelled)
                } else {
                    Ok(())
                };
            }
        }
        Err(DispatchError::Cancelled)
    }
}
