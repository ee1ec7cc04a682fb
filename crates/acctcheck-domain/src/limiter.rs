//! Bounded concurrency for per-candidate remote calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Default number of simultaneous calls admitted by a limiter.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Errors returned by [`ConcurrencyLimiter::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LimiterError {
    /// The caller was cancelled while waiting for a permit.
    #[error("cancelled while waiting for a concurrency permit")]
    Cancelled,
    /// The limiter was closed.
    #[error("concurrency limiter closed")]
    Closed,
}

/// Counting admission limiter with capacity K.
///
/// Clones share the same permits, so one limiter handed to a checker bounds
/// that checker's outbound calls across every request.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    name: &'static str,
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
}

impl ConcurrencyLimiter {
    /// Creates a limiter admitting at most `capacity` holders at once.
    ///
    /// A capacity of zero would never admit anything and is raised to one.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name,
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Waits for a permit, or returns [`LimiterError::Cancelled`] once `cancel`
    /// fires. Cancellation wins when both are ready.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<LimiterPermit, LimiterError> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LimiterError::Cancelled),
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                permit.map_err(|_| LimiterError::Closed)?
            }
        };

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!("acctcheck_limiter_in_flight", "limiter" => self.name).set(current as f64);

        Ok(LimiterPermit {
            _permit: permit,
            name: self.name,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Maximum number of simultaneous holders.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of permits currently held.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Number of permits currently available.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Closes the limiter; pending and future acquisitions fail with
    /// [`LimiterError::Closed`].
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// One unit of admission. Released when dropped, on every exit path.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
    name: &'static str,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        let remaining = self.in_flight.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::gauge!("acctcheck_limiter_in_flight", "limiter" => self.name).set(remaining as f64);
    }
}
