use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

/// Gate on DNS attempts, built as a pool of `rate_limit` permits.
///
/// A permit is held for the duration of one attempt and goes back to the
/// pool as soon as the attempt ends. This smooths the query rate rather than
/// enforcing a hard per-second ceiling: with fast answers more than
/// `rate_limit` attempts can start within the same second, but never more
/// than `rate_limit` are in flight at once.
#[derive(Debug)]
pub struct RateLimiter {
    permits: Semaphore,
    capacity: usize,
}

impl RateLimiter {
    pub fn new(rate_limit: usize) -> Self {
        let capacity = rate_limit.max(1);
        Self {
            permits: Semaphore::new(capacity),
            capacity,
        }
    }

    /// Wait for a permit. Returns `None` if `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<SemaphorePermit<'_>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = self.permits.acquire() => permit.ok(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
