use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::Kindness;

/// Counting admission gate in front of network I/O.
///
/// Closing the gate fails every pending and future `acquire`, while permits
/// already handed out stay valid until dropped.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_kindness(kindness: Kindness) -> Self {
        Self::new(kindness.capacity())
    }

    /// Waits for a slot; `None` once the gate is closed.
    pub async fn acquire(&self) -> Option<AdmissionPermit> {
        let permit = self.semaphore.clone().acquire_owned().await.ok()?;
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        Some(AdmissionPermit {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        })
    }

    /// Stops admitting.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of permits held at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Slot in the gate, released on drop.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let limiter = ConcurrencyLimiter::new(2);
        let a = limiter.acquire().await.unwrap();
        let _b = limiter.acquire().await.unwrap();
        assert_eq!(limiter.in_flight(), 2);

        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            limiter.acquire(),
        )
        .await;
        assert!(pending.is_err());

        drop(a);
        assert_eq!(limiter.in_flight(), 1);
        assert!(limiter.acquire().await.is_some());
        assert_eq!(limiter.peak(), 2);
    }

    #[tokio::test]
    async fn test_close_stops_admission() {
        let limiter = ConcurrencyLimiter::new(1);
        let held = limiter.acquire().await.unwrap();
        limiter.close();
        assert!(limiter.is_closed());
        assert!(limiter.acquire().await.is_none());
        // The permit handed out before closing is still released normally
        drop(held);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[test]
    fn test_from_kindness() {
        assert_eq!(ConcurrencyLimiter::from_kindness(Kindness::Slowest).capacity(), 2);
        assert_eq!(ConcurrencyLimiter::new(0).capacity(), 1);
    }
}
