//! Admission control for ingestion tasks.
//!
//! A single long-lived limiter hands out [`Permit`]s in FIFO order. Permits
//! are released on drop, so every exit path of a worker (including a
//! panic unwinding through it) gives its slot back.
//!
//! Capacity can be changed at runtime. Growing adds permits immediately.
//! Shrinking removes idle permits immediately; permits that are currently
//! held stay valid, and the remaining deficit is retired as those permits
//! are released instead of being returned to the pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LimiterError {
    #[error("Limiter capacity must be at least 1")]
    ZeroCapacity,

    #[error("Limiter was closed")]
    Closed,
}

struct LimiterInner {
    semaphore: Arc<Semaphore>,
    capacity: AtomicUsize,
    /// Permits still to be retired after a shrink.
    debt: AtomicUsize,
    active: AtomicUsize,
    resize_lock: Mutex<()>,
}

impl LimiterInner {
    /// Takes one unit of debt if there is any.
    fn take_debt(&self) -> bool {
        let mut current = self.debt.load(Ordering::Acquire);
        while current > 0 {
            match self.debt.compare_exchange(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }

    /// Cancels up to `n` units of debt, returning how many were cancelled.
    fn cancel_debt(&self, n: usize) -> usize {
        let mut current = self.debt.load(Ordering::Acquire);
        loop {
            let cancel = current.min(n);
            match self.debt.compare_exchange(
                current,
                current - cancel,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return cancel,
                Err(actual) => current = actual,
            }
        }
    }
}

/// FIFO counting limiter with runtime-adjustable capacity.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    inner: Arc<LimiterInner>,
}

impl ConcurrencyLimiter {
    /// Creates a limiter with `capacity` permits.
    ///
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "limiter capacity must be > 0");
        Self {
            inner: Arc::new(LimiterInner {
                semaphore: Arc::new(Semaphore::new(capacity)),
                capacity: AtomicUsize::new(capacity),
                debt: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                resize_lock: Mutex::new(()),
            }),
        }
    }

    /// Waits until a permit is free and takes it. Waiters are served in
    /// arrival order.
    pub async fn acquire(&self) -> Result<Permit, LimiterError> {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| LimiterError::Closed)?;
        self.inner.active.fetch_add(1, Ordering::AcqRel);
        Ok(Permit {
            permit: Some(permit),
            inner: Arc::clone(&self.inner),
        })
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.inner.capacity.load(Ordering::Acquire)
    }

    /// Number of permits currently held.
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Permits that can be taken right now without waiting.
    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    /// Changes the capacity. See the module docs for shrink semantics.
    pub fn resize(&self, new_capacity: usize) -> Result<(), LimiterError> {
        if new_capacity == 0 {
            return Err(LimiterError::ZeroCapacity);
        }

        let _guard = self
            .inner
            .resize_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let old = self.inner.capacity.swap(new_capacity, Ordering::AcqRel);

        if new_capacity > old {
            let grow = new_capacity - old;
            let cancelled = self.inner.cancel_debt(grow);
            self.inner.semaphore.add_permits(grow - cancelled);
        } else if new_capacity < old {
            let shrink = old - new_capacity;
            let forgotten = self.inner.semaphore.forget_permits(shrink);
            self.inner
                .debt
                .fetch_add(shrink - forgotten, Ordering::AcqRel);
        }

        tracing::info!(old, new = new_capacity, "Concurrency limiter resized");
        Ok(())
    }
}

/// Admission token. Exactly one holder; released on drop.
pub struct Permit {
    permit: Option<OwnedSemaphorePermit>,
    inner: Arc<LimiterInner>,
}

impl Permit {
    /// Releases the permit explicitly. Equivalent to dropping it.
    pub fn release(self) {}
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.inner.active.fetch_sub(1, Ordering::AcqRel);
        if let Some(permit) = self.permit.take() {
            if self.inner.take_debt() {
                permit.forget();
            }
        }
    }
}
