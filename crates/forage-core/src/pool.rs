use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::AppError;
use crate::traits::{Resource, ResourceFactory};

/// Read-only view over the pool's internal state. Never blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Resources sitting idle, ready to be checked out.
    pub available: usize,
    /// Resources currently checked out by workers.
    pub active: usize,
    /// Requested pool size. `available + active` may be smaller when
    /// construction or replacement failed.
    pub capacity: usize,
}

struct PoolShared<R> {
    idle: Mutex<VecDeque<R>>,
    notify: Notify,
    active: AtomicUsize,
    closed: AtomicBool,
}

/// Fixed-capacity pool of expensive handles.
///
/// Hands resources out one per worker and takes them back, replacing any
/// that come back unhealthy. The idle set sits behind a plain mutex with
/// short critical sections; the lock is never held across an await.
pub struct ResourcePool<F: ResourceFactory> {
    factory: F,
    capacity: usize,
    acquire_timeout: Duration,
    shared: Arc<PoolShared<F::Resource>>,
}

/// A checked-out resource.
///
/// Normally handed back via [`ResourcePool::release`], which runs the
/// health check. If a worker unwinds without releasing, `Drop` returns
/// the handle to the pool (or destroys it after shutdown) so a crashed
/// task can never leak its resource.
pub struct PoolGuard<R: Resource> {
    resource: Option<R>,
    shared: Arc<PoolShared<R>>,
}

impl<R: Resource> std::fmt::Debug for PoolGuard<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolGuard")
            .field("has_resource", &self.resource.is_some())
            .finish()
    }
}

impl<R: Resource> Deref for PoolGuard<R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.resource.as_ref().expect("resource already taken")
    }
}

impl<R: Resource> Drop for PoolGuard<R> {
    fn drop(&mut self) {
        let Some(resource) = self.resource.take() else {
            return;
        };
        self.shared.active.fetch_sub(1, Ordering::SeqCst);
        if self.shared.closed.load(Ordering::SeqCst) {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move { resource.close().await });
            }
        } else {
            self.shared.idle.lock().unwrap().push_back(resource);
            self.shared.notify.notify_one();
        }
    }
}

impl<F: ResourceFactory> ResourcePool<F> {
    /// Build up to `pool_size` resources. Construction failures are logged
    /// and skipped; the pool proceeds with however many succeeded, possibly
    /// zero, in which case every acquisition degrades to a timeout failure
    /// instead of crashing the run.
    pub async fn initialize(factory: F, pool_size: usize, acquire_timeout: Duration) -> Self {
        tracing::info!(pool_size, "Initializing resource pool");

        let mut idle = VecDeque::with_capacity(pool_size);
        for n in 1..=pool_size {
            match factory.create().await {
                Ok(resource) => {
                    tracing::info!(
                        resource_id = %resource.id(),
                        "Resource {n}/{pool_size} added to pool"
                    );
                    idle.push_back(resource);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create resource {n}/{pool_size}");
                }
            }
        }
        tracing::info!(
            created = idle.len(),
            requested = pool_size,
            "Resource pool initialized"
        );

        Self {
            factory,
            capacity: pool_size,
            acquire_timeout,
            shared: Arc::new(PoolShared {
                idle: Mutex::new(idle),
                notify: Notify::new(),
                active: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Check out a resource, blocking until one is available or the
    /// acquire timeout elapses.
    pub async fn acquire(&self) -> Result<PoolGuard<F::Resource>, AppError> {
        let deadline = tokio::time::Instant::now() + self.acquire_timeout;
        loop {
            if self.shared.closed.load(Ordering::SeqCst) {
                return Err(AppError::PoolClosed);
            }
            if let Some(resource) = self.shared.idle.lock().unwrap().pop_front() {
                self.shared.active.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(resource_id = %resource.id(), "Resource acquired");
                return Ok(PoolGuard {
                    resource: Some(resource),
                    shared: Arc::clone(&self.shared),
                });
            }
            // Notify stores a permit, so a release racing with this wait
            // still wakes us.
            if tokio::time::timeout_at(deadline, self.shared.notify.notified())
                .await
                .is_err()
            {
                return Err(AppError::PoolExhausted(self.acquire_timeout.as_secs()));
            }
        }
    }

    /// Hand a resource back. Healthy handles rejoin the idle set; unhealthy
    /// ones are destroyed and replaced in place. A failed replacement
    /// permanently shrinks the pool by one (logged, never fatal).
    pub async fn release(&self, mut guard: PoolGuard<F::Resource>) {
        let Some(resource) = guard.resource.take() else {
            return;
        };
        self.shared.active.fetch_sub(1, Ordering::SeqCst);

        if self.shared.closed.load(Ordering::SeqCst) {
            tracing::debug!(resource_id = %resource.id(), "Pool closed, destroying resource");
            resource.close().await;
            return;
        }

        if resource.is_healthy().await {
            tracing::debug!(resource_id = %resource.id(), "Resource returned to pool");
            self.shared.idle.lock().unwrap().push_back(resource);
            self.shared.notify.notify_one();
            return;
        }

        tracing::warn!(resource_id = %resource.id(), "Resource unhealthy, replacing");
        resource.close().await;
        match self.factory.create().await {
            Ok(fresh) => {
                tracing::info!(resource_id = %fresh.id(), "Replacement resource created");
                self.shared.idle.lock().unwrap().push_back(fresh);
                self.shared.notify.notify_one();
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Failed to create replacement; pool capacity reduced by one"
                );
            }
        }
    }

    /// Destroy every idle resource and refuse further acquisitions.
    ///
    /// Checked-out resources are not interrupted; they are destroyed when
    /// their worker releases them.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down resource pool");
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();

        let drained: Vec<_> = {
            let mut idle = self.shared.idle.lock().unwrap();
            idle.drain(..).collect()
        };
        for resource in drained {
            resource.close().await;
        }
        tracing::info!("Resource pool shutdown completed");
    }

    /// Current pool occupancy. Never blocks on resource operations.
    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            available: self.shared.idle.lock().unwrap().len(),
            active: self.shared.active.load(Ordering::SeqCst),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockResourceFactory;

    #[tokio::test]
    async fn test_initialize_tolerates_construction_failures() {
        let factory = MockResourceFactory::with_script(vec![
            Ok(()),
            Err(AppError::ResourceCreation("no binary".into())),
            Ok(()),
        ]);
        let pool = ResourcePool::initialize(factory, 3, Duration::from_secs(1)).await;

        let status = pool.status();
        assert_eq!(status.available, 2);
        assert_eq!(status.active, 0);
        assert_eq!(status.capacity, 3);
    }

    #[tokio::test]
    async fn test_acquire_release_roundtrip() {
        let factory = MockResourceFactory::healthy();
        let pool = ResourcePool::initialize(factory, 2, Duration::from_secs(1)).await;

        let guard = pool.acquire().await.unwrap();
        let status = pool.status();
        assert_eq!(status.available, 1);
        assert_eq!(status.active, 1);

        pool.release(guard).await;
        let status = pool.status();
        assert_eq!(status.available, 2);
        assert_eq!(status.active, 0);
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_exhausted() {
        let factory = MockResourceFactory::healthy();
        let pool = ResourcePool::initialize(factory, 1, Duration::from_millis(50)).await;

        let _held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, AppError::PoolExhausted(_)));
    }

    #[tokio::test]
    async fn test_acquire_fails_immediately_on_empty_pool_after_timeout() {
        let factory = MockResourceFactory::always_failing();
        let pool = ResourcePool::initialize(factory, 2, Duration::from_millis(20)).await;

        assert_eq!(pool.status().available, 0);
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, AppError::PoolExhausted(_)));
    }

    #[tokio::test]
    async fn test_unhealthy_resource_replaced_on_release() {
        let factory = MockResourceFactory::healthy();
        let pool =
            ResourcePool::initialize(factory.clone(), 1, Duration::from_secs(1)).await;

        let guard = pool.acquire().await.unwrap();
        factory.set_healthy(false);
        pool.release(guard).await;

        assert_eq!(pool.status().available, 1);
        assert_eq!(factory.created_count(), 2);
        assert_eq!(factory.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_replacement_shrinks_pool() {
        let factory = MockResourceFactory::healthy();
        let pool =
            ResourcePool::initialize(factory.clone(), 1, Duration::from_secs(1)).await;

        let guard = pool.acquire().await.unwrap();
        factory.set_healthy(false);
        factory.fail_further_creations();
        pool.release(guard).await;

        let status = pool.status();
        assert_eq!(status.available, 0);
        assert_eq!(status.active, 0);
        assert_eq!(status.capacity, 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_idle_and_rejects_acquire() {
        let factory = MockResourceFactory::healthy();
        let pool =
            ResourcePool::initialize(factory.clone(), 2, Duration::from_secs(1)).await;

        pool.shutdown().await;
        assert_eq!(factory.closed_count(), 2);
        assert!(matches!(
            pool.acquire().await.unwrap_err(),
            AppError::PoolClosed
        ));
    }

    #[tokio::test]
    async fn test_release_after_shutdown_destroys_resource() {
        let factory = MockResourceFactory::healthy();
        let pool =
            ResourcePool::initialize(factory.clone(), 1, Duration::from_secs(1)).await;

        let guard = pool.acquire().await.unwrap();
        pool.shutdown().await;
        pool.release(guard).await;

        assert_eq!(factory.closed_count(), 1);
        assert_eq!(pool.status().available, 0);
    }

    #[tokio::test]
    async fn test_dropped_guard_returns_resource() {
        let factory = MockResourceFactory::healthy();
        let pool = ResourcePool::initialize(factory, 1, Duration::from_secs(1)).await;

        {
            let _guard = pool.acquire().await.unwrap();
            assert_eq!(pool.status().active, 1);
        }
        let status = pool.status();
        assert_eq!(status.available, 1);
        assert_eq!(status.active, 0);
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_never_exceed_capacity() {
        let factory = MockResourceFactory::healthy();
        let pool = Arc::new(ResourcePool::initialize(factory, 2, Duration::from_secs(5)).await);

        let in_use = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            let in_use = Arc::clone(&in_use);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let guard = pool.acquire().await.unwrap();
                let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_use.fetch_sub(1, Ordering::SeqCst);
                pool.release(guard).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        let status = pool.status();
        assert_eq!(status.available, 2);
        assert_eq!(status.active, 0);
    }
}
