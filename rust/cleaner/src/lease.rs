use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use trashcan_storage::{model, LeaseToken, LockError, LockService, QName};

/// The cluster-wide lock name guarding the sweep. One name for the whole
/// deployment: at most one instance sweeps at a time.
pub fn cleaner_lock_name() -> QName {
    QName::new(model::SYSTEM_MODEL_URI, "trashcan-cleaner")
}

/// Shared flag between the refresh task and the sweep loop. Starts active;
/// flips permanently once a refresh fails. The sweep polls it at every
/// checkpoint and winds down when it goes inactive.
#[derive(Clone, Debug)]
pub struct LeaseLiveness {
    active: Arc<AtomicBool>,
}

impl LeaseLiveness {
    fn new() -> Self {
        LeaseLiveness {
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn notify_lost(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Acquires and maintains the sweep lease. A successful acquire hands back
/// a [`HeldLease`] whose background task refreshes the lease at a third of
/// its TTL until released or lost.
#[derive(Debug)]
pub struct LeaseCoordinator {
    lock_service: Arc<dyn LockService>,
    name: QName,
    ttl: Duration,
}

impl LeaseCoordinator {
    pub fn new(lock_service: Arc<dyn LockService>, ttl: Duration) -> Self {
        LeaseCoordinator {
            lock_service,
            name: cleaner_lock_name(),
            ttl,
        }
    }

    pub async fn try_acquire(&self) -> Result<HeldLease, LockError> {
        let token = self.lock_service.try_acquire(&self.name, self.ttl).await?;
        let liveness = LeaseLiveness::new();
        let cancel = CancellationToken::new();
        let refresh_task = tokio::spawn(refresh_loop(
            self.lock_service.clone(),
            token.clone(),
            self.name.clone(),
            self.ttl,
            liveness.clone(),
            cancel.clone(),
        ));
        Ok(HeldLease {
            token,
            name: self.name.clone(),
            lock_service: self.lock_service.clone(),
            liveness,
            cancel,
            refresh_task: Some(refresh_task),
        })
    }
}

async fn refresh_loop(
    lock_service: Arc<dyn LockService>,
    token: LeaseToken,
    name: QName,
    ttl: Duration,
    liveness: LeaseLiveness,
    cancel: CancellationToken,
) {
    // Refreshing at ttl/3 leaves two retries' worth of headroom before the
    // lease actually expires.
    let interval = ttl / 3;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                return;
            }
            _ = tokio::time::sleep(interval) => {
                if let Err(err) = lock_service.refresh(&token, &name, ttl).await {
                    tracing::warn!("Lost the sweep lease {}: {}", name, err);
                    liveness.notify_lost();
                    return;
                }
            }
        }
    }
}

/// A live, self-refreshing lease. Must be released through
/// [`HeldLease::release`]; the sweep teardown does this on every exit path.
#[derive(Debug)]
pub struct HeldLease {
    token: LeaseToken,
    name: QName,
    lock_service: Arc<dyn LockService>,
    liveness: LeaseLiveness,
    cancel: CancellationToken,
    refresh_task: Option<tokio::task::JoinHandle<()>>,
}

impl HeldLease {
    pub fn liveness(&self) -> LeaseLiveness {
        self.liveness.clone()
    }

    /// Stops the refresh task and gives the lease back. Releasing an
    /// already-lost lease is harmless; the underlying release is idempotent.
    pub async fn release(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.refresh_task.take() {
            if let Err(err) = task.await {
                tracing::error!("Lease refresh task failed to join: {}", err);
            }
        }
        if let Err(err) = self.lock_service.release(&self.token, &self.name).await {
            tracing::warn!("Failed to release the sweep lease {}: {}", self.name, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trashcan_storage::MemoryLockService;

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn test_refresh_keeps_the_lease_beyond_its_ttl() {
        let locks = Arc::new(MemoryLockService::new());
        let coordinator = LeaseCoordinator::new(locks.clone(), TTL);
        let lease = coordinator.try_acquire().await.unwrap();

        // Well past the original TTL; the refresh task must have extended it.
        tokio::time::sleep(TTL * 3).await;
        assert!(lease.liveness().is_active());
        let err = coordinator.try_acquire().await.unwrap_err();
        assert!(matches!(err, LockError::Unavailable(_)));

        lease.release().await;
        coordinator.try_acquire().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_lease_flips_liveness() {
        let locks = Arc::new(MemoryLockService::new());
        let coordinator = LeaseCoordinator::new(locks.clone(), TTL);
        let lease = coordinator.try_acquire().await.unwrap();
        let liveness = lease.liveness();

        locks.invalidate(&cleaner_lock_name());
        // The next refresh attempt finds the lease gone.
        tokio::time::sleep(TTL / 3 + Duration::from_secs(1)).await;
        assert!(!liveness.is_active());

        // Release after loss is still fine.
        lease.release().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_stops_refreshing() {
        let locks = Arc::new(MemoryLockService::new());
        let coordinator = LeaseCoordinator::new(locks.clone(), TTL);
        let lease = coordinator.try_acquire().await.unwrap();
        lease.release().await;

        // If the refresh task were still alive it would re-extend a lease
        // it no longer holds and flip liveness; instead the name is free.
        tokio::time::sleep(TTL).await;
        coordinator.try_acquire().await.unwrap();
    }
}
