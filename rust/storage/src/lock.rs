use crate::types::QName;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use trashcan_error::{ErrorCodes, TrashcanError};
use uuid::Uuid;

/// Opaque proof of lease ownership. Refresh and release only succeed with
/// the token handed out by the acquire that currently holds the lease.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaseToken(Uuid);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LockError {
    /// The lease is held elsewhere. Expected steady-state in a
    /// multi-instance deployment, not a fault.
    #[error("Lock unavailable: {0} is held by another instance")]
    Unavailable(String),
    /// The lease expired or was taken over since this token was issued.
    #[error("Lease no longer held")]
    NotHeld,
}

impl TrashcanError for LockError {
    fn code(&self) -> ErrorCodes {
        match self {
            LockError::Unavailable(_) => ErrorCodes::Unavailable,
            LockError::NotHeld => ErrorCodes::FailedPrecondition,
        }
    }
}

/// Cluster-wide TTL lease service, modeled on the job-lock services this
/// cleaner is deployed against. All methods fail fast; none block on a
/// contended lease.
#[async_trait]
pub trait LockService: Send + Sync + Debug {
    async fn try_acquire(&self, name: &QName, ttl: Duration) -> Result<LeaseToken, LockError>;

    /// Extends the lease identified by `token` by another `ttl`.
    async fn refresh(
        &self,
        token: &LeaseToken,
        name: &QName,
        ttl: Duration,
    ) -> Result<(), LockError>;

    /// Idempotent: releasing an expired or already-released lease succeeds.
    async fn release(&self, token: &LeaseToken, name: &QName) -> Result<(), LockError>;
}

#[derive(Debug)]
struct Holder {
    token: LeaseToken,
    deadline: Instant,
}

/// Single-process lease service with real TTL semantics, for tests and
/// single-node deployments. Uses `tokio::time::Instant` so paused-clock
/// tests can drive expiry deterministically.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockService {
    holders: Arc<Mutex<HashMap<String, Holder>>>,
}

impl MemoryLockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the current holder regardless of token, simulating an external
    /// lease invalidation (e.g. an operator breaking the lock).
    pub fn invalidate(&self, name: &QName) {
        self.holders.lock().remove(&name.to_string());
    }
}

#[async_trait]
impl LockService for MemoryLockService {
    async fn try_acquire(&self, name: &QName, ttl: Duration) -> Result<LeaseToken, LockError> {
        let key = name.to_string();
        let mut holders = self.holders.lock();
        let now = Instant::now();
        if let Some(holder) = holders.get(&key) {
            if holder.deadline > now {
                return Err(LockError::Unavailable(key));
            }
        }
        let token = LeaseToken(Uuid::new_v4());
        holders.insert(
            key,
            Holder {
                token: token.clone(),
                deadline: now + ttl,
            },
        );
        Ok(token)
    }

    async fn refresh(
        &self,
        token: &LeaseToken,
        name: &QName,
        ttl: Duration,
    ) -> Result<(), LockError> {
        let key = name.to_string();
        let mut holders = self.holders.lock();
        let now = Instant::now();
        match holders.get_mut(&key) {
            Some(holder) if holder.token == *token && holder.deadline > now => {
                holder.deadline = now + ttl;
                Ok(())
            }
            _ => Err(LockError::NotHeld),
        }
    }

    async fn release(&self, token: &LeaseToken, name: &QName) -> Result<(), LockError> {
        let key = name.to_string();
        let mut holders = self.holders.lock();
        if let Some(holder) = holders.get(&key) {
            if holder.token == *token {
                holders.remove(&key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_name() -> QName {
        QName::new("urn:trashcan:model:system:1.0", "test-lock")
    }

    #[tokio::test]
    async fn test_second_acquire_fails_while_held() {
        let service = MemoryLockService::new();
        let name = lock_name();
        let _token = service
            .try_acquire(&name, Duration::from_secs(30))
            .await
            .unwrap();
        let err = service
            .try_acquire(&name, Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Unavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lease_can_be_taken_over() {
        let service = MemoryLockService::new();
        let name = lock_name();
        let stale = service
            .try_acquire(&name, Duration::from_secs(30))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        let fresh = service
            .try_acquire(&name, Duration::from_secs(30))
            .await
            .unwrap();
        assert_ne!(stale, fresh);
        // The stale token can no longer refresh.
        assert_eq!(
            service.refresh(&stale, &name, Duration::from_secs(30)).await,
            Err(LockError::NotHeld)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_extends_deadline() {
        let service = MemoryLockService::new();
        let name = lock_name();
        let token = service
            .try_acquire(&name, Duration::from_secs(30))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;
        service
            .refresh(&token, &name, Duration::from_secs(30))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;
        // 40s since acquire, but only 20s since refresh: still held.
        let err = service
            .try_acquire(&name, Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let service = MemoryLockService::new();
        let name = lock_name();
        let token = service
            .try_acquire(&name, Duration::from_secs(30))
            .await
            .unwrap();
        service.release(&token, &name).await.unwrap();
        service.release(&token, &name).await.unwrap();
        // Released: the lease can be taken again.
        service
            .try_acquire(&name, Duration::from_secs(30))
            .await
            .unwrap();
    }
}
