//! Weighted permit pool with delayed release
//!
//! The provider enforces a cap per rolling minute. Releasing a permit right
//! after the response would let bursts exceed that cap, so every permit stays
//! taken for a cool-down window after it is dropped.

use crate::error::{ApiError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct PermitPool {
    semaphore: Arc<Semaphore>,
    capacity: u32,
    cooldown: Duration,
}

impl PermitPool {
    /// Pool allowing `capacity` requests per `cooldown` window
    pub fn new(capacity: u32, cooldown: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
            cooldown,
        }
    }

    /// Take one permit, waiting until one frees up
    pub async fn acquire(&self) -> Result<Permit> {
        self.acquire_many(1).await
    }

    /// Take `weight` permits at once
    pub async fn acquire_many(&self, weight: u32) -> Result<Permit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_many_owned(weight)
            .await
            .map_err(|_| ApiError::PoolClosed)?;
        trace!(weight, available = self.available(), "acquired request permit");

        Ok(Permit {
            inner: Some(permit),
            cooldown: self.cooldown,
        })
    }

    /// Permits that can be taken right now
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

/// A held permit; returned to the pool one cool-down after drop
#[derive(Debug)]
pub struct Permit {
    inner: Option<OwnedSemaphorePermit>,
    cooldown: Duration,
}

impl Drop for Permit {
    fn drop(&mut self) {
        let Some(permit) = self.inner.take() else {
            return;
        };

        // Outside a runtime there is nothing to schedule on; release now
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let release_at = Instant::now() + self.cooldown;
        handle.spawn(async move {
            tokio::time::sleep_until(release_at).await;
            drop(permit);
        });
    }
}
