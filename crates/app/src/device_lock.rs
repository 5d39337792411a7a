//! Per-device locks.
//!
//! The reconciliation tick and inbound frames mutate the same aggregates
//! concurrently. Each read-evaluate-write unit holds the lock of its device,
//! so units on one device run one at a time while different devices never
//! wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use relayhub_domain::id::DeviceId;

type Registry = Arc<Mutex<HashMap<DeviceId, Arc<tokio::sync::Mutex<()>>>>>;

/// Registry of one async mutex per device, shared by every service.
///
/// Entries only live while a unit holds or waits for them, so ids that are
/// never seen again (unknown or spoofed devices) do not accumulate.
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct DeviceLocks {
    inner: Registry,
}

/// Exclusive access to one device; released on drop.
#[derive(Debug)]
pub struct DeviceLockGuard {
    id: DeviceId,
    guard: Option<OwnedMutexGuard<()>>,
    registry: Registry,
}

impl DeviceLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn lock(&self, id: DeviceId) -> DeviceLockGuard {
        let mutex = {
            let mut registry = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(registry.entry(id).or_default())
        };
        DeviceLockGuard {
            id,
            guard: Some(mutex.lock_owned().await),
            registry: Arc::clone(&self.inner),
        }
    }

    /// Number of devices currently locked or waited on.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for DeviceLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // The registry's own handle is the last one: nobody holds or awaits it.
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if registry
            .get(&self.id)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            registry.remove(&self.id);
        }
    }
}
