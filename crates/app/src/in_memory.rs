//! In-memory device repository, for tests and embedders without a database.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use relayhub_domain::device::Device;
use relayhub_domain::error::{NotFoundError, RelayHubError};
use relayhub_domain::id::DeviceId;

use crate::ports::DeviceRepository;

/// [`DeviceRepository`] keeping aggregates in a map, ordered by id.
#[derive(Debug, Default)]
pub struct InMemoryDeviceRepository {
    store: Mutex<BTreeMap<DeviceId, Device>>,
}

impl InMemoryDeviceRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a repository pre-populated with `devices`.
    #[must_use]
    pub fn with_devices(devices: impl IntoIterator<Item = Device>) -> Self {
        let store = devices.into_iter().map(|d| (d.id(), d)).collect();
        Self {
            store: Mutex::new(store),
        }
    }

    fn store(&self) -> std::sync::MutexGuard<'_, BTreeMap<DeviceId, Device>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceRepository for InMemoryDeviceRepository {
    fn create(&self, device: Device) -> impl Future<Output = Result<Device, RelayHubError>> + Send {
        let mut store = self.store();
        let result = if store.contains_key(&device.id()) {
            Err(RelayHubError::DeviceExists(device.id()))
        } else {
            store.insert(device.id(), device.clone());
            Ok(device)
        };
        async { result }
    }

    fn get_by_id(
        &self,
        id: DeviceId,
    ) -> impl Future<Output = Result<Option<Device>, RelayHubError>> + Send {
        let result = self.store().get(&id).cloned();
        async { Ok(result) }
    }

    fn list_ids(&self) -> impl Future<Output = Result<Vec<DeviceId>, RelayHubError>> + Send {
        let result: Vec<DeviceId> = self.store().keys().copied().collect();
        async { Ok(result) }
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<Device>, RelayHubError>> + Send {
        let result: Vec<Device> = self.store().values().cloned().collect();
        async { Ok(result) }
    }

    fn save(&self, device: Device) -> impl Future<Output = Result<Device, RelayHubError>> + Send {
        let mut store = self.store();
        let result = match store.get_mut(&device.id()) {
            Some(slot) => {
                *slot = device.clone();
                Ok(device)
            }
            None => Err(NotFoundError::device(device.id()).into()),
        };
        async { result }
    }
}
