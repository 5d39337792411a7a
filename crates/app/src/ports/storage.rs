//! Storage port: repository trait for device aggregates.

use std::future::Future;

use relayhub_domain::device::Device;
use relayhub_domain::error::RelayHubError;
use relayhub_domain::id::DeviceId;

/// Persistence of whole device aggregates, circuits and vitals included.
///
/// Every call is atomic for one device; callers serialize read-modify-write
/// sequences with [`DeviceLocks`](crate::device_lock::DeviceLocks).
pub trait DeviceRepository {
    /// Insert a new device.
    ///
    /// Fails with [`RelayHubError::DeviceExists`] when the id is taken.
    fn create(&self, device: Device) -> impl Future<Output = Result<Device, RelayHubError>> + Send;

    /// Load a device, `None` when it does not exist.
    fn get_by_id(
        &self,
        id: DeviceId,
    ) -> impl Future<Output = Result<Option<Device>, RelayHubError>> + Send;

    /// Identifiers of every device, in ascending order.
    fn list_ids(&self) -> impl Future<Output = Result<Vec<DeviceId>, RelayHubError>> + Send;

    /// Every device, in ascending id order.
    fn get_all(&self) -> impl Future<Output = Result<Vec<Device>, RelayHubError>> + Send;

    /// Overwrite an existing device.
    ///
    /// Fails with [`RelayHubError::NotFound`] when the device does not exist.
    fn save(&self, device: Device) -> impl Future<Output = Result<Device, RelayHubError>> + Send;
}

impl<T: DeviceRepository + Send + Sync> DeviceRepository for std::sync::Arc<T> {
    fn create(&self, device: Device) -> impl Future<Output = Result<Device, RelayHubError>> + Send {
        (**self).create(device)
    }

    fn get_by_id(
        &self,
        id: DeviceId,
    ) -> impl Future<Output = Result<Option<Device>, RelayHubError>> + Send {
        (**self).get_by_id(id)
    }

    fn list_ids(&self) -> impl Future<Output = Result<Vec<DeviceId>, RelayHubError>> + Send {
        (**self).list_ids()
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<Device>, RelayHubError>> + Send {
        (**self).get_all()
    }

    fn save(&self, device: Device) -> impl Future<Output = Result<Device, RelayHubError>> + Send {
        (**self).save(device)
    }
}
