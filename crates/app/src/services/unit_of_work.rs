//! Unit of work: one atomic read-evaluate-write on a single device.

use relayhub_domain::command::OutboundCommand;
use relayhub_domain::device::{Device, Evaluation};
use relayhub_domain::error::{NotFoundError, RelayHubError};
use relayhub_domain::id::DeviceId;

use crate::device_lock::DeviceLocks;
use crate::ports::{DeviceRepository, EventPublisher};

/// Result of a committed unit of work.
#[derive(Debug)]
pub struct Committed {
    /// The device as saved.
    pub device: Device,
    /// Commands to send now that the change is durable.
    pub commands: Vec<OutboundCommand>,
}

/// Runs device mutations under the device lock and publishes their events
/// once saved.
///
/// Commands are handed back to the caller rather than sent here, so the
/// lock is never held across a transport call.
#[derive(Debug, Clone)]
pub struct UnitOfWork<R, P> {
    repo: R,
    publisher: P,
    locks: DeviceLocks,
}

impl<R, P> UnitOfWork<R, P>
where
    R: DeviceRepository + Sync,
    P: EventPublisher + Sync,
{
    pub fn new(repo: R, publisher: P, locks: DeviceLocks) -> Self {
        Self {
            repo,
            publisher,
            locks,
        }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Lock, load, mutate, save, publish events, unlock.
    ///
    /// Nothing is saved or published when `mutate` fails. A publish failure
    /// after the save is logged and does not fail the unit.
    ///
    /// # Errors
    ///
    /// Returns [`RelayHubError::NotFound`] when the device does not exist,
    /// the error returned by `mutate`, or a storage error.
    pub async fn execute<F>(&self, id: DeviceId, mutate: F) -> Result<Committed, RelayHubError>
    where
        F: FnOnce(&mut Device) -> Result<Evaluation, RelayHubError> + Send,
    {
        let _guard = self.locks.lock(id).await;

        let mut device = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| NotFoundError::device(id))?;

        let Evaluation { commands, events } = mutate(&mut device)?;
        let device = self.repo.save(device).await?;

        for event in events {
            let kind = event.kind;
            if let Err(err) = self.publisher.publish(event).await {
                tracing::warn!(%err, device_id = %id, event = %kind, "failed to publish device event");
            }
        }

        Ok(Committed { device, commands })
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::Arc;

    use super::*;
    use crate::event_bus::InProcessEventBus;
    use crate::in_memory::InMemoryDeviceRepository;
    use relayhub_domain::device::DeviceConfig;
    use relayhub_domain::error::ValidationError;
    use relayhub_domain::event::{DeviceEvent, DeviceEventKind};
    use relayhub_domain::time::now;

    type Uow = UnitOfWork<Arc<InMemoryDeviceRepository>, Arc<InProcessEventBus>>;

    fn shed() -> Device {
        Device::builder(DeviceId::new(1))
            .name("Shed")
            .build()
            .unwrap()
    }

    fn setup() -> (Uow, Arc<InMemoryDeviceRepository>, Arc<InProcessEventBus>) {
        let repo = Arc::new(InMemoryDeviceRepository::with_devices([shed()]));
        let bus = Arc::new(InProcessEventBus::new(16));
        let uow = UnitOfWork::new(Arc::clone(&repo), Arc::clone(&bus), DeviceLocks::new());
        (uow, repo, bus)
    }

    /// Hands control back to the scheduler after every load, so concurrent
    /// units interleave between their read and their write.
    struct YieldingRepository(InMemoryDeviceRepository);

    impl DeviceRepository for YieldingRepository {
        fn create(
            &self,
            device: Device,
        ) -> impl Future<Output = Result<Device, RelayHubError>> + Send {
            self.0.create(device)
        }

        fn get_by_id(
            &self,
            id: DeviceId,
        ) -> impl Future<Output = Result<Option<Device>, RelayHubError>> + Send {
            async move {
                let device = self.0.get_by_id(id).await;
                tokio::task::yield_now().await;
                device
            }
        }

        fn list_ids(&self) -> impl Future<Output = Result<Vec<DeviceId>, RelayHubError>> + Send {
            self.0.list_ids()
        }

        fn get_all(&self) -> impl Future<Output = Result<Vec<Device>, RelayHubError>> + Send {
            self.0.get_all()
        }

        fn save(&self, device: Device) -> impl Future<Output = Result<Device, RelayHubError>> + Send {
            self.0.save(device)
        }
    }

    #[tokio::test]
    async fn should_save_mutation_and_return_commands() {
        let (uow, repo, _bus) = setup();

        let committed = uow
            .execute(DeviceId::new(1), |device| Ok(device.enable().into()))
            .await
            .unwrap();

        assert_eq!(committed.commands.len(), 1);
        let stored = repo.get_by_id(DeviceId::new(1)).await.unwrap().unwrap();
        assert_eq!(stored, committed.device);
        assert!(stored.vitals().desired_state.is_alive());
    }

    #[tokio::test]
    async fn should_publish_events_after_save() {
        let (uow, _repo, bus) = setup();
        let mut rx = bus.subscribe();

        uow.execute(DeviceId::new(1), |device| {
            Ok(Evaluation {
                commands: Vec::new(),
                events: vec![DeviceEvent::new(
                    device.id(),
                    DeviceEventKind::DeviceStarted,
                    now(),
                )],
            })
        })
        .await
        .unwrap();

        assert_eq!(rx.recv().await.unwrap().kind, DeviceEventKind::DeviceStarted);
    }

    #[tokio::test]
    async fn should_not_save_when_mutation_fails() {
        let (uow, repo, _bus) = setup();

        let result = uow
            .execute(DeviceId::new(1), |device| {
                device.enable();
                Err(ValidationError::EmptyName.into())
            })
            .await;

        assert!(matches!(result, Err(RelayHubError::Validation(_))));
        let stored = repo.get_by_id(DeviceId::new(1)).await.unwrap().unwrap();
        assert!(!stored.vitals().desired_state.is_alive());
    }

    #[tokio::test]
    async fn should_return_not_found_for_unknown_device() {
        let (uow, _repo, _bus) = setup();
        let result = uow
            .execute(DeviceId::new(9), |_| Ok(Evaluation::default()))
            .await;
        assert!(matches!(result, Err(RelayHubError::NotFound(_))));
    }

    #[tokio::test]
    async fn should_keep_both_changes_when_units_race_on_one_device() {
        let repo = Arc::new(YieldingRepository(InMemoryDeviceRepository::with_devices([
            shed(),
        ])));
        let bus = Arc::new(InProcessEventBus::new(16));
        let locks = DeviceLocks::new();
        let uow = UnitOfWork::new(Arc::clone(&repo), bus, locks.clone());
        let config = DeviceConfig::from_secs(120, 30);

        let renamer = uow.clone();
        let rename = tokio::spawn(async move {
            renamer
                .execute(DeviceId::new(1), |device| {
                    device.rename("Barn")?;
                    Ok(Evaluation::default())
                })
                .await
        });
        let reconfigurer = uow.clone();
        let reconfigure = tokio::spawn(async move {
            reconfigurer
                .execute(DeviceId::new(1), |device| {
                    device.reconfigure(config)?;
                    Ok(Evaluation::default())
                })
                .await
        });
        rename.await.unwrap().unwrap();
        reconfigure.await.unwrap().unwrap();

        let stored = repo.get_by_id(DeviceId::new(1)).await.unwrap().unwrap();
        assert_eq!(stored.name(), "Barn");
        assert_eq!(stored.vitals().desired_config, config);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn should_not_retain_lock_for_unknown_device() {
        let repo = Arc::new(InMemoryDeviceRepository::new());
        let locks = DeviceLocks::new();
        let uow = UnitOfWork::new(repo, Arc::new(InProcessEventBus::new(4)), locks.clone());

        for raw in 0..10 {
            let result = uow
                .execute(DeviceId::new(raw), |_| Ok(Evaluation::default()))
                .await;
            assert!(matches!(result, Err(RelayHubError::NotFound(_))));
        }

        assert!(locks.is_empty());
    }
}
