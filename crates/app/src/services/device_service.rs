//! Device service: operator use-cases on single devices.

use relayhub_domain::circuit::CircuitState;
use relayhub_domain::device::{Device, DeviceConfig, Evaluation};
use relayhub_domain::error::{NotFoundError, RelayHubError};
use relayhub_domain::id::{CircuitId, DeviceId};

use super::dispatch::send_all;
use super::unit_of_work::{Committed, UnitOfWork};
use crate::ports::{CommandTransport, DeviceRepository, EventPublisher};

/// Application service for operator requests on devices.
///
/// Each mutating call is one unit of work; the resulting command, if any,
/// is sent after the change is saved. A failed send is logged, not returned:
/// the next reconciliation tick repeats it.
pub struct DeviceService<R, P, T> {
    uow: UnitOfWork<R, P>,
    transport: T,
}

impl<R, P, T> DeviceService<R, P, T>
where
    R: DeviceRepository + Sync,
    P: EventPublisher + Sync,
    T: CommandTransport + Sync,
{
    /// Create a new service sharing the given unit of work.
    pub fn new(uow: UnitOfWork<R, P>, transport: T) -> Self {
        Self { uow, transport }
    }

    /// Look up a device by id, returning an error if not found.
    ///
    /// # Errors
    ///
    /// Returns [`RelayHubError::NotFound`] when no device with `id` exists,
    /// or a storage error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn get_device(&self, id: DeviceId) -> Result<Device, RelayHubError> {
        self.uow
            .repo()
            .get_by_id(id)
            .await?
            .ok_or_else(|| NotFoundError::device(id).into())
    }

    /// List all devices.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_devices(&self) -> Result<Vec<Device>, RelayHubError> {
        self.uow.repo().get_all().await
    }

    /// Ask a device to come alive; sends `CONFIG` on the first request.
    ///
    /// # Errors
    ///
    /// Returns [`RelayHubError::NotFound`] or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn enable_device(&self, id: DeviceId) -> Result<Device, RelayHubError> {
        self.run(id, |device| Ok(device.enable().into())).await
    }

    /// Ask a device to stop; every circuit is switched off.
    ///
    /// # Errors
    ///
    /// Returns [`RelayHubError::NotFound`] or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn disable_device(&self, id: DeviceId) -> Result<Device, RelayHubError> {
        self.run(id, |device| Ok(Evaluation::command(device.disable())))
            .await
    }

    /// Rename a device.
    ///
    /// # Errors
    ///
    /// Returns [`RelayHubError::Validation`] for a blank name,
    /// [`RelayHubError::NotFound`], or a storage error.
    #[tracing::instrument(skip(self, name))]
    pub async fn rename_device(
        &self,
        id: DeviceId,
        name: impl Into<String> + Send,
    ) -> Result<Device, RelayHubError> {
        let name = name.into();
        self.run(id, move |device| {
            device.rename(name)?;
            Ok(Evaluation::default())
        })
        .await
    }

    /// Switch one circuit; sends `NEW_STATE` with every circuit's state.
    ///
    /// # Errors
    ///
    /// Returns [`RelayHubError::DeviceNotAlive`] when the device is not
    /// alive, [`RelayHubError::NotFound`] for an unknown device or circuit,
    /// or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn change_circuit_state(
        &self,
        id: DeviceId,
        circuit_id: CircuitId,
        state: CircuitState,
    ) -> Result<Device, RelayHubError> {
        self.run(id, |device| {
            device
                .request_circuit_change(circuit_id, state)
                .map(Evaluation::command)
        })
        .await
    }

    /// Set the configuration a device should run with.
    ///
    /// # Errors
    ///
    /// Returns [`RelayHubError::Validation`] for an invalid configuration,
    /// [`RelayHubError::NotFound`], or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn reconfigure_device(
        &self,
        id: DeviceId,
        config: DeviceConfig,
    ) -> Result<Device, RelayHubError> {
        self.run(id, |device| {
            device.reconfigure(config)?;
            Ok(Evaluation::default())
        })
        .await
    }

    async fn run<F>(&self, id: DeviceId, mutate: F) -> Result<Device, RelayHubError>
    where
        F: FnOnce(&mut Device) -> Result<Evaluation, RelayHubError> + Send,
    {
        let Committed { device, commands } = self.uow.execute(id, mutate).await?;
        send_all(&self.transport, commands).await;
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::device_lock::DeviceLocks;
    use crate::event_bus::InProcessEventBus;
    use crate::in_memory::InMemoryDeviceRepository;
    use relayhub_domain::circuit::Circuit;
    use relayhub_domain::command::{InboundCommand, OutboundCommand};
    use relayhub_domain::device::Liveness;
    use relayhub_domain::error::ValidationError;
    use relayhub_domain::time::now;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutboundCommand>>,
        failing: bool,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<OutboundCommand> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl CommandTransport for RecordingTransport {
        fn send(
            &self,
            command: OutboundCommand,
        ) -> impl Future<Output = Result<(), RelayHubError>> + Send {
            let result = if self.failing {
                Err(RelayHubError::Transport("broker unreachable".into()))
            } else {
                self.sent.lock().unwrap().push(command);
                Ok(())
            };
            async { result }
        }
    }

    type Service = DeviceService<
        Arc<InMemoryDeviceRepository>,
        Arc<InProcessEventBus>,
        Arc<RecordingTransport>,
    >;

    const ID: DeviceId = DeviceId::new(3);

    fn device() -> Device {
        Device::builder(ID)
            .name("Porch")
            .circuit(Circuit::new(CircuitId::new(1), "Light").unwrap())
            .circuit(Circuit::new(CircuitId::new(2), "Fan").unwrap())
            .build()
            .unwrap()
    }

    fn make_service(
        device: Device,
        transport: RecordingTransport,
    ) -> (Service, Arc<InMemoryDeviceRepository>, Arc<RecordingTransport>) {
        let repo = Arc::new(InMemoryDeviceRepository::with_devices([device]));
        let transport = Arc::new(transport);
        let uow = UnitOfWork::new(
            Arc::clone(&repo),
            Arc::new(InProcessEventBus::new(16)),
            DeviceLocks::new(),
        );
        let service = DeviceService::new(uow, Arc::clone(&transport));
        (service, repo, transport)
    }

    fn alive_device() -> Device {
        let mut device = device();
        device.enable();
        device
            .apply_inbound(&InboundCommand::Heartbeat { device_id: ID }, now())
            .unwrap();
        device
    }

    #[tokio::test]
    async fn should_get_device_by_id() {
        let (service, _, _) = make_service(device(), RecordingTransport::default());
        let found = service.get_device(ID).await.unwrap();
        assert_eq!(found.name(), "Porch");
    }

    #[tokio::test]
    async fn should_return_not_found_for_unknown_device() {
        let (service, _, _) = make_service(device(), RecordingTransport::default());
        let result = service.get_device(DeviceId::new(99)).await;
        assert!(matches!(result, Err(RelayHubError::NotFound(_))));
    }

    #[tokio::test]
    async fn should_list_devices() {
        let (service, _, _) = make_service(device(), RecordingTransport::default());
        assert_eq!(service.list_devices().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn should_send_config_when_enabling() {
        let (service, repo, transport) = make_service(device(), RecordingTransport::default());

        let updated = service.enable_device(ID).await.unwrap();

        assert_eq!(updated.vitals().desired_state, Liveness::Alive);
        assert!(matches!(
            transport.sent().as_slice(),
            [OutboundCommand::Config { .. }]
        ));
        let stored = repo.get_by_id(ID).await.unwrap().unwrap();
        assert_eq!(stored.vitals().desired_state, Liveness::Alive);
    }

    #[tokio::test]
    async fn should_send_nothing_when_enabling_twice() {
        let (service, _, transport) = make_service(device(), RecordingTransport::default());
        service.enable_device(ID).await.unwrap();
        service.enable_device(ID).await.unwrap();
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn should_switch_everything_off_when_disabling() {
        let (service, _, transport) = make_service(alive_device(), RecordingTransport::default());
        service
            .change_circuit_state(ID, CircuitId::new(2), CircuitState::On)
            .await
            .unwrap();

        let updated = service.disable_device(ID).await.unwrap();

        assert_eq!(updated.vitals().desired_state, Liveness::Dead);
        assert_eq!(
            transport.sent().last(),
            Some(&OutboundCommand::NewState {
                device_id: ID,
                states: vec![CircuitState::Off, CircuitState::Off],
            })
        );
    }

    #[tokio::test]
    async fn should_send_new_state_when_changing_circuit() {
        let (service, _, transport) = make_service(alive_device(), RecordingTransport::default());

        let updated = service
            .change_circuit_state(ID, CircuitId::new(1), CircuitState::On)
            .await
            .unwrap();

        assert_eq!(
            updated.circuit(CircuitId::new(1)).unwrap().desired_state,
            CircuitState::On
        );
        assert_eq!(
            transport.sent(),
            vec![OutboundCommand::NewState {
                device_id: ID,
                states: vec![CircuitState::On, CircuitState::Off],
            }]
        );
    }

    #[tokio::test]
    async fn should_refuse_circuit_change_on_dead_device() {
        let (service, repo, transport) = make_service(device(), RecordingTransport::default());

        let result = service
            .change_circuit_state(ID, CircuitId::new(1), CircuitState::On)
            .await;

        assert!(matches!(result, Err(RelayHubError::DeviceNotAlive(_))));
        assert!(transport.sent().is_empty());
        assert_eq!(repo.get_by_id(ID).await.unwrap().unwrap(), device());
    }

    #[tokio::test]
    async fn should_return_not_found_for_unknown_circuit() {
        let (service, _, transport) = make_service(alive_device(), RecordingTransport::default());
        let result = service
            .change_circuit_state(ID, CircuitId::new(42), CircuitState::On)
            .await;
        assert!(matches!(result, Err(RelayHubError::NotFound(_))));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn should_keep_change_when_send_fails() {
        let transport = RecordingTransport {
            failing: true,
            ..RecordingTransport::default()
        };
        let (service, repo, _) = make_service(alive_device(), transport);

        service
            .change_circuit_state(ID, CircuitId::new(1), CircuitState::On)
            .await
            .unwrap();

        let stored = repo.get_by_id(ID).await.unwrap().unwrap();
        assert!(stored.circuit(CircuitId::new(1)).unwrap().is_unsynchronised());
    }

    #[tokio::test]
    async fn should_rename_device() {
        let (service, _, transport) = make_service(device(), RecordingTransport::default());
        let updated = service.rename_device(ID, "Back porch").await.unwrap();
        assert_eq!(updated.name(), "Back porch");
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn should_reject_blank_rename() {
        let (service, _, _) = make_service(device(), RecordingTransport::default());
        let result = service.rename_device(ID, "").await;
        assert!(matches!(
            result,
            Err(RelayHubError::Validation(ValidationError::EmptyName))
        ));
    }

    #[tokio::test]
    async fn should_store_new_desired_config() {
        let (service, _, transport) = make_service(device(), RecordingTransport::default());
        let config = DeviceConfig::from_secs(45, 15);

        let updated = service.reconfigure_device(ID, config).await.unwrap();

        assert_eq!(updated.vitals().desired_config, config);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn should_publish_no_event_for_operator_actions() {
        let repo = Arc::new(InMemoryDeviceRepository::with_devices([device()]));
        let bus = Arc::new(InProcessEventBus::new(16));
        let mut rx = bus.subscribe();
        let uow = UnitOfWork::new(Arc::clone(&repo), Arc::clone(&bus), DeviceLocks::new());
        let service = DeviceService::new(uow, Arc::new(RecordingTransport::default()));

        service.enable_device(ID).await.unwrap();

        assert!(rx.try_recv().is_err());
    }
}
