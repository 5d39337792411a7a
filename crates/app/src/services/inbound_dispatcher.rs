//! Inbound dispatch: frames received from devices.

use std::future::Future;

use relayhub_domain::command::codec;
use relayhub_domain::error::RelayHubError;

use super::dispatch::{SendReport, send_all};
use super::unit_of_work::UnitOfWork;
use crate::ports::{Clock, CommandTransport, DeviceRepository, EventPublisher, InboundFrameHandler};

/// Decodes frames, applies them to the addressed device, and sends whatever
/// the device answers.
pub struct InboundDispatcher<R, P, T, C> {
    uow: UnitOfWork<R, P>,
    transport: T,
    clock: C,
}

impl<R, P, T, C> InboundDispatcher<R, P, T, C>
where
    R: DeviceRepository + Sync,
    P: EventPublisher + Sync,
    T: CommandTransport + Sync,
    C: Clock + Sync,
{
    pub fn new(uow: UnitOfWork<R, P>, transport: T, clock: C) -> Self {
        Self {
            uow,
            transport,
            clock,
        }
    }

    /// Apply one raw frame.
    ///
    /// Only device-to-server commands are applied; an outbound command seen
    /// here (loopback or spoofing) is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`RelayHubError::Protocol`] for undecodable, outbound or
    /// malformed commands, [`RelayHubError::NotFound`] for an unknown
    /// device, or a storage error. Nothing is saved in any of these cases.
    #[tracing::instrument(skip_all, fields(len = frame.len()))]
    pub async fn dispatch(&self, frame: &[u8]) -> Result<SendReport, RelayHubError> {
        let command = codec::decode(frame)?.into_inbound()?;
        let device_id = command.device_id();
        tracing::debug!(%device_id, command = %command.command_type(), "inbound command decoded");

        let committed = self
            .uow
            .execute(device_id, |device| {
                device.apply_inbound(&command, self.clock.now())
            })
            .await?;

        Ok(send_all(&self.transport, committed.commands).await)
    }
}

impl<R, P, T, C> InboundFrameHandler for InboundDispatcher<R, P, T, C>
where
    R: DeviceRepository + Sync,
    P: EventPublisher + Sync,
    T: CommandTransport + Sync,
    C: Clock + Sync,
{
    fn handle_frame(&self, frame: Vec<u8>) -> impl Future<Output = ()> + Send {
        async move {
            if let Err(err) = self.dispatch(&frame).await {
                tracing::warn!(%err, len = frame.len(), "dropping inbound frame");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::device_lock::DeviceLocks;
    use crate::event_bus::InProcessEventBus;
    use crate::in_memory::InMemoryDeviceRepository;
    use crate::ports::SystemClock;
    use relayhub_domain::circuit::{Circuit, CircuitState};
    use relayhub_domain::command::{Command, InboundCommand, OutboundCommand};
    use relayhub_domain::device::{Device, DeviceConfig, Liveness};
    use relayhub_domain::error::ProtocolError;
    use relayhub_domain::event::DeviceEventKind;
    use relayhub_domain::id::{CircuitId, DeviceId};

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutboundCommand>>,
    }

    impl CommandTransport for RecordingTransport {
        fn send(
            &self,
            command: OutboundCommand,
        ) -> impl Future<Output = Result<(), RelayHubError>> + Send {
            self.sent.lock().unwrap().push(command);
            async { Ok(()) }
        }
    }

    const ID: DeviceId = DeviceId::new(21);

    type Dispatcher = InboundDispatcher<
        Arc<InMemoryDeviceRepository>,
        Arc<InProcessEventBus>,
        Arc<RecordingTransport>,
        SystemClock,
    >;

    struct Fixture {
        dispatcher: Dispatcher,
        repo: Arc<InMemoryDeviceRepository>,
        bus: Arc<InProcessEventBus>,
        transport: Arc<RecordingTransport>,
    }

    fn fixture() -> Fixture {
        let mut device = Device::builder(ID)
            .name("Irrigation")
            .circuits((1..=3).map(|id| Circuit::new(CircuitId::new(id), "valve").unwrap()))
            .build()
            .unwrap();
        device.enable();
        let repo = Arc::new(InMemoryDeviceRepository::with_devices([device]));
        let bus = Arc::new(InProcessEventBus::new(16));
        let transport = Arc::new(RecordingTransport::default());
        let uow = UnitOfWork::new(Arc::clone(&repo), Arc::clone(&bus), DeviceLocks::new());
        Fixture {
            dispatcher: InboundDispatcher::new(uow, Arc::clone(&transport), SystemClock),
            repo,
            bus,
            transport,
        }
    }

    fn frame(command: InboundCommand) -> Vec<u8> {
        codec::encode(&Command::Inbound(command)).unwrap()
    }

    #[tokio::test]
    async fn should_start_device_and_answer_with_config() {
        let fx = fixture();
        let mut rx = fx.bus.subscribe();

        let report = fx
            .dispatcher
            .dispatch(&frame(InboundCommand::Heartbeat { device_id: ID }))
            .await
            .unwrap();

        assert_eq!(report.sent, 1);
        assert!(matches!(
            fx.transport.sent.lock().unwrap().as_slice(),
            [OutboundCommand::Config { .. }]
        ));
        let stored = fx.repo.get_by_id(ID).await.unwrap().unwrap();
        assert_eq!(stored.vitals().actual_state, Liveness::Alive);
        assert_eq!(rx.recv().await.unwrap().kind, DeviceEventKind::DeviceStarted);
    }

    #[tokio::test]
    async fn should_apply_padded_ack_state_from_wire() {
        let fx = fixture();
        let wire = [0x00, 0x15, 5, 1, 0b0100_0000];

        fx.dispatcher.dispatch(&wire).await.unwrap();

        let stored = fx.repo.get_by_id(ID).await.unwrap().unwrap();
        let actual: Vec<_> = stored.circuits().iter().map(|c| c.actual_state).collect();
        assert_eq!(
            actual,
            vec![CircuitState::Off, CircuitState::On, CircuitState::Off]
        );
    }

    #[tokio::test]
    async fn should_record_acknowledged_config() {
        let fx = fixture();
        let config = DeviceConfig::default();

        fx.dispatcher
            .dispatch(&frame(InboundCommand::AckConfig {
                device_id: ID,
                config,
            }))
            .await
            .unwrap();

        let stored = fx.repo.get_by_id(ID).await.unwrap().unwrap();
        assert!(stored.vitals().is_config_synchronised());
    }

    #[tokio::test]
    async fn should_reject_outbound_frame() {
        let fx = fixture();
        let loopback = codec::encode(&Command::Outbound(OutboundCommand::KeepAlive {
            device_id: ID,
        }))
        .unwrap();

        let result = fx.dispatcher.dispatch(&loopback).await;

        assert!(matches!(
            result,
            Err(RelayHubError::Protocol(ProtocolError::UnexpectedDirection(_)))
        ));
        let stored = fx.repo.get_by_id(ID).await.unwrap().unwrap();
        assert!(stored.vitals().last_command_receive_time.is_none());
    }

    #[tokio::test]
    async fn should_reject_unknown_command_type() {
        let fx = fixture();
        let result = fx.dispatcher.dispatch(&[0x00, 0x15, 0x63, 0]).await;
        assert!(matches!(
            result,
            Err(RelayHubError::Protocol(ProtocolError::UnknownCommandType(0x63)))
        ));
    }

    #[tokio::test]
    async fn should_reject_malformed_ack_without_saving() {
        let fx = fixture();
        let before = fx.repo.get_by_id(ID).await.unwrap().unwrap();

        let result = fx
            .dispatcher
            .dispatch(&frame(InboundCommand::AckState {
                device_id: ID,
                states: vec![CircuitState::On; 16],
            }))
            .await;

        assert!(matches!(
            result,
            Err(RelayHubError::Protocol(ProtocolError::MalformedAck {
                expected: 3,
                actual: 16
            }))
        ));
        assert_eq!(fx.repo.get_by_id(ID).await.unwrap().unwrap(), before);
        assert!(fx.transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_return_not_found_for_unknown_device() {
        let fx = fixture();
        let result = fx
            .dispatcher
            .dispatch(&frame(InboundCommand::Heartbeat {
                device_id: DeviceId::new(1),
            }))
            .await;
        assert!(matches!(result, Err(RelayHubError::NotFound(_))));
    }

    #[tokio::test]
    async fn should_swallow_errors_in_frame_handler() {
        let fx = fixture();
        fx.dispatcher.handle_frame(vec![0xFF]).await;
        fx.dispatcher
            .handle_frame(frame(InboundCommand::Heartbeat { device_id: ID }))
            .await;

        let stored = fx.repo.get_by_id(ID).await.unwrap().unwrap();
        assert!(stored.vitals().actual_state.is_alive());
    }
}
