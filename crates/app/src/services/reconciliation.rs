//! Reconciliation loop: the periodic tick that drives every device toward
//! its desired state.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use relayhub_domain::error::RelayHubError;

use super::dispatch::{SendReport, send_all};
use super::unit_of_work::UnitOfWork;
use crate::ports::{Clock, CommandTransport, DeviceRepository, EventPublisher};

/// Default tick period.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(5);

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Devices evaluated and saved.
    pub evaluated: usize,
    /// Devices whose unit of work failed.
    pub failed: usize,
    pub commands_sent: usize,
    pub send_failures: usize,
}

impl TickReport {
    fn record_sends(&mut self, report: SendReport) {
        self.commands_sent += report.sent;
        self.send_failures += report.failed;
    }
}

/// Evaluates every device on a fixed period.
///
/// Devices are processed one after the other, each in its own unit of work;
/// a failure on one device never stops the others.
pub struct ReconciliationService<R, P, T, C> {
    uow: UnitOfWork<R, P>,
    transport: T,
    clock: C,
    period: Duration,
}

impl<R, P, T, C> ReconciliationService<R, P, T, C>
where
    R: DeviceRepository + Sync,
    P: EventPublisher + Sync,
    T: CommandTransport + Sync,
    C: Clock + Sync,
{
    pub fn new(uow: UnitOfWork<R, P>, transport: T, clock: C, period: Duration) -> Self {
        Self {
            uow,
            transport,
            clock,
            period,
        }
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run one pass over the whole device population.
    ///
    /// # Errors
    ///
    /// Returns a storage error only when the device list cannot be read;
    /// per-device failures are logged and counted in the report.
    #[tracing::instrument(skip(self))]
    pub async fn tick(&self) -> Result<TickReport, RelayHubError> {
        let ids = self.uow.repo().list_ids().await?;
        let mut report = TickReport::default();

        for id in ids {
            let committed = self
                .uow
                .execute(id, |device| Ok(device.evaluate(self.clock.now())))
                .await;
            match committed {
                Ok(committed) => {
                    report.evaluated += 1;
                    let sends = send_all(&self.transport, committed.commands).await;
                    report.record_sends(sends);
                }
                Err(err) => {
                    tracing::warn!(%err, device_id = %id, "device evaluation failed");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Tick on every period until `shutdown` turns `true` or its sender is
    /// dropped. A started tick always runs to completion; missed ticks are
    /// delayed, never bunched up.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(period_secs = self.period.as_secs_f64(), "reconciliation loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    tracing::debug!("reconciliation tick started");
                    match self.tick().await {
                        Ok(report) => tracing::debug!(
                            evaluated = report.evaluated,
                            failed = report.failed,
                            commands_sent = report.commands_sent,
                            send_failures = report.send_failures,
                            "reconciliation tick finished"
                        ),
                        Err(err) => tracing::warn!(%err, "reconciliation tick failed"),
                    }
                }
            }
        }
        tracing::info!("reconciliation loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::{Arc, Mutex};

    use chrono::TimeDelta;

    use super::*;
    use crate::device_lock::DeviceLocks;
    use crate::event_bus::InProcessEventBus;
    use crate::in_memory::InMemoryDeviceRepository;
    use relayhub_domain::command::{CommandType, InboundCommand, OutboundCommand};
    use relayhub_domain::device::{Device, Liveness};
    use relayhub_domain::event::DeviceEventKind;
    use relayhub_domain::id::DeviceId;
    use relayhub_domain::time::{Timestamp, now};

    struct ManualClock(Mutex<Timestamp>);

    impl ManualClock {
        fn new(at: Timestamp) -> Self {
            Self(Mutex::new(at))
        }

        fn advance(&self, delta: TimeDelta) {
            *self.0.lock().unwrap() += delta;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Timestamp {
            *self.0.lock().unwrap()
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutboundCommand>>,
        unreachable: Option<DeviceId>,
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
            let result = if Some(command.device_id()) == self.unreachable {
                Err(RelayHubError::Transport("no route".into()))
            } else {
                self.sent.lock().unwrap().push(command);
                Ok(())
            };
            async { result }
        }
    }

    /// Delegates to the in-memory store but refuses to save one device.
    struct BrokenSaveRepo {
        inner: InMemoryDeviceRepository,
        broken: DeviceId,
    }

    impl DeviceRepository for BrokenSaveRepo {
        fn create(
            &self,
            device: Device,
        ) -> impl Future<Output = Result<Device, RelayHubError>> + Send {
            self.inner.create(device)
        }

        fn get_by_id(
            &self,
            id: DeviceId,
        ) -> impl Future<Output = Result<Option<Device>, RelayHubError>> + Send {
            self.inner.get_by_id(id)
        }

        fn list_ids(&self) -> impl Future<Output = Result<Vec<DeviceId>, RelayHubError>> + Send {
            self.inner.list_ids()
        }

        fn get_all(&self) -> impl Future<Output = Result<Vec<Device>, RelayHubError>> + Send {
            self.inner.get_all()
        }

        fn save(&self, device: Device) -> impl Future<Output = Result<Device, RelayHubError>> + Send {
            let broken = device.id() == self.broken;
            async move {
                if broken {
                    Err(RelayHubError::Storage("disk full".into()))
                } else {
                    self.inner.save(device).await
                }
            }
        }
    }

    fn enabled_device(id: i16) -> Device {
        let mut device = Device::builder(DeviceId::new(id))
            .name(format!("Relay board {id}"))
            .build()
            .unwrap();
        device.enable();
        device
    }

    fn service<R: DeviceRepository + Sync>(
        repo: R,
        transport: Arc<RecordingTransport>,
        clock: Arc<ManualClock>,
    ) -> ReconciliationService<R, Arc<InProcessEventBus>, Arc<RecordingTransport>, Arc<ManualClock>>
    {
        let uow = UnitOfWork::new(repo, Arc::new(InProcessEventBus::new(16)), DeviceLocks::new());
        ReconciliationService::new(uow, transport, clock, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn should_send_config_then_wait_for_config_interval() {
        let clock = Arc::new(ManualClock::new(now()));
        let transport = Arc::new(RecordingTransport::default());
        let repo = Arc::new(InMemoryDeviceRepository::with_devices([enabled_device(1)]));
        let service = service(Arc::clone(&repo), Arc::clone(&transport), Arc::clone(&clock));

        let first = service.tick().await.unwrap();
        assert_eq!(first.evaluated, 1);
        assert_eq!(first.commands_sent, 1);
        assert_eq!(transport.sent()[0].command_type(), CommandType::Config);

        clock.advance(TimeDelta::seconds(5));
        assert_eq!(service.tick().await.unwrap().commands_sent, 0);

        clock.advance(TimeDelta::seconds(16));
        assert_eq!(service.tick().await.unwrap().commands_sent, 1);
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn should_persist_shutdown_and_publish_event() {
        let start = now();
        let clock = Arc::new(ManualClock::new(start));
        let mut device = enabled_device(1);
        let config = device.vitals().desired_config;
        device
            .apply_inbound(
                &InboundCommand::AckConfig {
                    device_id: device.id(),
                    config,
                },
                start,
            )
            .unwrap();
        let repo = Arc::new(InMemoryDeviceRepository::with_devices([device]));
        let bus = Arc::new(InProcessEventBus::new(16));
        let mut rx = bus.subscribe();
        let uow = UnitOfWork::new(Arc::clone(&repo), Arc::clone(&bus), DeviceLocks::new());
        let service = ReconciliationService::new(
            uow,
            Arc::new(RecordingTransport::default()),
            Arc::clone(&clock),
            Duration::from_secs(5),
        );

        clock.advance(config.standby_timeout());
        service.tick().await.unwrap();

        let stored = repo.get_by_id(DeviceId::new(1)).await.unwrap().unwrap();
        assert_eq!(stored.vitals().actual_state, Liveness::Dead);
        assert_eq!(rx.recv().await.unwrap().kind, DeviceEventKind::DeviceShutdown);
    }

    #[tokio::test]
    async fn should_isolate_send_failures_per_device() {
        let clock = Arc::new(ManualClock::new(now()));
        let transport = Arc::new(RecordingTransport {
            unreachable: Some(DeviceId::new(1)),
            ..RecordingTransport::default()
        });
        let repo = InMemoryDeviceRepository::with_devices([enabled_device(1), enabled_device(2)]);
        let service = service(repo, Arc::clone(&transport), clock);

        let report = service.tick().await.unwrap();

        assert_eq!(
            report,
            TickReport {
                evaluated: 2,
                failed: 0,
                commands_sent: 1,
                send_failures: 1,
            }
        );
        assert_eq!(transport.sent()[0].device_id(), DeviceId::new(2));
    }

    #[tokio::test]
    async fn should_keep_ticking_other_devices_when_one_fails() {
        let clock = Arc::new(ManualClock::new(now()));
        let transport = Arc::new(RecordingTransport::default());
        let repo = BrokenSaveRepo {
            inner: InMemoryDeviceRepository::with_devices([enabled_device(1), enabled_device(2)]),
            broken: DeviceId::new(1),
        };
        let service = service(repo, Arc::clone(&transport), clock);

        let report = service.tick().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.evaluated, 1);
        assert_eq!(
            transport
                .sent()
                .iter()
                .map(OutboundCommand::device_id)
                .collect::<Vec<_>>(),
            vec![DeviceId::new(2)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_tick_until_shutdown() {
        let clock = Arc::new(ManualClock::new(now()));
        let transport = Arc::new(RecordingTransport::default());
        let repo = InMemoryDeviceRepository::with_devices([enabled_device(1)]);
        let service = Arc::new(service(repo, Arc::clone(&transport), clock));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runner = Arc::clone(&service);
        let handle = tokio::spawn(async move { runner.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.sent().len(), 1);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn should_stop_when_shutdown_sender_dropped() {
        let clock = Arc::new(ManualClock::new(now()));
        let repo = InMemoryDeviceRepository::new();
        let service = Arc::new(service(repo, Arc::new(RecordingTransport::default()), clock));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runner = Arc::clone(&service);
        let handle = tokio::spawn(async move { runner.run(shutdown_rx).await });
        drop(shutdown_tx);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
