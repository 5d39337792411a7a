//! # relayhubd: relayhub daemon
//!
//! Composition root that wires all adapters together and runs the
//! reconciliation daemon.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars)
//! - Initialize logging
//! - Initialize the `SQLite` connection pool and run migrations
//! - Connect to the MQTT broker
//! - Construct application services, injecting adapters via port traits
//! - Run the MQTT listener, the reconciliation loop and the event log
//! - Handle graceful shutdown (Ctrl-C)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;

use std::sync::Arc;
use std::time::Duration;

use relayhub_adapter_storage_sqlite_sqlx::SqliteDeviceRepository;
use relayhub_app::device_lock::DeviceLocks;
use relayhub_app::event_bus::InProcessEventBus;
use relayhub_app::ports::SystemClock;
use relayhub_app::services::inbound_dispatcher::InboundDispatcher;
use relayhub_app::services::reconciliation::ReconciliationService;
use relayhub_app::services::unit_of_work::UnitOfWork;
use relayhub_domain::event::DeviceEvent;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

const EVENT_BUS_CAPACITY: usize = 256;
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Database
    let db = relayhub_adapter_storage_sqlite_sqlx::Config {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await?;
    let repo = SqliteDeviceRepository::new(db.pool().clone());

    // Event bus
    let bus = Arc::new(InProcessEventBus::new(EVENT_BUS_CAPACITY));
    let events = tokio::spawn(log_events(bus.subscribe()));

    // Services
    let uow = UnitOfWork::new(repo, Arc::clone(&bus), DeviceLocks::new());
    let (transport, connection) = relayhub_adapter_mqtt::connect(&config.mqtt);
    let reconciliation = ReconciliationService::new(
        uow.clone(),
        transport.clone(),
        SystemClock,
        config.reconciliation_period(),
    );
    let dispatcher = InboundDispatcher::new(uow, transport.clone(), SystemClock);

    // Background tasks
    let (listener_stop, listener_rx) = watch::channel(false);
    let (loop_stop, loop_rx) = watch::channel(false);
    let mut listener = tokio::spawn(connection.run(dispatcher, listener_rx));
    let reconciler = tokio::spawn(async move { reconciliation.run(loop_rx).await });

    tracing::info!(
        broker = %config.mqtt.broker_host,
        port = config.mqtt.broker_port,
        period_secs = config.reconciliation.period_secs,
        "relayhubd running"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");

    // let the running tick finish before the link goes away
    let _ = loop_stop.send(true);
    if let Err(err) = reconciler.await {
        tracing::warn!(%err, "reconciliation task ended abnormally");
    }

    let finished = match transport.disconnect().await {
        Ok(()) => tokio::time::timeout(DISCONNECT_TIMEOUT, &mut listener)
            .await
            .ok(),
        Err(err) => {
            tracing::warn!(%err, "failed to request disconnect");
            None
        }
    };
    let joined = match finished {
        Some(joined) => joined,
        None => {
            let _ = listener_stop.send(true);
            listener.await
        }
    };
    if let Err(err) = joined {
        tracing::warn!(%err, "MQTT listener ended abnormally");
    }

    events.abort();
    db.close().await;
    tracing::info!("relayhubd stopped");

    Ok(())
}

/// Record every domain event in the log.
async fn log_events(mut events: broadcast::Receiver<DeviceEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => tracing::info!(
                device_id = %event.device_id,
                event = %event.kind,
                at = %event.timestamp,
                "device event"
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
