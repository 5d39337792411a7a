//! # relayhub-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `DeviceRepository`: load and save device aggregates
//!   - `CommandTransport`: deliver outbound commands to devices
//!   - `EventPublisher`: hand domain events to subscribers
//!   - `Clock`: the current instant, injected into every evaluation
//! - Define the **driving/inbound port** `InboundFrameHandler`, fed by transports
//! - Provide **in-process infrastructure** that doesn't need IO: event bus,
//!   per-device locks, in-memory repository
//! - Orchestrate the device aggregate without knowing *how* persistence or IO works:
//!   - `DeviceService`: operator use-cases (enable, disable, rename, switch circuits)
//!   - `ReconciliationService`: the periodic tick over every device
//!   - `InboundDispatcher`: decode and apply frames received from devices
//!
//! ## Dependency rule
//! Depends on `relayhub-domain` only (plus `tokio` for sync primitives and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod device_lock;
pub mod event_bus;
pub mod in_memory;
pub mod ports;
pub mod services;
