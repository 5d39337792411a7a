//! Device events: immutable records of what the aggregate observed or did.
//!
//! Events are returned by the mutating operation that produced them; the
//! caller publishes them once the mutation has been persisted.

use serde::{Deserialize, Serialize};

use crate::id::{DeviceId, EventId};
use crate::time::Timestamp;

/// What happened to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceEventKind {
    /// The device went from dead to alive.
    DeviceStarted,
    /// The device stayed silent past its standby timeout.
    DeviceShutdown,
    /// A keepalive command was produced for the device.
    KeepaliveSent,
}

impl DeviceEventKind {
    /// Stable snake-case name, as used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeviceStarted => "device_started",
            Self::DeviceShutdown => "device_shutdown",
            Self::KeepaliveSent => "keepalive_sent",
        }
    }
}

impl std::fmt::Display for DeviceEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timestamped domain event about one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub id: EventId,
    pub device_id: DeviceId,
    pub kind: DeviceEventKind,
    pub timestamp: Timestamp,
}

impl DeviceEvent {
    #[must_use]
    pub fn new(device_id: DeviceId, kind: DeviceEventKind, timestamp: Timestamp) -> Self {
        Self {
            id: EventId::new(),
            device_id,
            kind,
            timestamp,
        }
    }
}
