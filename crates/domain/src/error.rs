//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`RelayHubError`] via `#[from]` (domain) or an explicit `From` impl
//! (adapters boxing their own error type).

use crate::command::CommandType;
use crate::id::DeviceId;

/// Top-level error for every operation exposed by the domain and app layers.
#[derive(Debug, thiserror::Error)]
pub enum RelayHubError {
    /// An argument or aggregate invariant was rejected.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The addressed device or circuit does not exist.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// A device with this id is already registered.
    #[error("device {0} already exists")]
    DeviceExists(DeviceId),

    /// A circuit change was requested while the device is not alive.
    #[error("device {0} is not alive")]
    DeviceNotAlive(DeviceId),

    /// A frame or inbound command violated the device protocol.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The persistence adapter failed.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The command transport failed to send.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Reasons an argument or aggregate fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("{field} must be between 1 and {max} seconds, got {seconds}")]
    DurationOutOfRange {
        field: &'static str,
        seconds: i64,
        max: i64,
    },

    #[error("{field} must not be negative")]
    NegativeInterval { field: &'static str },

    #[error("circuit {0} is declared more than once")]
    DuplicateCircuit(i16),

    #[error("a device supports at most {max} circuits, got {actual}")]
    TooManyCircuits { max: usize, actual: usize },
}

/// A lookup by identifier found nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

impl NotFoundError {
    #[must_use]
    pub fn device(id: DeviceId) -> Self {
        Self {
            entity: "Device",
            id: id.to_string(),
        }
    }
}

/// Violations of the binary device protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown command type {0}")]
    UnknownCommandType(u8),

    #[error("frame too short: need at least {expected} bytes, got {actual}")]
    TruncatedFrame { expected: usize, actual: usize },

    #[error("frame declares a {declared}-byte payload but carries {actual} bytes")]
    PayloadLengthMismatch { declared: usize, actual: usize },

    #[error("{command_type} payload must be {expected} bytes, got {actual}")]
    InvalidPayloadSize {
        command_type: CommandType,
        expected: usize,
        actual: usize,
    },

    #[error("payload of {0} bytes does not fit in a single frame")]
    PayloadTooLarge(usize),

    #[error("acknowledged {actual} circuit states for a device with {expected} circuits")]
    MalformedAck { expected: usize, actual: usize },

    #[error("{0} is not a device-to-server command")]
    UnexpectedDirection(CommandType),

    #[error("command for device {actual} delivered to device {expected}")]
    DeviceMismatch { expected: DeviceId, actual: DeviceId },
}
