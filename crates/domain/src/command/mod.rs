//! Command model: messages exchanged between the server and devices.
//!
//! Commands split into two closed sets by direction: [`InboundCommand`]
//! (device to server) and [`OutboundCommand`] (server to device). A decoded
//! frame is a [`Command`], which callers must match on before acting on it.

pub mod bits;
pub mod codec;

use std::fmt;

use crate::circuit::CircuitState;
use crate::device::DeviceConfig;
use crate::error::ProtocolError;
use crate::id::DeviceId;

/// Type code carried in byte 2 of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    KeepAlive,
    Start,
    Heartbeat,
    NewState,
    AckState,
    Config,
    AckConfig,
    RequestConfig,
}

impl CommandType {
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::KeepAlive => 1,
            Self::Start => 2,
            Self::Heartbeat => 3,
            Self::NewState => 4,
            Self::AckState => 5,
            Self::Config => 6,
            Self::AckConfig => 7,
            Self::RequestConfig => 8,
        }
    }

    /// Look up a type by its wire code.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownCommandType`] for codes outside `1..=8`.
    pub const fn from_code(code: u8) -> Result<Self, ProtocolError> {
        Ok(match code {
            1 => Self::KeepAlive,
            2 => Self::Start,
            3 => Self::Heartbeat,
            4 => Self::NewState,
            5 => Self::AckState,
            6 => Self::Config,
            7 => Self::AckConfig,
            8 => Self::RequestConfig,
            other => return Err(ProtocolError::UnknownCommandType(other)),
        })
    }

    /// Whether commands of this type travel from device to server.
    #[must_use]
    pub const fn is_inbound(self) -> bool {
        matches!(
            self,
            Self::Heartbeat | Self::AckState | Self::AckConfig | Self::RequestConfig
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KeepAlive => "KEEP_ALIVE",
            Self::Start => "START",
            Self::Heartbeat => "HEARTBEAT",
            Self::NewState => "NEW_STATE",
            Self::AckState => "ACK_STATE",
            Self::Config => "CONFIG",
            Self::AckConfig => "ACK_CONFIG",
            Self::RequestConfig => "REQUEST_CONFIG",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command sent by a device to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundCommand {
    Heartbeat {
        device_id: DeviceId,
    },
    /// Circuit states as reported by the device, in circuit order.
    ///
    /// Decoded frames carry one slot per payload bit, so the list may be
    /// longer than the device's circuit count.
    AckState {
        device_id: DeviceId,
        states: Vec<CircuitState>,
    },
    AckConfig {
        device_id: DeviceId,
        config: DeviceConfig,
    },
    RequestConfig {
        device_id: DeviceId,
    },
}

impl InboundCommand {
    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        match self {
            Self::Heartbeat { device_id }
            | Self::AckState { device_id, .. }
            | Self::AckConfig { device_id, .. }
            | Self::RequestConfig { device_id } => *device_id,
        }
    }

    #[must_use]
    pub fn command_type(&self) -> CommandType {
        match self {
            Self::Heartbeat { .. } => CommandType::Heartbeat,
            Self::AckState { .. } => CommandType::AckState,
            Self::AckConfig { .. } => CommandType::AckConfig,
            Self::RequestConfig { .. } => CommandType::RequestConfig,
        }
    }
}

/// A command sent by the server to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    KeepAlive {
        device_id: DeviceId,
    },
    Start {
        device_id: DeviceId,
    },
    /// Desired state of every circuit, in circuit order.
    NewState {
        device_id: DeviceId,
        states: Vec<CircuitState>,
    },
    Config {
        device_id: DeviceId,
        config: DeviceConfig,
    },
}

impl OutboundCommand {
    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        match self {
            Self::KeepAlive { device_id }
            | Self::Start { device_id }
            | Self::NewState { device_id, .. }
            | Self::Config { device_id, .. } => *device_id,
        }
    }

    #[must_use]
    pub fn command_type(&self) -> CommandType {
        match self {
            Self::KeepAlive { .. } => CommandType::KeepAlive,
            Self::Start { .. } => CommandType::Start,
            Self::NewState { .. } => CommandType::NewState,
            Self::Config { .. } => CommandType::Config,
        }
    }

    /// Encode into a wire frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PayloadTooLarge`] when the payload does not
    /// fit the one-byte length field.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        codec::encode(&Command::Outbound(self.clone()))
    }
}

/// Any decoded command, tagged by direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Inbound(InboundCommand),
    Outbound(OutboundCommand),
}

impl Command {
    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        match self {
            Self::Inbound(inner) => inner.device_id(),
            Self::Outbound(inner) => inner.device_id(),
        }
    }

    #[must_use]
    pub fn command_type(&self) -> CommandType {
        match self {
            Self::Inbound(inner) => inner.command_type(),
            Self::Outbound(inner) => inner.command_type(),
        }
    }

    /// Keep only device-to-server commands.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnexpectedDirection`] for outbound commands.
    pub fn into_inbound(self) -> Result<InboundCommand, ProtocolError> {
        match self {
            Self::Inbound(inner) => Ok(inner),
            Self::Outbound(inner) => Err(ProtocolError::UnexpectedDirection(inner.command_type())),
        }
    }
}

impl From<InboundCommand> for Command {
    fn from(value: InboundCommand) -> Self {
        Self::Inbound(value)
    }
}

impl From<OutboundCommand> for Command {
    fn from(value: OutboundCommand) -> Self {
        Self::Outbound(value)
    }
}
