//! Binary wire codec.
//!
//! Frame layout:
//!
//! ```text
//! +-----------+------+-------------+-----------------+
//! | device id | type | payload len | payload         |
//! | 2B BE i16 | 1B   | 1B          | payload len B   |
//! +-----------+------+-------------+-----------------+
//! ```
//!
//! Circuit state payloads are MSB-first bit fields; config payloads are two
//! big-endian `i32` second counts (standby timeout, then heartbeat interval).

use super::bits::{pack_bits, unpack_bits};
use super::{Command, CommandType, InboundCommand, OutboundCommand};
use crate::circuit::CircuitState;
use crate::device::DeviceConfig;
use crate::error::ProtocolError;
use crate::id::DeviceId;

/// Fixed header size in bytes.
pub const HEADER_LEN: usize = 4;
/// Largest payload the one-byte length field can describe.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

const CONFIG_PAYLOAD_LEN: usize = 8;

type Decoder = fn(DeviceId, &[u8]) -> Result<Command, ProtocolError>;

/// One decoder per type code.
static DECODERS: [(CommandType, Decoder); 8] = [
    (CommandType::KeepAlive, decode_keep_alive),
    (CommandType::Start, decode_start),
    (CommandType::Heartbeat, decode_heartbeat),
    (CommandType::NewState, decode_new_state),
    (CommandType::AckState, decode_ack_state),
    (CommandType::Config, decode_config),
    (CommandType::AckConfig, decode_ack_config),
    (CommandType::RequestConfig, decode_request_config),
];

/// Encode a command into a frame.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] when the payload exceeds
/// [`MAX_PAYLOAD_LEN`] bytes.
pub fn encode(command: &Command) -> Result<Vec<u8>, ProtocolError> {
    let payload = encode_payload(command);
    let len = u8::try_from(payload.len()).map_err(|_| ProtocolError::PayloadTooLarge(payload.len()))?;

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&command.device_id().to_be_bytes());
    frame.push(command.command_type().code());
    frame.push(len);
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode a frame into a command of either direction.
///
/// # Errors
///
/// Returns a [`ProtocolError`] when the frame is shorter than its header or
/// declared payload, carries trailing bytes, uses an unknown type code, or
/// has a payload of the wrong size for its type.
pub fn decode(frame: &[u8]) -> Result<Command, ProtocolError> {
    let Some((header, payload)) = frame.split_first_chunk::<HEADER_LEN>() else {
        return Err(ProtocolError::TruncatedFrame {
            expected: HEADER_LEN,
            actual: frame.len(),
        });
    };
    let [id_hi, id_lo, code, declared] = *header;
    let device_id = DeviceId::from_be_bytes([id_hi, id_lo]);

    let decoder = DECODERS
        .iter()
        .find(|(command_type, _)| command_type.code() == code)
        .map(|(_, decoder)| *decoder)
        .ok_or(ProtocolError::UnknownCommandType(code))?;

    let declared = usize::from(declared);
    if payload.len() < declared {
        return Err(ProtocolError::TruncatedFrame {
            expected: HEADER_LEN + declared,
            actual: frame.len(),
        });
    }
    if payload.len() > declared {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared,
            actual: payload.len(),
        });
    }

    decoder(device_id, payload)
}

fn encode_payload(command: &Command) -> Vec<u8> {
    match command {
        Command::Outbound(OutboundCommand::NewState { states, .. })
        | Command::Inbound(InboundCommand::AckState { states, .. }) => {
            pack_bits(states.iter().copied().map(CircuitState::is_on))
        }
        Command::Outbound(OutboundCommand::Config { config, .. })
        | Command::Inbound(InboundCommand::AckConfig { config, .. }) => {
            let mut payload = Vec::with_capacity(CONFIG_PAYLOAD_LEN);
            payload.extend_from_slice(&config.standby_timeout_secs().to_be_bytes());
            payload.extend_from_slice(&config.heartbeat_interval_secs().to_be_bytes());
            payload
        }
        Command::Outbound(OutboundCommand::KeepAlive { .. } | OutboundCommand::Start { .. })
        | Command::Inbound(
            InboundCommand::Heartbeat { .. } | InboundCommand::RequestConfig { .. },
        ) => Vec::new(),
    }
}

fn expect_size(
    command_type: CommandType,
    payload: &[u8],
    expected: usize,
) -> Result<(), ProtocolError> {
    if payload.len() == expected {
        Ok(())
    } else {
        Err(ProtocolError::InvalidPayloadSize {
            command_type,
            expected,
            actual: payload.len(),
        })
    }
}

fn decode_states(payload: &[u8]) -> Vec<CircuitState> {
    unpack_bits(payload)
        .into_iter()
        .map(CircuitState::from)
        .collect()
}

fn decode_config_payload(
    command_type: CommandType,
    payload: &[u8],
) -> Result<DeviceConfig, ProtocolError> {
    expect_size(command_type, payload, CONFIG_PAYLOAD_LEN)?;
    let (standby, heartbeat) = payload.split_at(4);
    let read = |bytes: &[u8]| {
        <[u8; 4]>::try_from(bytes)
            .map(i32::from_be_bytes)
            .map_err(|_| ProtocolError::InvalidPayloadSize {
                command_type,
                expected: CONFIG_PAYLOAD_LEN,
                actual: payload.len(),
            })
    };
    Ok(DeviceConfig::from_secs(read(standby)?, read(heartbeat)?))
}

fn decode_keep_alive(device_id: DeviceId, payload: &[u8]) -> Result<Command, ProtocolError> {
    expect_size(CommandType::KeepAlive, payload, 0)?;
    Ok(OutboundCommand::KeepAlive { device_id }.into())
}

fn decode_start(device_id: DeviceId, payload: &[u8]) -> Result<Command, ProtocolError> {
    expect_size(CommandType::Start, payload, 0)?;
    Ok(OutboundCommand::Start { device_id }.into())
}

fn decode_heartbeat(device_id: DeviceId, payload: &[u8]) -> Result<Command, ProtocolError> {
    expect_size(CommandType::Heartbeat, payload, 0)?;
    Ok(InboundCommand::Heartbeat { device_id }.into())
}

#[allow(clippy::unnecessary_wraps)]
fn decode_new_state(device_id: DeviceId, payload: &[u8]) -> Result<Command, ProtocolError> {
    Ok(OutboundCommand::NewState {
        device_id,
        states: decode_states(payload),
    }
    .into())
}

#[allow(clippy::unnecessary_wraps)]
fn decode_ack_state(device_id: DeviceId, payload: &[u8]) -> Result<Command, ProtocolError> {
    Ok(InboundCommand::AckState {
        device_id,
        states: decode_states(payload),
    }
    .into())
}

fn decode_config(device_id: DeviceId, payload: &[u8]) -> Result<Command, ProtocolError> {
    let config = decode_config_payload(CommandType::Config, payload)?;
    Ok(OutboundCommand::Config { device_id, config }.into())
}

fn decode_ack_config(device_id: DeviceId, payload: &[u8]) -> Result<Command, ProtocolError> {
    let config = decode_config_payload(CommandType::AckConfig, payload)?;
    Ok(InboundCommand::AckConfig { device_id, config }.into())
}

fn decode_request_config(device_id: DeviceId, payload: &[u8]) -> Result<Command, ProtocolError> {
    expect_size(CommandType::RequestConfig, payload, 0)?;
    Ok(InboundCommand::RequestConfig { device_id }.into())
}
