//! Application of device-to-server commands.

use super::{Device, DeviceConfig, Evaluation, Liveness};
use crate::command::InboundCommand;
use crate::command::bits::packed_len;
use crate::error::{ProtocolError, RelayHubError};
use crate::event::DeviceEvent;
use crate::time::Timestamp;

impl Device {
    /// Apply one command received from the device at `now`, then evaluate.
    ///
    /// Any accepted command counts as a sign of life. `ACK_STATE` may carry
    /// the circuit count or the byte-padded count of states; padding is
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RelayHubError::Protocol`] when the command is addressed to
    /// another device or an `ACK_STATE` has the wrong number of states. The
    /// device is left untouched in both cases.
    pub fn apply_inbound(
        &mut self,
        command: &InboundCommand,
        now: Timestamp,
    ) -> Result<Evaluation, RelayHubError> {
        if command.device_id() != self.id {
            return Err(ProtocolError::DeviceMismatch {
                expected: self.id,
                actual: command.device_id(),
            }
            .into());
        }
        if let InboundCommand::AckState { states, .. } = command {
            self.check_ack_len(states.len())?;
        }

        let mut evaluation = Evaluation::default();
        self.mark_communicated(now, &mut evaluation.events);

        match command {
            InboundCommand::Heartbeat { .. } => {}
            InboundCommand::AckState { states, .. } => {
                for (circuit, state) in self.circuits.iter_mut().zip(states) {
                    circuit.actual_state = *state;
                }
            }
            InboundCommand::AckConfig { config, .. } => {
                self.vitals.actual_config = *config;
            }
            InboundCommand::RequestConfig { .. } => {
                // answer with CONFIG on this very evaluation
                self.vitals.actual_config = DeviceConfig::unconfigured();
                self.vitals.last_config_send_time = None;
            }
        }

        evaluation.extend(self.evaluate(now));
        Ok(evaluation)
    }

    fn check_ack_len(&self, actual: usize) -> Result<(), ProtocolError> {
        let expected = self.circuits.len();
        if actual == expected || actual == packed_len(expected) * 8 {
            Ok(())
        } else {
            Err(ProtocolError::MalformedAck { expected, actual })
        }
    }

    fn mark_communicated(&mut self, now: Timestamp, events: &mut Vec<DeviceEvent>) {
        self.vitals.last_command_receive_time = Some(now);
        self.transition_to(Liveness::Alive, now, events);
    }
}
