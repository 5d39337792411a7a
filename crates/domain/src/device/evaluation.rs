//! Reconciliation decision: liveness refresh and command selection.

use super::{Device, Liveness};
use crate::command::OutboundCommand;
use crate::event::{DeviceEvent, DeviceEventKind};
use crate::time::{Timestamp, has_elapsed};

/// Outcome of a mutating device operation.
///
/// Commands are to be sent to the device, events published, once the
/// mutated device has been saved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub commands: Vec<OutboundCommand>,
    pub events: Vec<DeviceEvent>,
}

impl Evaluation {
    /// An outcome carrying a single command and no event.
    #[must_use]
    pub fn command(command: OutboundCommand) -> Self {
        Self {
            commands: vec![command],
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.events.is_empty()
    }

    /// Append another outcome, keeping order.
    pub fn extend(&mut self, other: Self) {
        self.commands.extend(other.commands);
        self.events.extend(other.events);
    }
}

impl From<Option<OutboundCommand>> for Evaluation {
    fn from(value: Option<OutboundCommand>) -> Self {
        value.map(Self::command).unwrap_or_default()
    }
}

impl Device {
    /// Run one reconciliation step at `now`.
    ///
    /// Liveness is refreshed first, then at most one `CONFIG`, or a
    /// `KEEP_ALIVE` and/or a `NEW_STATE`, is selected.
    pub fn evaluate(&mut self, now: Timestamp) -> Evaluation {
        let mut evaluation = Evaluation::default();
        self.refresh_liveness(now, &mut evaluation.events);
        self.select_commands(now, &mut evaluation);
        evaluation
    }

    fn refresh_liveness(&mut self, now: Timestamp, events: &mut Vec<DeviceEvent>) {
        // never heard from: still dead, nothing to report
        let Some(last_receive) = self.vitals.last_command_receive_time else {
            self.vitals.actual_state = Liveness::Dead;
            return;
        };
        let liveness = if now - last_receive >= self.vitals.desired_config.standby_timeout() {
            Liveness::Dead
        } else {
            Liveness::Alive
        };
        self.transition_to(liveness, now, events);
    }

    pub(super) fn transition_to(
        &mut self,
        liveness: Liveness,
        now: Timestamp,
        events: &mut Vec<DeviceEvent>,
    ) {
        if self.vitals.actual_state == liveness {
            return;
        }
        self.vitals.actual_state = liveness;
        let kind = match liveness {
            Liveness::Alive => DeviceEventKind::DeviceStarted,
            Liveness::Dead => DeviceEventKind::DeviceShutdown,
        };
        events.push(DeviceEvent::new(self.id, kind, now));
    }

    fn select_commands(&mut self, now: Timestamp, evaluation: &mut Evaluation) {
        let vitals = &mut self.vitals;

        if vitals.desired_state.is_alive()
            && has_elapsed(vitals.last_config_send_time, self.config_interval, now)
            && !vitals.is_config_synchronised()
        {
            vitals.last_config_send_time = Some(now);
            evaluation.commands.push(OutboundCommand::Config {
                device_id: self.id,
                config: vitals.desired_config,
            });
            return;
        }

        if !vitals.is_fully_alive() {
            return;
        }

        if has_elapsed(vitals.last_keep_alive_send_time, self.keepalive_interval, now) {
            vitals.last_keep_alive_send_time = Some(now);
            evaluation
                .commands
                .push(OutboundCommand::KeepAlive { device_id: self.id });
            evaluation.events.push(DeviceEvent::new(
                self.id,
                DeviceEventKind::KeepaliveSent,
                now,
            ));
        }

        if has_elapsed(vitals.last_new_state_send_time, self.new_state_interval, now)
            && self.circuits.iter().any(|c| c.is_unsynchronised())
        {
            vitals.last_new_state_send_time = Some(now);
            evaluation.commands.push(self.new_state_command());
        }
    }
}
