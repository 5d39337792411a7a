//! Device: the aggregate root of the relay backend.
//!
//! A device owns its circuits and its [`DeviceVitals`]. Every mutation goes
//! through the methods here; operations that produce commands or events
//! return them instead of buffering them on the aggregate.

mod config;
mod evaluation;
mod inbound;
mod vitals;

use std::collections::HashSet;

use chrono::TimeDelta;

pub use config::DeviceConfig;
pub use evaluation::Evaluation;
pub use vitals::{DeviceVitals, Liveness, ParseLivenessError};

use crate::circuit::{Circuit, CircuitState};
use crate::command::OutboundCommand;
use crate::command::bits::packed_len;
use crate::command::codec::MAX_PAYLOAD_LEN;
use crate::error::{NotFoundError, RelayHubError, ValidationError};
use crate::id::{CircuitId, DeviceId};

/// Most circuits one `NEW_STATE` frame can address.
pub const MAX_CIRCUITS: usize = MAX_PAYLOAD_LEN * 8;

/// Default spacing between two `KEEP_ALIVE` sends.
pub const DEFAULT_KEEPALIVE_INTERVAL: TimeDelta = TimeDelta::seconds(10);
/// Default spacing between two `CONFIG` sends.
pub const DEFAULT_CONFIG_INTERVAL: TimeDelta = TimeDelta::seconds(20);
/// Default spacing between two `NEW_STATE` sends.
pub const DEFAULT_NEW_STATE_INTERVAL: TimeDelta = TimeDelta::seconds(5);

/// A networked controller with switchable circuits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    id: DeviceId,
    name: String,
    circuits: Vec<Circuit>,
    keepalive_interval: TimeDelta,
    config_interval: TimeDelta,
    new_state_interval: TimeDelta,
    vitals: DeviceVitals,
}

impl Device {
    /// Create a builder for the device with the given id.
    #[must_use]
    pub fn builder(id: DeviceId) -> DeviceBuilder {
        DeviceBuilder::new(id)
    }

    #[must_use]
    pub fn id(&self) -> DeviceId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Circuits in wire order.
    #[must_use]
    pub fn circuits(&self) -> &[Circuit] {
        &self.circuits
    }

    #[must_use]
    pub fn circuit(&self, circuit_id: CircuitId) -> Option<&Circuit> {
        self.circuits.iter().find(|c| c.id == circuit_id)
    }

    #[must_use]
    pub fn keepalive_interval(&self) -> TimeDelta {
        self.keepalive_interval
    }

    #[must_use]
    pub fn config_interval(&self) -> TimeDelta {
        self.config_interval
    }

    #[must_use]
    pub fn new_state_interval(&self) -> TimeDelta {
        self.new_state_interval
    }

    #[must_use]
    pub fn vitals(&self) -> &DeviceVitals {
        &self.vitals
    }

    /// Desired state of every circuit, in wire order.
    #[must_use]
    pub fn desired_circuit_states(&self) -> Vec<CircuitState> {
        self.circuits.iter().map(|c| c.desired_state).collect()
    }

    /// Ask the device to come alive.
    ///
    /// Returns a `CONFIG` command only when the desired state actually
    /// changed; repeated calls are no-ops.
    pub fn enable(&mut self) -> Option<OutboundCommand> {
        if self.vitals.desired_state == Liveness::Alive {
            return None;
        }
        self.vitals.desired_state = Liveness::Alive;
        Some(OutboundCommand::Config {
            device_id: self.id,
            config: self.vitals.desired_config,
        })
    }

    /// Ask the device to stop; every circuit is switched off.
    pub fn disable(&mut self) -> OutboundCommand {
        self.vitals.desired_state = Liveness::Dead;
        for circuit in &mut self.circuits {
            circuit.desired_state = CircuitState::Off;
        }
        self.new_state_command()
    }

    /// Change the human-readable name.
    ///
    /// # Errors
    ///
    /// Returns [`RelayHubError::Validation`] when `name` is blank.
    pub fn rename(&mut self, name: impl Into<String>) -> Result<(), RelayHubError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        self.name = name;
        Ok(())
    }

    /// Request a new state for one circuit.
    ///
    /// Returns a `NEW_STATE` command carrying every circuit's desired state.
    ///
    /// # Errors
    ///
    /// Returns [`RelayHubError::DeviceNotAlive`] unless the device is alive,
    /// and [`RelayHubError::NotFound`] when the circuit is not on this
    /// device. The device is left untouched in both cases.
    pub fn request_circuit_change(
        &mut self,
        circuit_id: CircuitId,
        state: CircuitState,
    ) -> Result<OutboundCommand, RelayHubError> {
        if !self.vitals.actual_state.is_alive() {
            return Err(RelayHubError::DeviceNotAlive(self.id));
        }
        let circuit = self
            .circuits
            .iter_mut()
            .find(|c| c.id == circuit_id)
            .ok_or_else(|| NotFoundError {
                entity: "Circuit",
                id: format!("{}/{circuit_id}", self.id),
            })?;
        circuit.desired_state = state;
        Ok(self.new_state_command())
    }

    /// Replace the configuration the device should run with.
    ///
    /// The device converges through the regular `CONFIG` step of
    /// [`Device::evaluate`].
    ///
    /// # Errors
    ///
    /// Returns [`RelayHubError::Validation`] when `config` is not valid.
    pub fn reconfigure(&mut self, config: DeviceConfig) -> Result<(), RelayHubError> {
        ensure_valid_config(&config)?;
        self.vitals.desired_config = config;
        Ok(())
    }

    fn new_state_command(&self) -> OutboundCommand {
        OutboundCommand::NewState {
            device_id: self.id,
            states: self.desired_circuit_states(),
        }
    }
}

fn ensure_valid_config(config: &DeviceConfig) -> Result<(), ValidationError> {
    let checks = [
        ("standby_timeout", config.standby_timeout_secs()),
        ("heartbeat_interval", config.heartbeat_interval_secs()),
    ];
    for (field, seconds) in checks {
        if seconds < 1 {
            return Err(ValidationError::DurationOutOfRange {
                field,
                seconds: i64::from(seconds),
                max: i64::from(i32::MAX),
            });
        }
    }
    Ok(())
}

/// Step-by-step builder for [`Device`].
///
/// Also used by storage adapters to rehydrate a persisted device.
#[derive(Debug)]
pub struct DeviceBuilder {
    id: DeviceId,
    name: Option<String>,
    circuits: Vec<Circuit>,
    keepalive_interval: TimeDelta,
    config_interval: TimeDelta,
    new_state_interval: TimeDelta,
    vitals: DeviceVitals,
}

impl DeviceBuilder {
    fn new(id: DeviceId) -> Self {
        Self {
            id,
            name: None,
            circuits: Vec::new(),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            config_interval: DEFAULT_CONFIG_INTERVAL,
            new_state_interval: DEFAULT_NEW_STATE_INTERVAL,
            vitals: DeviceVitals::default(),
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a circuit; order of calls is wire order.
    #[must_use]
    pub fn circuit(mut self, circuit: Circuit) -> Self {
        self.circuits.push(circuit);
        self
    }

    #[must_use]
    pub fn circuits(mut self, circuits: impl IntoIterator<Item = Circuit>) -> Self {
        self.circuits.extend(circuits);
        self
    }

    #[must_use]
    pub fn keepalive_interval(mut self, interval: TimeDelta) -> Self {
        self.keepalive_interval = interval;
        self
    }

    #[must_use]
    pub fn config_interval(mut self, interval: TimeDelta) -> Self {
        self.config_interval = interval;
        self
    }

    #[must_use]
    pub fn new_state_interval(mut self, interval: TimeDelta) -> Self {
        self.new_state_interval = interval;
        self
    }

    /// Configuration the device should run with.
    #[must_use]
    pub fn desired_config(mut self, config: DeviceConfig) -> Self {
        self.vitals.desired_config = config;
        self
    }

    /// Replace the whole runtime status, e.g. when loading from storage.
    #[must_use]
    pub fn vitals(mut self, vitals: DeviceVitals) -> Self {
        self.vitals = vitals;
        self
    }

    /// Consume the builder, validate, and return a [`Device`].
    ///
    /// # Errors
    ///
    /// Returns [`RelayHubError::Validation`] if the name is missing or blank,
    /// a circuit is invalid or declared twice, there are more than
    /// [`MAX_CIRCUITS`] circuits, an interval is negative, or the desired
    /// configuration is not valid.
    pub fn build(self) -> Result<Device, RelayHubError> {
        let name = self.name.unwrap_or_default();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }

        if packed_len(self.circuits.len()) > MAX_PAYLOAD_LEN {
            return Err(ValidationError::TooManyCircuits {
                max: MAX_CIRCUITS,
                actual: self.circuits.len(),
            }
            .into());
        }
        let mut seen = HashSet::with_capacity(self.circuits.len());
        for circuit in &self.circuits {
            circuit.validate()?;
            if !seen.insert(circuit.id) {
                return Err(ValidationError::DuplicateCircuit(circuit.id.value()).into());
            }
        }

        for (field, interval) in [
            ("keepalive_interval", self.keepalive_interval),
            ("config_interval", self.config_interval),
            ("new_state_interval", self.new_state_interval),
        ] {
            if interval < TimeDelta::zero() {
                return Err(ValidationError::NegativeInterval { field }.into());
            }
        }

        ensure_valid_config(&self.vitals.desired_config)?;

        Ok(Device {
            id: self.id,
            name,
            circuits: self.circuits,
            keepalive_interval: self.keepalive_interval,
            config_interval: self.config_interval,
            new_state_interval: self.new_state_interval,
            vitals: self.vitals,
        })
    }
}
