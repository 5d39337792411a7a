//! Circuit: one switchable output (relay) of a device.

use serde::{Deserialize, Serialize};

use crate::error::{RelayHubError, ValidationError};
use crate::id::CircuitId;

/// On/off state of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitState {
    On,
    #[default]
    Off,
}

impl CircuitState {
    #[must_use]
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

impl From<bool> for CircuitState {
    fn from(value: bool) -> Self {
        if value { Self::On } else { Self::Off }
    }
}

impl From<CircuitState> for bool {
    fn from(value: CircuitState) -> Self {
        value.is_on()
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::On => f.write_str("on"),
            Self::Off => f.write_str("off"),
        }
    }
}

/// A switchable output owned by exactly one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Circuit {
    pub id: CircuitId,
    pub name: String,
    /// Last state confirmed by the device.
    pub actual_state: CircuitState,
    /// State requested by an operator.
    pub desired_state: CircuitState,
}

impl Circuit {
    /// Create a circuit that is off and synchronised.
    ///
    /// # Errors
    ///
    /// Returns [`RelayHubError::Validation`] when `name` is empty.
    pub fn new(id: CircuitId, name: impl Into<String>) -> Result<Self, RelayHubError> {
        let circuit = Self {
            id,
            name: name.into(),
            actual_state: CircuitState::Off,
            desired_state: CircuitState::Off,
        };
        circuit.validate()?;
        Ok(circuit)
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`RelayHubError::Validation`] when `name` is empty.
    pub fn validate(&self) -> Result<(), RelayHubError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        Ok(())
    }

    /// The device has not yet confirmed the requested state.
    #[must_use]
    pub fn is_unsynchronised(&self) -> bool {
        self.actual_state != self.desired_state
    }
}
