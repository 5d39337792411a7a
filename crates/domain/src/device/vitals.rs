//! Runtime status of a device.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::DeviceConfig;
use crate::time::Timestamp;

/// Whether a device is (or should be) communicating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Alive,
    #[default]
    Dead,
}

impl Liveness {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alive => "alive",
            Self::Dead => "dead",
        }
    }

    #[must_use]
    pub fn is_alive(self) -> bool {
        matches!(self, Self::Alive)
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown liveness name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown liveness {0:?}")]
pub struct ParseLivenessError(String);

impl FromStr for Liveness {
    type Err = ParseLivenessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alive" => Ok(Self::Alive),
            "dead" => Ok(Self::Dead),
            other => Err(ParseLivenessError(other.to_string())),
        }
    }
}

/// Mutable status owned by one device: liveness, send bookkeeping, config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceVitals {
    pub actual_state: Liveness,
    pub desired_state: Liveness,
    /// Last time any inbound command was accepted from the device.
    pub last_command_receive_time: Option<Timestamp>,
    pub last_keep_alive_send_time: Option<Timestamp>,
    pub last_config_send_time: Option<Timestamp>,
    pub last_new_state_send_time: Option<Timestamp>,
    /// Last configuration acknowledged by the device.
    pub actual_config: DeviceConfig,
    pub desired_config: DeviceConfig,
}

impl DeviceVitals {
    /// Dead, never contacted, configuration unknown.
    #[must_use]
    pub fn new(desired_config: DeviceConfig) -> Self {
        Self {
            actual_state: Liveness::Dead,
            desired_state: Liveness::Dead,
            last_command_receive_time: None,
            last_keep_alive_send_time: None,
            last_config_send_time: None,
            last_new_state_send_time: None,
            actual_config: DeviceConfig::unconfigured(),
            desired_config,
        }
    }

    /// Both actual and desired liveness are [`Liveness::Alive`].
    #[must_use]
    pub fn is_fully_alive(&self) -> bool {
        self.actual_state.is_alive() && self.desired_state.is_alive()
    }

    #[must_use]
    pub fn is_config_synchronised(&self) -> bool {
        self.actual_config == self.desired_config
    }
}

impl Default for DeviceVitals {
    fn default() -> Self {
        Self::new(DeviceConfig::default())
    }
}
