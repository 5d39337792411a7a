//! Device configuration value object.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::{RelayHubError, ValidationError};

/// Timing configuration pushed to a device with `CONFIG`.
///
/// Stored as whole seconds because that is the wire resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceConfig {
    standby_timeout_secs: i32,
    heartbeat_interval_secs: i32,
}

impl DeviceConfig {
    /// Build a validated configuration. Sub-second parts are truncated.
    ///
    /// # Errors
    ///
    /// Returns [`RelayHubError::Validation`] when either duration is below
    /// one second or above `i32::MAX` seconds.
    pub fn new(
        standby_timeout: TimeDelta,
        heartbeat_interval: TimeDelta,
    ) -> Result<Self, RelayHubError> {
        Ok(Self {
            standby_timeout_secs: checked_secs("standby_timeout", standby_timeout)?,
            heartbeat_interval_secs: checked_secs("heartbeat_interval", heartbeat_interval)?,
        })
    }

    /// Wrap raw second counts without validation, as read from a frame.
    #[must_use]
    pub const fn from_secs(standby_timeout_secs: i32, heartbeat_interval_secs: i32) -> Self {
        Self {
            standby_timeout_secs,
            heartbeat_interval_secs,
        }
    }

    /// Placeholder for a device whose configuration is unknown.
    ///
    /// Both durations are zero, so it never equals a valid configuration.
    #[must_use]
    pub const fn unconfigured() -> Self {
        Self::from_secs(0, 0)
    }

    /// Both durations are at least one second.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.standby_timeout_secs >= 1 && self.heartbeat_interval_secs >= 1
    }

    #[must_use]
    pub const fn standby_timeout_secs(&self) -> i32 {
        self.standby_timeout_secs
    }

    #[must_use]
    pub const fn heartbeat_interval_secs(&self) -> i32 {
        self.heartbeat_interval_secs
    }

    /// Maximum silence before the device is declared dead.
    #[must_use]
    pub fn standby_timeout(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.standby_timeout_secs))
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.heartbeat_interval_secs))
    }
}

impl Default for DeviceConfig {
    /// Five minutes of standby, one heartbeat a minute.
    fn default() -> Self {
        Self::from_secs(300, 60)
    }
}

fn checked_secs(field: &'static str, duration: TimeDelta) -> Result<i32, ValidationError> {
    let seconds = duration.num_seconds();
    let max = i64::from(i32::MAX);
    match i32::try_from(seconds) {
        Ok(value) if value >= 1 => Ok(value),
        _ => Err(ValidationError::DurationOutOfRange {
            field,
            seconds,
            max,
        }),
    }
}
