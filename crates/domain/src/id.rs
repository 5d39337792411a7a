//! Typed identifier newtypes.
//!
//! Device and circuit identifiers are the 16-bit signed integers used on the
//! wire; event identifiers are random UUIDs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! define_numeric_id {
    ($(#[doc = $doc:expr])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i16);

        impl $name {
            /// Wrap a raw identifier.
            #[must_use]
            pub const fn new(value: i16) -> Self {
                Self(value)
            }

            /// Access the raw identifier.
            #[must_use]
            pub const fn value(self) -> i16 {
                self.0
            }
        }

        impl From<i16> for $name {
            fn from(value: i16) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

define_numeric_id!(
    /// Unique identifier for a [`Device`](crate::device::Device).
    DeviceId
);

define_numeric_id!(
    /// Identifier of a [`Circuit`](crate::circuit::Circuit), unique within its device.
    CircuitId
);

impl DeviceId {
    /// Big-endian encoding used in the frame header.
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// Decode from the big-endian frame header bytes.
    #[must_use]
    pub const fn from_be_bytes(bytes: [u8; 2]) -> Self {
        Self(i16::from_be_bytes(bytes))
    }
}

/// Unique identifier for a [`DeviceEvent`](crate::event::DeviceEvent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(uuid::Uuid);

impl Default for EventId {
    fn default() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl EventId {
    /// Generate a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Access the inner UUID.
    #[must_use]
    pub fn as_uuid(self) -> uuid::Uuid {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
