// SPDX-License-Identifier: Apache-2.0 OR MIT
// Logging facilities (component identifiers)

use serde::{Deserialize, Serialize};

/// Logging facility - identifies which component generated the log message
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facility {
    /// Coordinator orchestration, send loop, verification
    Coordinator = 0,
    /// Listener child lifecycle (spawn, exit detection, termination)
    Spawner = 1,
    /// Per-child report link over the inherited descriptor
    ControlChannel = 2,
    /// Listener receive loop and source filtering
    Listener = 3,
    /// Interface selection, socket setup
    Network = 4,
    /// Test harness and fixtures
    Test = 5,

    /// Fallback for uncategorized messages
    Unknown = 255,
}

impl Facility {
    /// Get facility code as u8
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Get facility name as static string
    pub const fn as_str(self) -> &'static str {
        match self {
            Facility::Coordinator => "Coordinator",
            Facility::Spawner => "Spawner",
            Facility::ControlChannel => "ControlChannel",
            Facility::Listener => "Listener",
            Facility::Network => "Network",
            Facility::Test => "Test",
            Facility::Unknown => "Unknown",
        }
    }

    /// Create from u8 value (returns Unknown if invalid)
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Facility::Coordinator,
            1 => Facility::Spawner,
            2 => Facility::ControlChannel,
            3 => Facility::Listener,
            4 => Facility::Network,
            5 => Facility::Test,
            _ => Facility::Unknown,
        }
    }
}

impl std::fmt::Display for Facility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
