//! Events published to live subscribers.

use bytes::Bytes;
use std::fmt;

use crate::ble::roles::CharacteristicRole;

/// Prefix of every status line.
pub const SYSTEM_PREFIX: &str = "SYSTEM: ";

/// Link status reported to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SystemStatus {
    /// No matching device within the scan window.
    ScanFailed,
    /// All roles subscribed.
    Connected,
    /// A subscribed link went away.
    Disconnected,
    /// Connect or resolve failure.
    Error,
}

impl SystemStatus {
    /// Keyword used on the live-consumer wire.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::ScanFailed => "ARDUINO_SCAN_FAILED",
            Self::Connected => "ARDUINO_CONNECTED",
            Self::Disconnected => "ARDUINO_DISCONNECTED",
            Self::Error => "ARDUINO_ERROR",
        }
    }

    /// Parse a keyword back into a status.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "ARDUINO_SCAN_FAILED" => Some(Self::ScanFailed),
            "ARDUINO_CONNECTED" => Some(Self::Connected),
            "ARDUINO_DISCONNECTED" => Some(Self::Disconnected),
            "ARDUINO_ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

/// A decoded event. Immutable once built; cloning shares the image payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    /// Text from a motion, gyro or inference characteristic.
    Telemetry {
        /// Role the text arrived on.
        role: CharacteristicRole,
        /// Decoded text, or the payload's debug rendering if it was not UTF-8.
        text: String,
    },
    /// A complete, pixel-decoded image.
    ImageReady {
        /// Grayscale pixels, row-major.
        bytes: Bytes,
    },
    /// Link status change.
    SystemStatus {
        /// What happened.
        kind: SystemStatus,
    },
}

impl DecodedEvent {
    /// Build a telemetry event.
    pub fn telemetry(role: CharacteristicRole, text: impl Into<String>) -> Self {
        Self::Telemetry {
            role,
            text: text.into(),
        }
    }

    /// Build a status event.
    pub fn status(kind: SystemStatus) -> Self {
        Self::SystemStatus { kind }
    }

    /// Check if this is a status event.
    pub fn is_status(&self) -> bool {
        matches!(self, Self::SystemStatus { .. })
    }
}

/// Renders the line a text transport sends: `SYSTEM: <keyword>` for status,
/// the decoded text for telemetry.
impl fmt::Display for DecodedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Telemetry { text, .. } => write!(f, "{}", text),
            Self::ImageReady { bytes } => write!(f, "IMAGE_READY {} bytes", bytes.len()),
            Self::SystemStatus { kind } => write!(f, "{}{}", SYSTEM_PREFIX, kind.keyword()),
        }
    }
}
