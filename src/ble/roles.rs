//! Characteristic roles and the static role registry.
//!
//! The registry maps a `(service, characteristic)` pair to the meaning the
//! bridge assigns to it. It has no state; the demultiplexer consults it for
//! every notification and the supervisor uses it to decide which
//! characteristics must resolve before subscribing.

use uuid::Uuid;

use crate::ble::uuids::*;

/// Semantic role of a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CharacteristicRole {
    /// Accelerometer motion status text.
    Motion,
    /// Gyroscope rotation status text.
    Gyro,
    /// One fragment of a camera frame.
    ImageChunk,
    /// Person detection result text.
    InferenceText,
    /// Outbound text commands.
    Command,
}

impl CharacteristicRole {
    /// Whether the device pushes notifications on this role.
    pub fn is_notifying(&self) -> bool {
        !matches!(self, Self::Command)
    }

    /// Whether notifications for this role carry text.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::Motion | Self::Gyro | Self::InferenceText)
    }
}

impl std::fmt::Display for CharacteristicRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Motion => write!(f, "Motion"),
            Self::Gyro => write!(f, "Gyro"),
            Self::ImageChunk => write!(f, "ImageChunk"),
            Self::InferenceText => write!(f, "InferenceText"),
            Self::Command => write!(f, "Command"),
        }
    }
}

/// Identity of a characteristic: its service UUID and its own UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CharacteristicId {
    /// Service the characteristic lives in.
    pub service: Uuid,
    /// Characteristic UUID.
    pub characteristic: Uuid,
}

impl CharacteristicId {
    /// Create a new identity.
    pub const fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }
}

impl std::fmt::Display for CharacteristicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.service, self.characteristic)
    }
}

/// Firmware variant running on the target board.
///
/// The two sketches expose disjoint role sets and never run together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceProfile {
    /// Camera + TFLite sketch: one inference text characteristic that also
    /// accepts commands.
    #[default]
    Inference,
    /// IMU + camera sketch: motion, gyro and image chunk characteristics.
    SensorSuite,
}

/// A registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleBinding {
    /// Role assigned to the characteristic.
    pub role: CharacteristicRole,
    /// Characteristic identity.
    pub id: CharacteristicId,
    /// Whether the supervisor refuses to subscribe without it.
    pub required: bool,
}

const SENSOR_SUITE: &[RoleBinding] = &[
    RoleBinding {
        role: CharacteristicRole::Motion,
        id: CharacteristicId::new(MOTION_SERVICE_UUID, MOTION_CHARACTERISTIC_UUID),
        required: true,
    },
    RoleBinding {
        role: CharacteristicRole::Gyro,
        id: CharacteristicId::new(GYRO_SERVICE_UUID, GYRO_CHARACTERISTIC_UUID),
        required: true,
    },
    RoleBinding {
        role: CharacteristicRole::ImageChunk,
        id: CharacteristicId::new(IMAGE_SERVICE_UUID, IMAGE_CHARACTERISTIC_UUID),
        required: true,
    },
];

const INFERENCE: &[RoleBinding] = &[
    RoleBinding {
        role: CharacteristicRole::InferenceText,
        id: CharacteristicId::new(INFERENCE_SERVICE_UUID, INFERENCE_CHARACTERISTIC_UUID),
        required: true,
    },
    RoleBinding {
        role: CharacteristicRole::Command,
        id: CharacteristicId::new(INFERENCE_SERVICE_UUID, INFERENCE_CHARACTERISTIC_UUID),
        required: true,
    },
];

/// Static mapping from characteristic identity to role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleRegistry {
    profile: DeviceProfile,
    bindings: &'static [RoleBinding],
}

impl RoleRegistry {
    /// Registry for a firmware profile.
    pub fn for_profile(profile: DeviceProfile) -> Self {
        let bindings = match profile {
            DeviceProfile::Inference => INFERENCE,
            DeviceProfile::SensorSuite => SENSOR_SUITE,
        };
        Self { profile, bindings }
    }

    /// The profile this registry describes.
    pub fn profile(&self) -> DeviceProfile {
        self.profile
    }

    /// All bindings in declaration order.
    pub fn bindings(&self) -> &'static [RoleBinding] {
        self.bindings
    }

    /// Bindings that must resolve before the supervisor subscribes.
    pub fn required(&self) -> impl Iterator<Item = &'static RoleBinding> {
        self.bindings.iter().filter(|b| b.required)
    }

    /// Look up the role of a notifying characteristic.
    ///
    /// Write-only roles are skipped, so a characteristic shared between
    /// inference text and commands routes as inference text.
    pub fn role_of(&self, id: &CharacteristicId) -> Option<CharacteristicRole> {
        self.bindings
            .iter()
            .find(|b| b.role.is_notifying() && b.id == *id)
            .map(|b| b.role)
    }

    /// Look up the identity bound to a role.
    pub fn id_of(&self, role: CharacteristicRole) -> Option<CharacteristicId> {
        self.bindings.iter().find(|b| b.role == role).map(|b| b.id)
    }
}

impl Default for RoleRegistry {
    fn default() -> Self {
        Self::for_profile(DeviceProfile::default())
    }
}
