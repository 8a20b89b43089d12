//! BLE communication module.
//!
//! This module provides the Bluetooth Low Energy plumbing underneath the
//! bridge: the link boundary trait and its btleplug implementation, the
//! characteristic role registry, and link session state.

pub mod characteristics;
pub mod connection;
mod guard;
pub mod link;
pub mod roles;
pub mod scanner;
pub mod uuids;

pub use characteristics::NotificationRouter;
pub use connection::{LinkFailure, LinkSession, LinkState, LinkStateEvent};
pub use link::{BtleplugLink, Device, DeviceLink, NotificationCallback};
pub use roles::{CharacteristicId, CharacteristicRole, DeviceProfile, RoleBinding, RoleRegistry};
pub use scanner::BleScanner;
pub use uuids::*;
