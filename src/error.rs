//! Error types for the tinyml-ble-bridge crate.

use thiserror::Error;

use crate::ble::roles::CharacteristicRole;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The scan could not be run or found no matching device.
    #[error("Scan failed: {reason}")]
    ScanFailed {
        /// Description of why the scan failed.
        reason: String,
    },

    /// Failed to establish a connection to the device.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// A characteristic required by the active profile is absent on the device.
    #[error("Characteristic not found for {role}: {uuid}")]
    CharacteristicNotFound {
        /// The role that could not be resolved.
        role: CharacteristicRole,
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// The connection to the device was lost.
    #[error("Connection lost")]
    ConnectionLost,

    /// Operation requires a connection but the device is not connected.
    #[error("Device not connected")]
    NotConnected,

    /// A subscriber rejected an event.
    #[error("Delivery failed: {reason}")]
    Delivery {
        /// Description of why the sink rejected the event.
        reason: String,
    },

    /// Invalid data was read back from an export artifact.
    #[error("Invalid data: {context}")]
    InvalidData {
        /// Description of what was invalid about the data.
        context: String,
    },

    /// Filesystem error while exporting an image.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
