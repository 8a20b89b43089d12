//! BLE Service and Characteristic UUIDs.
//!
//! Contains all UUID constants exposed by the Nano 33 BLE Sense sketches.
//! Every UUID shares the `12345678-1234-5678-1234-56789abcdefX` base and
//! differs only in the last nibble.

use uuid::Uuid;

// Sensor suite firmware (IMU + camera)
/// Motion service UUID.
pub const MOTION_SERVICE_UUID: Uuid = Uuid::from_u128(0x1234_5678_1234_5678_1234_5678_9abc_def0);
/// Motion status characteristic UUID (Read, Notify). Sends `MOVING`/`STILL`.
pub const MOTION_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x1234_5678_1234_5678_1234_5678_9abc_def1);
/// Gyro service UUID.
pub const GYRO_SERVICE_UUID: Uuid = Uuid::from_u128(0x1234_5678_1234_5678_1234_5678_9abc_def2);
/// Gyro status characteristic UUID (Read, Notify). Sends `ROTATING`/`STILL`.
pub const GYRO_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x1234_5678_1234_5678_1234_5678_9abc_def3);
/// Photo service UUID.
pub const IMAGE_SERVICE_UUID: Uuid = Uuid::from_u128(0x1234_5678_1234_5678_1234_5678_9abc_def4);
/// Image chunk characteristic UUID (Notify). Streams signed grayscale pixels.
pub const IMAGE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x1234_5678_1234_5678_1234_5678_9abc_def5);

// Person detection firmware (camera + TFLite)
/// Inference service UUID.
pub const INFERENCE_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x1234_5678_1234_5678_1234_5678_9abc_defa);
/// Inference characteristic UUID (Read, Notify). Sends `Person: 0.87`
/// strings. Commands are written here too, but the stock sketch declares no
/// Write property, so it rejects them at the GATT layer until the firmware
/// adds `BLEWrite`.
pub const INFERENCE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x1234_5678_1234_5678_1234_5678_9abc_def7);

/// Substring the firmware puts in its advertised local name
/// (`Nano33BLE-Sensing`, `Nano33BLE-Motion`).
pub const DEVICE_NAME_MARKER: &str = "Nano33BLE";
