// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # tinyml-ble-bridge
//!
//! Bridges an Arduino Nano 33 BLE Sense running a TinyML sketch to any
//! number of live consumers over Bluetooth Low Energy.
//!
//! The bridge keeps one link to the board alive for the life of the
//! process, decodes the text and image notifications it sends, reassembles
//! 96×96 camera frames from their chunk stream, and republishes everything
//! to attached subscribers. A subscriber that goes away is dropped without
//! disturbing the others.
//!
//! ## Features
//!
//! - **Supervised link**: scan, connect, resolve, subscribe, and retry
//!   forever with a fixed backoff when anything fails or the link drops
//! - **Two firmware profiles**: person detection (inference text + commands)
//!   and sensor suite (motion, gyro, camera frames)
//! - **Frame reassembly**: unframed chunk streams become decoded grayscale
//!   frames, exportable as binary or hex text
//! - **Fan-out**: typed channels, text line channels, or callbacks
//! - **Commands**: text commands written only while the link is up
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tinyml_ble_bridge::{Bridge, BridgeConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let bridge = Bridge::with_btleplug(BridgeConfig::default()).await?;
//!     let (_id, mut lines) = bridge.attach_lines();
//!
//!     bridge.start();
//!
//!     while let Some(line) = lines.recv().await {
//!         println!("{}", line);
//!         if line == "SYSTEM: ARDUINO_CONNECTED" {
//!             bridge.send_command("START").await?;
//!         }
//!     }
//!
//!     bridge.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for config and state types

// Public modules
pub mod ble;
pub mod bridge;
pub mod command;
pub mod config;
pub mod demux;
pub mod error;
pub mod event;
pub mod fanout;
pub mod image;
pub mod supervisor;
pub mod utils;

// Re-exports for convenience
pub use bridge::Bridge;
pub use command::CommandChannel;
pub use config::{BridgeConfig, DeviceFilter};
pub use demux::NotificationDemux;
pub use error::{Error, Result};
pub use event::{DecodedEvent, SystemStatus};
pub use fanout::{
    Broadcaster, CallbackHandle, CallbackSubscriber, ChannelSubscriber, LineSubscriber,
    Subscriber, SubscriberId,
};
pub use supervisor::ConnectionSupervisor;
pub use utils::{decode_text, parse_hex_csv, to_hex_csv};

// Re-export commonly used types from submodules
pub use ble::connection::{LinkFailure, LinkSession, LinkState, LinkStateEvent};
pub use ble::link::{BtleplugLink, Device, DeviceLink, NotificationCallback};
pub use ble::roles::{CharacteristicId, CharacteristicRole, DeviceProfile, RoleRegistry};
pub use image::{
    decode_pixel, encode_pixel, CompletedImage, ImageBuffer, ImageExporter, ImageReassembler,
    EXPECTED_IMAGE_SIZE,
};
