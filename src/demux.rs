//! Notification demultiplexing.
//!
//! Every raw notification passes through [`NotificationDemux::on_notification`],
//! which runs on the link stack's delivery task. Routing never awaits: text
//! roles are decoded and published straight to the broadcaster, image chunks
//! are appended to the reassembler under a short lock.

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ble::link::NotificationCallback;
use crate::ble::roles::{CharacteristicId, CharacteristicRole, RoleRegistry};
use crate::event::DecodedEvent;
use crate::fanout::Broadcaster;
use crate::image::ImageReassembler;
use crate::utils::decode_text;

/// Routes notifications by characteristic role.
#[derive(Debug, Clone)]
pub struct NotificationDemux {
    registry: RoleRegistry,
    reassembler: ImageReassembler,
    broadcaster: Broadcaster,
}

impl NotificationDemux {
    /// Create a demultiplexer.
    pub fn new(
        registry: RoleRegistry,
        reassembler: ImageReassembler,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            registry,
            reassembler,
            broadcaster,
        }
    }

    /// Handle one notification.
    pub fn on_notification(&self, id: &CharacteristicId, data: &[u8]) {
        let role = match self.registry.role_of(id) {
            Some(role) => role,
            None => {
                warn!("Dropping {} bytes from unknown characteristic {}", data.len(), id);
                return;
            }
        };

        match role {
            role if role.is_textual() => {
                let text = decode_text(data);
                debug!("[{}] << {}", role, text);
                self.broadcaster.publish(DecodedEvent::telemetry(role, text));
            }
            CharacteristicRole::ImageChunk => {
                self.reassembler.append(data);
            }
            _ => debug!("Ignoring notification on write-only role {}", id),
        }
    }

    /// Discard the image in flight.
    pub fn reset_image(&self) {
        self.reassembler.reset();
    }

    /// Callback suitable for [`DeviceLink::subscribe`](crate::ble::DeviceLink::subscribe).
    pub fn callback(self: &Arc<Self>) -> NotificationCallback {
        let demux = self.clone();
        Arc::new(move |id: CharacteristicId, data: Bytes| demux.on_notification(&id, &data))
    }

    /// The registry this demultiplexer routes by.
    pub fn registry(&self) -> &RoleRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::roles::DeviceProfile;
    use crate::ble::uuids::*;
    use pretty_assertions::assert_eq;

    fn sensor_suite(image_size: usize) -> (NotificationDemux, tokio::sync::mpsc::UnboundedReceiver<DecodedEvent>) {
        let broadcaster = Broadcaster::new();
        let (_, rx) = broadcaster.attach_channel();
        let reassembler = ImageReassembler::new(image_size, broadcaster.clone());
        let demux = NotificationDemux::new(
            RoleRegistry::for_profile(DeviceProfile::SensorSuite),
            reassembler,
            broadcaster,
        );
        (demux, rx)
    }

    fn motion() -> CharacteristicId {
        CharacteristicId::new(MOTION_SERVICE_UUID, MOTION_CHARACTERISTIC_UUID)
    }

    fn image() -> CharacteristicId {
        CharacteristicId::new(IMAGE_SERVICE_UUID, IMAGE_CHARACTERISTIC_UUID)
    }

    #[test]
    fn test_text_roles_publish_telemetry() {
        let (demux, mut rx) = sensor_suite(16);
        demux.on_notification(&motion(), b"MOVING");
        demux.on_notification(
            &CharacteristicId::new(GYRO_SERVICE_UUID, GYRO_CHARACTERISTIC_UUID),
            b"ROTATING",
        );

        assert_eq!(
            rx.try_recv().unwrap(),
            DecodedEvent::telemetry(CharacteristicRole::Motion, "MOVING")
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            DecodedEvent::telemetry(CharacteristicRole::Gyro, "ROTATING")
        );
    }

    #[test]
    fn test_invalid_text_falls_back_to_debug_bytes() {
        let (demux, mut rx) = sensor_suite(16);
        demux.on_notification(&motion(), &[0xFF, 0xFE]);

        assert_eq!(
            rx.try_recv().unwrap(),
            DecodedEvent::telemetry(CharacteristicRole::Motion, "[255, 254]")
        );
    }

    #[test]
    fn test_unknown_characteristic_is_dropped() {
        let (demux, mut rx) = sensor_suite(16);
        demux.on_notification(
            &CharacteristicId::new(INFERENCE_SERVICE_UUID, INFERENCE_CHARACTERISTIC_UUID),
            b"Person: 0.50",
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_image_chunks_go_to_reassembler() {
        let (demux, mut rx) = sensor_suite(4);
        demux.on_notification(&image(), &[0x80, 0x80]);
        assert!(rx.try_recv().is_err());

        demux.on_notification(&image(), &[0x80, 0x80]);
        match rx.try_recv().unwrap() {
            DecodedEvent::ImageReady { bytes } => assert_eq!(&bytes[..], &[0, 0, 0, 0]),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_reset_image_drops_partial_frame() {
        let (demux, mut rx) = sensor_suite(4);
        demux.on_notification(&image(), &[0x80, 0x80, 0x80]);
        demux.reset_image();
        demux.on_notification(&image(), &[0x80]);

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_callback_routes() {
        let (demux, mut rx) = sensor_suite(4);
        let callback = Arc::new(demux).callback();
        callback(motion(), Bytes::from_static(b"STILL\n"));

        assert_eq!(
            rx.try_recv().unwrap(),
            DecodedEvent::telemetry(CharacteristicRole::Motion, "STILL")
        );
    }
}
