//! Camera frames arriving as notification chunks.

mod common;

use common::*;
use pretty_assertions::assert_eq;

use tinyml_ble_bridge::{
    Bridge, CharacteristicRole, DecodedEvent, DeviceProfile, ImageExporter, LinkState,
    EXPECTED_IMAGE_SIZE,
};

/// A frame as the board sends it: pixel values 0..=255 repeating, each
/// shifted into the signed range.
fn device_frame() -> (Vec<u8>, Vec<u8>) {
    let pixels: Vec<u8> = (0..EXPECTED_IMAGE_SIZE).map(|i| (i % 256) as u8).collect();
    let wire = pixels.iter().map(|p| p.wrapping_sub(128)).collect();
    (wire, pixels)
}

#[tokio::test]
async fn test_frame_from_ble_sized_chunks() {
    init_tracing();
    let link = FakeLink::sensor_board();
    let bridge = Bridge::new(link.clone(), fast_config(DeviceProfile::SensorSuite)).unwrap();
    let mut states = bridge.subscribe_state();
    let (_, mut events) = bridge.attach_channel();
    let mut images = bridge.subscribe_images();

    bridge.start();
    wait_for_state(&mut states, LinkState::Subscribed).await;

    let (wire, pixels) = device_frame();
    let chunks: Vec<&[u8]> = wire.chunks(34).collect();
    assert_eq!(chunks.len(), 272);
    assert_eq!(chunks.last().map(|c| c.len()), Some(2));

    for chunk in &chunks {
        assert!(link.notify(image_id(), chunk));
    }

    let (event, before) = wait_for_event(&mut events, |e| {
        matches!(e, DecodedEvent::ImageReady { .. })
    })
    .await;
    assert_eq!(before.len(), 1);
    match event {
        DecodedEvent::ImageReady { bytes } => {
            assert_eq!(bytes.len(), EXPECTED_IMAGE_SIZE);
            assert_eq!(&bytes[..], &pixels[..]);
            assert_eq!(bytes[0], 0);
            assert_eq!(bytes[128], 128);
            assert_eq!(bytes[255], 255);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let image = images.try_recv().unwrap();
    assert_eq!(image.discarded(), 0);
    assert_eq!(bridge.image_progress(), (0, EXPECTED_IMAGE_SIZE));

    // Exactly one frame.
    assert!(drain(&mut events).is_empty());

    bridge.stop().await;
}

#[tokio::test]
async fn test_overflow_in_completing_chunk_is_dropped() {
    let bridge = Bridge::new(FakeLink::empty(), fast_config(DeviceProfile::SensorSuite)).unwrap();
    let (_, mut events) = bridge.attach_channel();
    let demux = bridge.demux();

    demux.on_notification(&image_id(), &vec![0u8; EXPECTED_IMAGE_SIZE - 10]);
    demux.on_notification(&image_id(), &[0u8; 30]);

    let events = drain(&mut events);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        DecodedEvent::ImageReady { bytes } if bytes.len() == EXPECTED_IMAGE_SIZE
    ));
    assert_eq!(bridge.image_progress(), (0, EXPECTED_IMAGE_SIZE));
}

#[tokio::test]
async fn test_text_and_image_interleave() {
    let bridge = Bridge::new(FakeLink::empty(), fast_config(DeviceProfile::SensorSuite)).unwrap();
    let (_, mut events) = bridge.attach_channel();
    let demux = bridge.demux();

    let (wire, _) = device_frame();
    let (first, second) = wire.split_at(5000);
    demux.on_notification(&image_id(), first);
    demux.on_notification(&motion_id(), b"STILL\n");
    demux.on_notification(&gyro_id(), b"x=0.1,y=0.0,z=-0.2");
    demux.on_notification(&image_id(), second);

    let events = drain(&mut events);
    assert_eq!(events.len(), 3);
    assert_eq!(
        events[0],
        DecodedEvent::telemetry(CharacteristicRole::Motion, "STILL")
    );
    assert_eq!(
        events[1],
        DecodedEvent::telemetry(CharacteristicRole::Gyro, "x=0.1,y=0.0,z=-0.2")
    );
    assert!(matches!(events[2], DecodedEvent::ImageReady { .. }));
}

#[tokio::test]
async fn test_completed_frame_exports_to_disk() {
    let dir = std::env::temp_dir().join(format!("tinyml-ble-bridge-stream-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let bridge = Bridge::new(FakeLink::empty(), fast_config(DeviceProfile::SensorSuite)).unwrap();
    let mut images = bridge.subscribe_images();
    let (wire, pixels) = device_frame();
    for chunk in wire.chunks(244) {
        bridge.demux().on_notification(&image_id(), chunk);
    }

    let image = images.try_recv().unwrap();
    let exporter = ImageExporter::new(&dir);
    exporter.export(&image).unwrap();

    assert_eq!(exporter.read_bin(EXPECTED_IMAGE_SIZE).unwrap(), pixels);
    assert_eq!(exporter.read_hex(EXPECTED_IMAGE_SIZE).unwrap(), pixels);

    std::fs::remove_dir_all(&dir).unwrap();
}
