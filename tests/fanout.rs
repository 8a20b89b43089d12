//! Fan-out isolation between subscribers.

mod common;

use common::*;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tinyml_ble_bridge::{
    Bridge, CallbackSubscriber, CharacteristicRole, DecodedEvent, DeviceProfile, Error, LinkState,
};

#[tokio::test]
async fn test_failing_subscriber_does_not_disturb_others() {
    init_tracing();
    let link = FakeLink::inference_board();
    let bridge = Bridge::new(link.clone(), fast_config(DeviceProfile::Inference)).unwrap();
    let mut states = bridge.subscribe_state();

    let (_, mut first) = bridge.attach_channel();
    let (_, mut second) = bridge.attach_lines();

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    bridge.attach(Arc::new(CallbackSubscriber::new(move |_: &DecodedEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(Error::Delivery {
            reason: "socket closed".to_string(),
        })
    })));
    assert_eq!(bridge.broadcaster().subscriber_count(), 3);

    bridge.start();
    wait_for_state(&mut states, LinkState::Subscribed).await;

    // The failing subscriber saw the Connected status and was dropped.
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(bridge.broadcaster().subscriber_count(), 2);

    assert!(link.notify(inference_id(), b"No person: 0.91"));
    assert!(link.notify(inference_id(), b"Person: 0.76"));

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(
        drain(&mut first),
        vec![
            DecodedEvent::status(tinyml_ble_bridge::SystemStatus::Connected),
            DecodedEvent::telemetry(CharacteristicRole::InferenceText, "No person: 0.91"),
            DecodedEvent::telemetry(CharacteristicRole::InferenceText, "Person: 0.76"),
        ]
    );

    let mut lines = Vec::new();
    while let Ok(line) = second.try_recv() {
        lines.push(line);
    }
    assert_eq!(
        lines,
        vec!["SYSTEM: ARDUINO_CONNECTED", "No person: 0.91", "Person: 0.76"]
    );

    bridge.stop().await;
}

#[tokio::test]
async fn test_dropped_receiver_is_detached() {
    let bridge = Bridge::new(FakeLink::empty(), fast_config(DeviceProfile::Inference)).unwrap();
    let (_, rx) = bridge.attach_channel();
    let (_, mut kept) = bridge.attach_channel();
    drop(rx);

    bridge.demux().on_notification(&inference_id(), b"Person: 0.5");

    assert_eq!(bridge.broadcaster().subscriber_count(), 1);
    assert_eq!(drain(&mut kept).len(), 1);
}

#[tokio::test]
async fn test_callback_handle_detaches_on_drop() {
    let bridge = Bridge::new(FakeLink::empty(), fast_config(DeviceProfile::Inference)).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    let handle = bridge.on_event(move |event| sink.lock().push(event.to_string()));
    bridge.demux().on_notification(&inference_id(), b"Person: 0.64");
    drop(handle);
    bridge.demux().on_notification(&inference_id(), b"Person: 0.12");

    assert_eq!(*seen.lock(), vec!["Person: 0.64".to_string()]);
    assert_eq!(bridge.broadcaster().subscriber_count(), 0);
}

#[tokio::test]
async fn test_late_subscriber_gets_only_later_events() {
    let bridge = Bridge::new(FakeLink::empty(), fast_config(DeviceProfile::Inference)).unwrap();
    bridge.demux().on_notification(&inference_id(), b"before");

    let (id, mut rx) = bridge.attach_lines();
    bridge.demux().on_notification(&inference_id(), b"after");
    assert!(bridge.detach(id));
    assert!(!bridge.detach(id));
    bridge.demux().on_notification(&inference_id(), b"gone");

    assert_eq!(rx.try_recv().ok().as_deref(), Some("after"));
    assert!(rx.try_recv().is_err());
}
