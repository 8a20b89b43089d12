//! Shared fixtures: a scripted in-memory device link.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use tinyml_ble_bridge::ble::uuids::*;
use tinyml_ble_bridge::{
    BridgeConfig, CharacteristicId, DecodedEvent, Device, DeviceLink, DeviceProfile, Error,
    LinkState, LinkStateEvent, NotificationCallback, Result,
};

/// Platform id of the scripted board, as BlueZ reports it.
pub const BOARD_ID: &str = "hci0/dev_02_7B_B9_31_62_1A";
/// Hardware address of the scripted board.
pub const BOARD_MAC: &str = "02:7B:B9:31:62:1A";

/// How long a test waits for anything before giving up.
pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct FakeState {
    devices: Vec<Device>,
    characteristics: Vec<CharacteristicId>,
    fail_connect: bool,
    connect_delay: Duration,
    connected: bool,
    generation: u32,
    callbacks: HashMap<CharacteristicId, NotificationCallback>,
    writes: Vec<(CharacteristicId, Vec<u8>)>,
    discover_calls: usize,
    connect_calls: usize,
    disconnect_calls: usize,
    unsubscribe_calls: usize,
}

/// In-memory link whose device, characteristics and liveness are scripted
/// by the test. Clones share state.
#[derive(Clone, Default)]
pub struct FakeLink {
    state: Arc<Mutex<FakeState>>,
}

impl FakeLink {
    /// A board advertising `name` that exposes `characteristics`.
    pub fn with_device(name: &str, characteristics: Vec<CharacteristicId>) -> Self {
        let link = Self::default();
        {
            let mut state = link.state.lock();
            state.devices =
                vec![Device::new(BOARD_ID, Some(name.to_string())).with_mac(BOARD_MAC)];
            state.characteristics = characteristics;
        }
        link
    }

    /// A person detection board.
    pub fn inference_board() -> Self {
        Self::with_device("Nano33BLE-Sensing", vec![inference_id()])
    }

    /// An IMU + camera board.
    pub fn sensor_board() -> Self {
        Self::with_device("Nano33BLE-Motion", vec![motion_id(), gyro_id(), image_id()])
    }

    /// Nothing in range.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    /// Make every connect attempt take `delay` before it resolves.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().connect_delay = delay;
    }

    /// Simulate the board going out of range.
    pub fn drop_link(&self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.callbacks.clear();
    }

    /// Push a notification as the link stack would.
    pub fn notify(&self, id: CharacteristicId, data: &[u8]) -> bool {
        let callback = self.state.lock().callbacks.get(&id).cloned();
        match callback {
            Some(callback) => {
                callback(id, Bytes::copy_from_slice(data));
                true
            }
            None => false,
        }
    }

    pub fn subscribed(&self) -> Vec<CharacteristicId> {
        self.state.lock().callbacks.keys().copied().collect()
    }

    pub fn writes(&self) -> Vec<(CharacteristicId, Vec<u8>)> {
        self.state.lock().writes.clone()
    }

    pub fn is_up(&self) -> bool {
        self.state.lock().connected
    }

    pub fn discover_calls(&self) -> usize {
        self.state.lock().discover_calls
    }

    pub fn connect_calls(&self) -> usize {
        self.state.lock().connect_calls
    }

    pub fn disconnect_calls(&self) -> usize {
        self.state.lock().disconnect_calls
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.state.lock().unsubscribe_calls
    }
}

#[async_trait]
impl DeviceLink for FakeLink {
    type Handle = u32;
    type Characteristic = CharacteristicId;

    async fn discover(&self, timeout: Duration) -> Result<Vec<Device>> {
        tokio::time::sleep(timeout).await;
        let mut state = self.state.lock();
        state.discover_calls += 1;
        Ok(state.devices.clone())
    }

    async fn connect(&self, address: &str) -> Result<u32> {
        let delay = {
            let mut state = self.state.lock();
            state.connect_calls += 1;
            state.connect_delay
        };
        tokio::time::sleep(delay).await;

        let mut state = self.state.lock();
        if state.fail_connect {
            return Err(Error::ConnectionFailed {
                reason: format!("{} refused", address),
            });
        }
        state.connected = true;
        state.generation += 1;
        Ok(state.generation)
    }

    async fn resolve_characteristic(
        &self,
        _link: &u32,
        id: &CharacteristicId,
    ) -> Option<CharacteristicId> {
        self.state
            .lock()
            .characteristics
            .iter()
            .find(|c| *c == id)
            .copied()
    }

    async fn subscribe(
        &self,
        _link: &u32,
        characteristic: &CharacteristicId,
        callback: NotificationCallback,
    ) -> Result<()> {
        self.state.lock().callbacks.insert(*characteristic, callback);
        Ok(())
    }

    async fn unsubscribe(&self, _link: &u32, characteristic: &CharacteristicId) -> Result<()> {
        let mut state = self.state.lock();
        state.unsubscribe_calls += 1;
        state.callbacks.remove(characteristic);
        Ok(())
    }

    async fn write(&self, link: &u32, characteristic: &CharacteristicId, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if !state.connected || *link != state.generation {
            return Err(Error::NotConnected);
        }
        state.writes.push((*characteristic, data.to_vec()));
        Ok(())
    }

    async fn is_connected(&self, link: &u32) -> bool {
        let state = self.state.lock();
        state.connected && *link == state.generation
    }

    async fn disconnect(&self, _link: &u32) -> Result<()> {
        let mut state = self.state.lock();
        state.disconnect_calls += 1;
        state.connected = false;
        state.callbacks.clear();
        Ok(())
    }
}

pub fn motion_id() -> CharacteristicId {
    CharacteristicId::new(MOTION_SERVICE_UUID, MOTION_CHARACTERISTIC_UUID)
}

pub fn gyro_id() -> CharacteristicId {
    CharacteristicId::new(GYRO_SERVICE_UUID, GYRO_CHARACTERISTIC_UUID)
}

pub fn image_id() -> CharacteristicId {
    CharacteristicId::new(IMAGE_SERVICE_UUID, IMAGE_CHARACTERISTIC_UUID)
}

pub fn inference_id() -> CharacteristicId {
    CharacteristicId::new(INFERENCE_SERVICE_UUID, INFERENCE_CHARACTERISTIC_UUID)
}

/// Fast timings so retry loops turn over within milliseconds.
pub fn fast_config(profile: DeviceProfile) -> BridgeConfig {
    BridgeConfig::for_profile(profile)
        .with_scan_window(Duration::from_millis(5))
        .with_connect_timeout(Duration::from_secs(1))
        .with_backoff(Duration::from_millis(20))
        .with_liveness_poll(Duration::from_millis(5))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Wait until the supervisor enters `target`, returning every state seen
/// on the way (including `target`).
pub async fn wait_for_state(
    rx: &mut broadcast::Receiver<LinkStateEvent>,
    target: LinkState,
) -> Vec<LinkState> {
    let mut seen = Vec::new();
    let reached = tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    seen.push(event.state);
                    if event.state == target {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("state channel closed"),
            }
        }
    })
    .await
    .is_ok();
    assert!(reached, "timed out waiting for {}; saw {:?}", target, seen);
    seen
}

/// Wait for the next event matching `pred`, returning everything received
/// before it as well.
pub async fn wait_for_event<F>(
    rx: &mut mpsc::UnboundedReceiver<DecodedEvent>,
    pred: F,
) -> (DecodedEvent, Vec<DecodedEvent>)
where
    F: Fn(&DecodedEvent) -> bool,
{
    let mut before = Vec::new();
    let found = tokio::time::timeout(WAIT, async {
        while let Some(event) = rx.recv().await {
            if pred(&event) {
                return event;
            }
            before.push(event);
        }
        panic!("event channel closed");
    })
    .await
    .expect("timed out waiting for event");
    (found, before)
}

/// Drain whatever is already queued.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<DecodedEvent>) -> Vec<DecodedEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
