//! The device link boundary.
//!
//! [`DeviceLink`] is everything the supervisor and command channel need from
//! a BLE stack. [`BtleplugLink`] implements it on top of btleplug; tests
//! drive the core with a scripted implementation instead.

use async_trait::async_trait;
use btleplug::api::{CharPropFlags, Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::ble::characteristics::NotificationRouter;
use crate::ble::guard::CleanupGuard;
use crate::ble::roles::CharacteristicId;
use crate::ble::scanner::BleScanner;
use crate::error::{Error, Result};

/// Callback invoked from the link stack's own task for every notification.
///
/// Implementations must not block.
pub type NotificationCallback = Arc<dyn Fn(CharacteristicId, Bytes) + Send + Sync>;

/// A device seen during one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Platform identifier used to connect. A MAC only on Windows; BlueZ
    /// reports `hci0/dev_XX_XX_..` and CoreBluetooth a UUID.
    pub address: String,
    /// Hardware address as reported by the adapter, if known.
    pub mac: Option<String>,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
    /// When the scan reported the device.
    pub discovered_at: DateTime<Utc>,
}

impl Device {
    /// Create a device record stamped with the current time.
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            mac: None,
            name,
            rssi: None,
            discovered_at: Utc::now(),
        }
    }

    /// Attach the hardware address.
    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }

    /// Name for log lines.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

/// Operations consumed from the BLE stack.
#[async_trait]
pub trait DeviceLink: Send + Sync + 'static {
    /// Handle to an established link.
    type Handle: Clone + Send + Sync + 'static;
    /// Handle to a resolved characteristic.
    type Characteristic: Clone + Send + Sync + 'static;

    /// Scan for `timeout` and return everything seen.
    ///
    /// The returned future may be dropped mid-scan; the scan must not keep
    /// running afterwards.
    async fn discover(&self, timeout: Duration) -> Result<Vec<Device>>;

    /// Establish a link to a previously discovered device.
    ///
    /// The returned future may be dropped by a timeout or a stop request; a
    /// link it had already opened must then be torn down.
    async fn connect(&self, address: &str) -> Result<Self::Handle>;

    /// Find a characteristic on a connected device.
    async fn resolve_characteristic(
        &self,
        link: &Self::Handle,
        id: &CharacteristicId,
    ) -> Option<Self::Characteristic>;

    /// Enable notifications and route them to `callback`.
    async fn subscribe(
        &self,
        link: &Self::Handle,
        characteristic: &Self::Characteristic,
        callback: NotificationCallback,
    ) -> Result<()>;

    /// Disable notifications.
    async fn unsubscribe(
        &self,
        link: &Self::Handle,
        characteristic: &Self::Characteristic,
    ) -> Result<()>;

    /// Write a value to a characteristic.
    async fn write(
        &self,
        link: &Self::Handle,
        characteristic: &Self::Characteristic,
        data: &[u8],
    ) -> Result<()>;

    /// Check if the link is still up.
    async fn is_connected(&self, link: &Self::Handle) -> bool;

    /// Tear the link down.
    async fn disconnect(&self, link: &Self::Handle) -> Result<()>;
}

/// [`DeviceLink`] backed by btleplug.
pub struct BtleplugLink {
    /// Scanner owning the adapter.
    scanner: BleScanner,
    /// Notification routers by peripheral identifier.
    routers: RwLock<HashMap<String, Arc<NotificationRouter>>>,
}

impl BtleplugLink {
    /// Create a link on the first Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        Ok(Self::with_scanner(BleScanner::new().await?))
    }

    /// Create a link on an existing scanner.
    pub fn with_scanner(scanner: BleScanner) -> Self {
        Self {
            scanner,
            routers: RwLock::new(HashMap::new()),
        }
    }

    fn router(&self, peripheral: &Peripheral) -> Arc<NotificationRouter> {
        self.routers
            .write()
            .entry(peripheral.id().to_string())
            .or_insert_with(|| Arc::new(NotificationRouter::new(peripheral.clone())))
            .clone()
    }

    fn existing_router(&self, peripheral: &Peripheral) -> Option<Arc<NotificationRouter>> {
        self.routers.read().get(&peripheral.id().to_string()).cloned()
    }
}

#[async_trait]
impl DeviceLink for BtleplugLink {
    type Handle = Peripheral;
    type Characteristic = Characteristic;

    async fn discover(&self, timeout: Duration) -> Result<Vec<Device>> {
        self.scanner.discover(timeout).await
    }

    async fn connect(&self, address: &str) -> Result<Peripheral> {
        let peripheral = self
            .scanner
            .peripheral(address)
            .ok_or_else(|| Error::ConnectionFailed {
                reason: format!("{} was not seen by the last scan", address),
            })?;

        // Cancelled or failed part way: don't leave a half-open link behind.
        let half_open = peripheral.clone();
        let guard = CleanupGuard::new("connect", async move {
            if let Err(e) = half_open.disconnect().await {
                debug!("Cleanup disconnect failed: {}", e);
            }
        });

        if peripheral.is_connected().await.unwrap_or(false) {
            info!("Peripheral {} already connected at BLE level", address);
        } else {
            peripheral.connect().await?;
            info!("Successfully connected to {}", address);
        }

        peripheral.discover_services().await?;
        debug!(
            "Discovered {} characteristics on {}",
            peripheral.characteristics().len(),
            address
        );

        guard.disarm();
        Ok(peripheral)
    }

    async fn resolve_characteristic(
        &self,
        link: &Peripheral,
        id: &CharacteristicId,
    ) -> Option<Characteristic> {
        let found = link
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == id.characteristic && c.service_uuid == id.service);

        if found.is_none() {
            debug!("Characteristic {} NOT found", id);
            for c in link.characteristics() {
                trace!("  Available characteristic: {}/{}", c.service_uuid, c.uuid);
            }
        }

        found
    }

    async fn subscribe(
        &self,
        link: &Peripheral,
        characteristic: &Characteristic,
        callback: NotificationCallback,
    ) -> Result<()> {
        let router = self.router(link);
        router.start().await?;
        router.subscribe(characteristic, callback).await
    }

    async fn unsubscribe(&self, link: &Peripheral, characteristic: &Characteristic) -> Result<()> {
        match self.existing_router(link) {
            Some(router) => router.unsubscribe(characteristic).await,
            None => Ok(()),
        }
    }

    async fn write(
        &self,
        link: &Peripheral,
        characteristic: &Characteristic,
        data: &[u8],
    ) -> Result<()> {
        let write_type = if characteristic
            .properties
            .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE)
        {
            WriteType::WithoutResponse
        } else {
            WriteType::WithResponse
        };

        link.write(characteristic, data, write_type).await?;
        trace!(
            "Wrote {} bytes to characteristic {}",
            data.len(),
            characteristic.uuid
        );

        Ok(())
    }

    async fn is_connected(&self, link: &Peripheral) -> bool {
        link.is_connected().await.unwrap_or(false)
    }

    async fn disconnect(&self, link: &Peripheral) -> Result<()> {
        let router = self.routers.write().remove(&link.id().to_string());
        if let Some(router) = router {
            router.stop();
        }

        match link.disconnect().await {
            Ok(()) => {
                info!("Successfully disconnected from {}", link.id());
                Ok(())
            }
            Err(e) => {
                warn!("Failed to disconnect: {}", e);
                Err(Error::Bluetooth(e))
            }
        }
    }
}
