//! BLE scanning functionality.
//!
//! Runs timed scans on the first adapter and remembers the peripherals it
//! saw so a later connect can find them by identifier.

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::ble::guard::CleanupGuard;
use crate::ble::link::Device;
use crate::error::{Error, Result};

/// BLE scanner for discovering the sensor board.
pub struct BleScanner {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
    /// Peripherals seen by the most recent scan.
    discovered: RwLock<HashMap<String, Peripheral>>,
}

impl BleScanner {
    /// Create a new BLE scanner.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Create a new BLE scanner with a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            discovered: RwLock::new(HashMap::new()),
        }
    }

    /// Scan for `window` and return every peripheral seen.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan cannot be started or the adapter cannot
    /// list its peripherals.
    ///
    /// Dropping the future mid-scan still stops the scan.
    pub async fn discover(&self, window: Duration) -> Result<Vec<Device>> {
        debug!("Scanning for {:?}", window);

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| Error::ScanFailed {
                reason: e.to_string(),
            })?;

        let adapter = self.adapter.clone();
        let guard = CleanupGuard::new("scan", async move {
            if let Err(e) = adapter.stop_scan().await {
                warn!("Failed to stop interrupted scan: {}", e);
            }
        });

        tokio::time::sleep(window).await;

        let peripherals = self.adapter.peripherals().await;
        guard.disarm();
        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
        let peripherals = peripherals.map_err(Error::Bluetooth)?;

        let mut devices = Vec::with_capacity(peripherals.len());
        let mut seen = HashMap::with_capacity(peripherals.len());

        for peripheral in peripherals {
            let properties = match peripheral.properties().await {
                Ok(Some(p)) => p,
                _ => continue,
            };

            let address = peripheral.id().to_string();
            trace!("Found: {:?} ({})", properties.local_name, address);

            devices.push(Device {
                address: address.clone(),
                mac: Some(properties.address.to_string()),
                name: properties.local_name,
                rssi: properties.rssi,
                discovered_at: Utc::now(),
            });
            seen.insert(address, peripheral);
        }

        debug!("Scan saw {} devices", devices.len());
        *self.discovered.write() = seen;

        Ok(devices)
    }

    /// Look up a peripheral seen by the last scan.
    pub fn peripheral(&self, address: &str) -> Option<Peripheral> {
        self.discovered.read().get(address).cloned()
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }
}
