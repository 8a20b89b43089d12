//! Bridge configuration.

use std::time::Duration;

use crate::ble::link::Device;
use crate::ble::roles::DeviceProfile;
use crate::ble::uuids::DEVICE_NAME_MARKER;
use crate::error::{Error, Result};
use crate::image::EXPECTED_IMAGE_SIZE;

/// How the supervisor picks the target among scanned devices.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceFilter {
    /// First device whose advertised name contains the substring.
    NameContains(String),
    /// The device with this hardware address (`02:7B:B9:31:62:1A`) or, for
    /// pinning on platforms that hide the MAC, this platform identifier.
    Address(String),
}

impl DeviceFilter {
    /// Check if a scanned device is the target.
    pub fn matches(&self, device: &Device) -> bool {
        match self {
            Self::NameContains(marker) => device
                .name
                .as_ref()
                .map(|n| n.contains(marker.as_str()))
                .unwrap_or(false),
            Self::Address(address) => {
                device
                    .mac
                    .as_deref()
                    .map(|mac| mac.eq_ignore_ascii_case(address))
                    .unwrap_or(false)
                    || device.address.eq_ignore_ascii_case(address)
            }
        }
    }
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self::NameContains(DEVICE_NAME_MARKER.to_string())
    }
}

/// Tunables for the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BridgeConfig {
    /// How long each scan runs.
    pub scan_window: Duration,
    /// Upper bound on a single connect attempt.
    pub connect_timeout: Duration,
    /// Fixed delay between a failed or lost attempt and the next scan.
    pub backoff: Duration,
    /// Interval between link liveness checks while subscribed.
    pub liveness_poll: Duration,
    /// Target device selection.
    pub device_filter: DeviceFilter,
    /// Firmware variant on the target.
    pub profile: DeviceProfile,
    /// Bytes in one complete image.
    pub image_size: usize,
}

impl BridgeConfig {
    /// Default scan window (5 seconds).
    pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(5);
    /// Default connect timeout (20 seconds).
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
    /// Default backoff (5 seconds).
    pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);
    /// Default liveness poll (1 second).
    pub const DEFAULT_LIVENESS_POLL: Duration = Duration::from_secs(1);

    /// Config for a firmware profile with default timings.
    pub fn for_profile(profile: DeviceProfile) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }

    /// Set the scan window.
    pub fn with_scan_window(mut self, window: Duration) -> Self {
        self.scan_window = window;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the retry backoff.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the liveness poll interval.
    pub fn with_liveness_poll(mut self, interval: Duration) -> Self {
        self.liveness_poll = interval;
        self
    }

    /// Set the device filter.
    pub fn with_device_filter(mut self, filter: DeviceFilter) -> Self {
        self.device_filter = filter;
        self
    }

    /// Set the image size.
    pub fn with_image_size(mut self, size: usize) -> Self {
        self.image_size = size;
        self
    }

    /// Reject settings the supervisor cannot run with.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("scan_window", self.scan_window),
            ("connect_timeout", self.connect_timeout),
            ("backoff", self.backoff),
            ("liveness_poll", self.liveness_poll),
        ];

        for (name, value) in durations {
            if value.is_zero() {
                return Err(Error::InvalidParameter {
                    name: name.to_string(),
                    value: format!("{:?}", value),
                });
            }
        }

        if self.image_size == 0 {
            return Err(Error::InvalidParameter {
                name: "image_size".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            scan_window: Self::DEFAULT_SCAN_WINDOW,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            backoff: Self::DEFAULT_BACKOFF,
            liveness_poll: Self::DEFAULT_LIVENESS_POLL,
            device_filter: DeviceFilter::default(),
            profile: DeviceProfile::default(),
            image_size: EXPECTED_IMAGE_SIZE,
        }
    }
}
