//! GATT notification routing.
//!
//! btleplug delivers every notification of a peripheral on one stream. The
//! router drains that stream on a background task and hands each value to
//! the callback registered for its characteristic.

use btleplug::api::{Characteristic, Peripheral as _};
use btleplug::platform::Peripheral;
use bytes::Bytes;
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::ble::link::NotificationCallback;
use crate::ble::roles::CharacteristicId;
use crate::error::Result;

type Routes = HashMap<Uuid, (CharacteristicId, NotificationCallback)>;

/// Routes notifications of one peripheral to per-characteristic callbacks.
pub struct NotificationRouter {
    /// The peripheral to listen on.
    peripheral: Peripheral,
    /// Callbacks by characteristic UUID.
    routes: Arc<RwLock<Routes>>,
    /// Handle to the notification listener task.
    listener_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl NotificationRouter {
    /// Create a router for a connected peripheral.
    pub fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            routes: Arc::new(RwLock::new(HashMap::new())),
            listener_handle: RwLock::new(None),
        }
    }

    /// Start the listener task if it is not running.
    pub async fn start(&self) -> Result<()> {
        if self.is_listening() {
            return Ok(());
        }

        let mut notifications = self.peripheral.notifications().await?;
        let routes = self.routes.clone();

        let handle = tokio::spawn(async move {
            debug!("Notification listener entering main loop");

            while let Some(notification) = notifications.next().await {
                trace!(
                    "Notification received from {}: {} bytes",
                    notification.uuid,
                    notification.value.len()
                );

                let route = routes.read().get(&notification.uuid).cloned();
                match route {
                    Some((id, callback)) => callback(id, Bytes::from(notification.value)),
                    None => trace!("No route for {}", notification.uuid),
                }
            }

            debug!("Notification listener stopped");
        });

        *self.listener_handle.write() = Some(handle);

        Ok(())
    }

    /// Check if the listener task is alive.
    pub fn is_listening(&self) -> bool {
        self.listener_handle
            .read()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Register `callback` and enable notifications for `characteristic`.
    pub async fn subscribe(
        &self,
        characteristic: &Characteristic,
        callback: NotificationCallback,
    ) -> Result<()> {
        let id = CharacteristicId::new(characteristic.service_uuid, characteristic.uuid);
        self.routes
            .write()
            .insert(characteristic.uuid, (id, callback));

        if let Err(e) = self.peripheral.subscribe(characteristic).await {
            debug!("Failed to subscribe to {}: {:?}", id, e);
            self.routes.write().remove(&characteristic.uuid);
            return Err(e.into());
        }

        debug!("Successfully subscribed to notifications from {}", id);

        Ok(())
    }

    /// Disable notifications for `characteristic` and drop its route.
    pub async fn unsubscribe(&self, characteristic: &Characteristic) -> Result<()> {
        self.routes.write().remove(&characteristic.uuid);
        self.peripheral.unsubscribe(characteristic).await?;

        debug!("Unsubscribed from notifications from {}", characteristic.uuid);

        Ok(())
    }

    /// Stop the listener and forget all routes.
    pub fn stop(&self) {
        self.routes.write().clear();
        if let Some(handle) = self.listener_handle.write().take() {
            handle.abort();
        }
    }
}

impl Drop for NotificationRouter {
    fn drop(&mut self) {
        self.stop();
    }
}
