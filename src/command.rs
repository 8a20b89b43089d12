//! Outbound commands.
//!
//! Writes are serialized and only reach the device while the link is
//! `Subscribed`. Anything sent earlier or later is dropped silently, the
//! same way an unconnected client would simply not transmit.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

use crate::ble::connection::LinkSession;
use crate::ble::link::DeviceLink;
use crate::error::Result;

struct CommandTarget<L: DeviceLink> {
    link: L::Handle,
    characteristic: L::Characteristic,
}

impl<L: DeviceLink> Clone for CommandTarget<L> {
    fn clone(&self) -> Self {
        Self {
            link: self.link.clone(),
            characteristic: self.characteristic.clone(),
        }
    }
}

/// Serializes text commands to the Command role's characteristic.
pub struct CommandChannel<L: DeviceLink> {
    link: Arc<L>,
    session: Arc<RwLock<LinkSession>>,
    target: RwLock<Option<CommandTarget<L>>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl<L: DeviceLink> CommandChannel<L> {
    pub(crate) fn new(link: Arc<L>, session: Arc<RwLock<LinkSession>>) -> Self {
        Self {
            link,
            session,
            target: RwLock::new(None),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Point the channel at a resolved command characteristic.
    pub(crate) fn arm(&self, link: L::Handle, characteristic: L::Characteristic) {
        *self.target.write() = Some(CommandTarget {
            link,
            characteristic,
        });
    }

    /// Forget the command characteristic.
    pub(crate) fn disarm(&self) {
        *self.target.write() = None;
    }

    /// Check if a command sent now would be written.
    pub fn is_ready(&self) -> bool {
        self.session.read().state.is_subscribed() && self.target.read().is_some()
    }

    /// Send a text command.
    ///
    /// A no-op unless the link is `Subscribed` and the profile has a
    /// Command role.
    ///
    /// # Errors
    ///
    /// Returns the link error if the write itself fails.
    pub async fn send_command(&self, text: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let target = if self.session.read().state.is_subscribed() {
            self.target.read().clone()
        } else {
            None
        };

        let target = match target {
            Some(target) => target,
            None => {
                debug!("Ignoring command {:?}: link not ready", text);
                return Ok(());
            }
        };

        self.link
            .write(&target.link, &target.characteristic, text.as_bytes())
            .await?;
        info!("[BLE] >> {}", text);

        Ok(())
    }
}
