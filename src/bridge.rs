//! The bridge facade.
//!
//! Wires the role registry, image reassembler, demultiplexer, broadcaster,
//! command channel and connection supervisor together around one
//! [`DeviceLink`].

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::info;

use crate::ble::connection::{LinkSession, LinkState, LinkStateEvent};
use crate::ble::link::{BtleplugLink, DeviceLink};
use crate::ble::roles::RoleRegistry;
use crate::command::CommandChannel;
use crate::config::BridgeConfig;
use crate::demux::NotificationDemux;
use crate::error::Result;
use crate::event::DecodedEvent;
use crate::fanout::{Broadcaster, CallbackHandle, Subscriber, SubscriberId};
use crate::image::{CompletedImage, ImageReassembler};
use crate::supervisor::ConnectionSupervisor;

/// A supervised link to one sensor board with fan-out to live subscribers.
pub struct Bridge<L: DeviceLink> {
    config: BridgeConfig,
    broadcaster: Broadcaster,
    reassembler: ImageReassembler,
    demux: Arc<NotificationDemux>,
    command: Arc<CommandChannel<L>>,
    supervisor: ConnectionSupervisor<L>,
}

impl Bridge<BtleplugLink> {
    /// Create a bridge on the first Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available or the config is invalid.
    pub async fn with_btleplug(config: BridgeConfig) -> Result<Self> {
        let link = BtleplugLink::new().await?;
        Self::new(link, config)
    }
}

impl<L: DeviceLink> Bridge<L> {
    /// Create a bridge over `link`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid.
    pub fn new(link: L, config: BridgeConfig) -> Result<Self> {
        config.validate()?;

        let link = Arc::new(link);
        let registry = RoleRegistry::for_profile(config.profile);
        let broadcaster = Broadcaster::new();
        let reassembler = ImageReassembler::new(config.image_size, broadcaster.clone());
        let demux = Arc::new(NotificationDemux::new(
            registry,
            reassembler.clone(),
            broadcaster.clone(),
        ));
        let session = Arc::new(RwLock::new(LinkSession::default()));
        let command = Arc::new(CommandChannel::new(link.clone(), session.clone()));
        let supervisor = ConnectionSupervisor::new(
            link,
            config.clone(),
            session,
            demux.clone(),
            broadcaster.clone(),
            command.clone(),
        );

        info!("Bridge created for {:?} profile", config.profile);

        Ok(Self {
            config,
            broadcaster,
            reassembler,
            demux,
            command,
            supervisor,
        })
    }

    // === Lifecycle ===

    /// Start supervising the link. A no-op if already started.
    pub fn start(&self) {
        self.supervisor.start();
    }

    /// Stop supervising, unsubscribe and disconnect.
    pub async fn stop(&self) {
        self.supervisor.stop().await;
    }

    /// Current link state.
    pub fn state(&self) -> LinkState {
        self.supervisor.state()
    }

    /// Check if the link is subscribed.
    pub fn is_connected(&self) -> bool {
        self.state().is_subscribed()
    }

    /// Snapshot of the link session.
    pub fn session(&self) -> LinkSession {
        self.supervisor.session()
    }

    /// Subscribe to link state transitions.
    pub fn subscribe_state(&self) -> broadcast::Receiver<LinkStateEvent> {
        self.supervisor.subscribe_state()
    }

    // === Commands ===

    /// Send a text command; dropped silently unless subscribed.
    pub async fn send_command(&self, text: &str) -> Result<()> {
        self.command.send_command(text).await
    }

    // === Subscribers ===

    /// Attach a subscriber.
    pub fn attach(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        self.broadcaster.attach(subscriber)
    }

    /// Attach a channel of typed events.
    pub fn attach_channel(&self) -> (SubscriberId, mpsc::UnboundedReceiver<DecodedEvent>) {
        self.broadcaster.attach_channel()
    }

    /// Attach a channel of text lines.
    pub fn attach_lines(&self) -> (SubscriberId, mpsc::UnboundedReceiver<String>) {
        self.broadcaster.attach_lines()
    }

    /// Register a callback for every event.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&DecodedEvent) + Send + Sync + 'static,
    {
        self.broadcaster.on_event(callback)
    }

    /// Detach a subscriber.
    pub fn detach(&self, id: SubscriberId) -> bool {
        self.broadcaster.detach(id)
    }

    /// Subscribe to finished frames for persistence.
    pub fn subscribe_images(&self) -> broadcast::Receiver<CompletedImage> {
        self.reassembler.subscribe()
    }

    // === Accessors ===

    /// The broadcaster.
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// The demultiplexer, for feeding notifications from another source.
    pub fn demux(&self) -> &Arc<NotificationDemux> {
        &self.demux
    }

    /// `(received, expected)` for the image in flight.
    pub fn image_progress(&self) -> (usize, usize) {
        self.reassembler.progress()
    }

    /// The active configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl<L: DeviceLink> std::fmt::Debug for Bridge<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("profile", &self.config.profile)
            .field("state", &self.state())
            .field("subscribers", &self.broadcaster.subscriber_count())
            .finish()
    }
}
