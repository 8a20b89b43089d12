//! Connection supervisor.
//!
//! One background task owns the link lifecycle:
//!
//! ```text
//! Idle → Scanning → Connecting → ResolvingCharacteristics → Subscribed
//!            ↑                                                  │
//!            └──────── backoff ──── (Disconnected | Error) ←────┘
//! ```
//!
//! Every failure is recovered here by retrying after a fixed backoff and is
//! reported to subscribers only as a [`SystemStatus`] event. Stopping is
//! observed at the next scan, connect, backoff or liveness wait.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ble::connection::{LinkFailure, LinkSession, LinkState, LinkStateEvent};
use crate::ble::link::DeviceLink;
use crate::ble::roles::{CharacteristicRole, RoleRegistry};
use crate::command::CommandChannel;
use crate::config::BridgeConfig;
use crate::demux::NotificationDemux;
use crate::error::Error;
use crate::event::{DecodedEvent, SystemStatus};
use crate::fanout::Broadcaster;

/// How one connection attempt ended.
enum Attempt {
    /// Failed or lost; back off and scan again.
    Retry,
    /// Stop was requested.
    Cancelled,
}

/// Resolves once stop is requested or the supervisor handle is dropped.
async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Run `fut` unless shutdown is signalled first.
async fn until_shutdown<F: Future>(
    shutdown: &mut watch::Receiver<bool>,
    fut: F,
) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = shutdown_signalled(shutdown) => None,
        out = fut => Some(out),
    }
}

struct SupervisorInner<L: DeviceLink> {
    link: Arc<L>,
    config: BridgeConfig,
    registry: RoleRegistry,
    session: Arc<RwLock<LinkSession>>,
    state_tx: broadcast::Sender<LinkStateEvent>,
    demux: Arc<NotificationDemux>,
    broadcaster: Broadcaster,
    command: Arc<CommandChannel<L>>,
}

/// Keeps the device link alive for the life of the process.
pub struct ConnectionSupervisor<L: DeviceLink> {
    inner: Arc<SupervisorInner<L>>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    /// Closes when the current loop exits.
    exited: Mutex<Option<watch::Receiver<()>>>,
}

impl<L: DeviceLink> ConnectionSupervisor<L> {
    /// Create a supervisor. Nothing happens until [`start`](Self::start).
    pub fn new(
        link: Arc<L>,
        config: BridgeConfig,
        session: Arc<RwLock<LinkSession>>,
        demux: Arc<NotificationDemux>,
        broadcaster: Broadcaster,
        command: Arc<CommandChannel<L>>,
    ) -> Self {
        let (state_tx, _) = broadcast::channel(64);
        let registry = *demux.registry();

        Self {
            inner: Arc::new(SupervisorInner {
                link,
                config,
                registry,
                session,
                state_tx,
                demux,
                broadcaster,
                command,
            }),
            shutdown_tx: Mutex::new(None),
            task: Mutex::new(None),
            exited: Mutex::new(None),
        }
    }

    /// Start the retry loop. A no-op if it is already running.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            debug!("Supervisor already running, ignoring start request");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.shutdown_tx.lock() = Some(shutdown_tx);
        let (exited_tx, exited_rx) = watch::channel(());
        *self.exited.lock() = Some(exited_rx);

        let inner = self.inner.clone();
        *task = Some(tokio::spawn(async move {
            inner.run(shutdown_rx).await;
            drop(exited_tx);
        }));
    }

    /// Stop the retry loop, unsubscribe and disconnect. Idempotent.
    ///
    /// Returns once the loop has exited and the state is back to `Idle`,
    /// including for callers racing another `stop`.
    pub async fn stop(&self) {
        let exited = self.exited.lock().clone();
        if let Some(shutdown_tx) = self.shutdown_tx.lock().take() {
            let _ = shutdown_tx.send(true);
        }

        let task = self.task.lock().take();
        if let Some(handle) = task {
            if let Err(e) = handle.await {
                error!("Supervisor task ended abnormally: {}", e);
                self.inner.set_state(LinkState::Idle);
            }
        } else if let Some(mut exited) = exited {
            // Another caller owns the join; wait for the loop to close the channel.
            while exited.changed().await.is_ok() {}
        }
    }

    /// Check if the retry loop is running.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Current link state.
    pub fn state(&self) -> LinkState {
        self.inner.session.read().state
    }

    /// Snapshot of the link session.
    pub fn session(&self) -> LinkSession {
        self.inner.session.read().clone()
    }

    /// Subscribe to link state transitions.
    pub fn subscribe_state(&self) -> broadcast::Receiver<LinkStateEvent> {
        self.inner.state_tx.subscribe()
    }
}

impl<L: DeviceLink> Drop for ConnectionSupervisor<L> {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.lock().take() {
            let _ = shutdown_tx.send(true);
        }
    }
}

impl<L: DeviceLink> SupervisorInner<L> {
    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Connection supervisor started ({:?} profile)", self.registry.profile());

        loop {
            if let Attempt::Cancelled = self.attempt(&mut shutdown).await {
                break;
            }

            info!("Retrying in {:?}", self.config.backoff);
            if until_shutdown(&mut shutdown, tokio::time::sleep(self.config.backoff))
                .await
                .is_none()
            {
                break;
            }
        }

        self.demux.reset_image();
        self.set_state(LinkState::Idle);
        info!("Connection supervisor stopped");
    }

    /// One pass through scan, connect, resolve, subscribe and monitor.
    async fn attempt(&self, shutdown: &mut watch::Receiver<bool>) -> Attempt {
        self.set_state(LinkState::Scanning);

        let devices = match until_shutdown(shutdown, self.link.discover(self.config.scan_window)).await
        {
            None => return Attempt::Cancelled,
            Some(Ok(devices)) => devices,
            Some(Err(e)) => {
                warn!("Scan error: {}", e);
                return self.fail(LinkFailure::ScanFailed, e.to_string(), SystemStatus::ScanFailed);
            }
        };

        let device = match devices
            .into_iter()
            .find(|d| self.config.device_filter.matches(d))
        {
            Some(device) => device,
            None => {
                warn!("Device not found. Make sure it's powered on.");
                return self.fail(
                    LinkFailure::ScanFailed,
                    "no matching device".to_string(),
                    SystemStatus::ScanFailed,
                );
            }
        };
        info!("Found: {} ({})", device.display_name(), device.address);

        self.set_state(LinkState::Connecting);
        let connect = tokio::time::timeout(
            self.config.connect_timeout,
            self.link.connect(&device.address),
        );
        let handle = match until_shutdown(shutdown, connect).await {
            None => return Attempt::Cancelled,
            Some(Err(_elapsed)) => {
                let reason = format!("timed out after {:?}", self.config.connect_timeout);
                warn!("Connection to {} failed: {}", device.address, reason);
                return self.fail(LinkFailure::ConnectFailed, reason, SystemStatus::Error);
            }
            Some(Ok(Err(e))) => {
                warn!("Connection to {} failed: {}", device.address, e);
                return self.fail(LinkFailure::ConnectFailed, e.to_string(), SystemStatus::Error);
            }
            Some(Ok(Ok(handle))) => handle,
        };

        self.set_state(LinkState::ResolvingCharacteristics);
        let resolved = match self.resolve_all(&handle).await {
            Ok(resolved) => resolved,
            Err(e) => {
                error!("Could not find all required characteristics: {}", e);
                self.disconnect_quietly(&handle).await;
                return self.fail(LinkFailure::ResolveFailed, e.to_string(), SystemStatus::Error);
            }
        };

        self.demux.reset_image();
        if let Err(e) = self.subscribe_all(&handle, &resolved).await {
            error!("Subscription failed: {}", e);
            self.unsubscribe_all(&handle, &resolved).await;
            self.disconnect_quietly(&handle).await;
            return self.fail(LinkFailure::ConnectFailed, e.to_string(), SystemStatus::Error);
        }

        if let Some((_, characteristic)) = resolved
            .iter()
            .find(|(role, _)| *role == CharacteristicRole::Command)
        {
            self.command.arm(handle.clone(), characteristic.clone());
        }

        {
            let mut session = self.session.write();
            session.retry_count = 0;
            session.device_address = Some(device.address.clone());
        }
        self.set_state(LinkState::Subscribed);
        info!("Subscribed to all notifications on {}", device.address);
        self.broadcaster
            .publish(DecodedEvent::status(SystemStatus::Connected));

        let lost = self.monitor(&handle, shutdown).await;

        self.command.disarm();
        self.session.write().device_address = None;

        if lost {
            self.set_state(LinkState::Disconnected);
            self.demux.reset_image();
            self.record_failure(LinkFailure::LinkLost, Error::ConnectionLost.to_string());
            warn!("Disconnected from {}", device.address);
            self.broadcaster
                .publish(DecodedEvent::status(SystemStatus::Disconnected));
            self.disconnect_quietly(&handle).await;
            Attempt::Retry
        } else {
            self.unsubscribe_all(&handle, &resolved).await;
            self.disconnect_quietly(&handle).await;
            self.set_state(LinkState::Disconnected);
            self.demux.reset_image();
            info!("Disconnected from {}", device.address);
            self.broadcaster
                .publish(DecodedEvent::status(SystemStatus::Disconnected));
            Attempt::Cancelled
        }
    }

    /// Resolve every role in the registry. All-or-nothing for required roles.
    async fn resolve_all(
        &self,
        handle: &L::Handle,
    ) -> Result<Vec<(CharacteristicRole, L::Characteristic)>, Error> {
        let mut resolved = Vec::new();

        for binding in self.registry.required() {
            let characteristic = self
                .link
                .resolve_characteristic(handle, &binding.id)
                .await
                .ok_or_else(|| Error::CharacteristicNotFound {
                    role: binding.role,
                    uuid: binding.id.characteristic.to_string(),
                })?;
            debug!("Resolved {} at {}", binding.role, binding.id);
            resolved.push((binding.role, characteristic));
        }

        for binding in self.registry.bindings().iter().filter(|b| !b.required) {
            match self.link.resolve_characteristic(handle, &binding.id).await {
                Some(characteristic) => resolved.push((binding.role, characteristic)),
                None => debug!("Optional role {} not present", binding.role),
            }
        }

        Ok(resolved)
    }

    async fn subscribe_all(
        &self,
        handle: &L::Handle,
        resolved: &[(CharacteristicRole, L::Characteristic)],
    ) -> Result<(), Error> {
        let callback = self.demux.callback();
        for (role, characteristic) in resolved.iter().filter(|(role, _)| role.is_notifying()) {
            self.link
                .subscribe(handle, characteristic, callback.clone())
                .await?;
            debug!("Subscribed to {}", role);
        }
        Ok(())
    }

    async fn unsubscribe_all(
        &self,
        handle: &L::Handle,
        resolved: &[(CharacteristicRole, L::Characteristic)],
    ) {
        for (role, characteristic) in resolved.iter().filter(|(role, _)| role.is_notifying()) {
            if let Err(e) = self.link.unsubscribe(handle, characteristic).await {
                debug!("Unsubscribe from {} failed: {}", role, e);
            }
        }
    }

    async fn disconnect_quietly(&self, handle: &L::Handle) {
        if let Err(e) = self.link.disconnect(handle).await {
            debug!("Best-effort disconnect failed: {}", e);
        }
    }

    /// Poll liveness. Returns `true` if the link dropped, `false` on stop.
    async fn monitor(&self, handle: &L::Handle, shutdown: &mut watch::Receiver<bool>) -> bool {
        loop {
            if until_shutdown(shutdown, tokio::time::sleep(self.config.liveness_poll))
                .await
                .is_none()
            {
                return false;
            }
            if !self.link.is_connected(handle).await {
                return true;
            }
        }
    }

    fn fail(&self, failure: LinkFailure, reason: String, status: SystemStatus) -> Attempt {
        self.record_failure(failure, reason);
        self.set_state(LinkState::Error);
        self.broadcaster.publish(DecodedEvent::status(status));
        Attempt::Retry
    }

    fn record_failure(&self, failure: LinkFailure, reason: String) {
        let mut session = self.session.write();
        session.retry_count = session.retry_count.saturating_add(1);
        session.last_error = Some((failure, reason));
    }

    /// Update the link state and emit an event.
    fn set_state(&self, new_state: LinkState) {
        let old_state = {
            let mut session = self.session.write();
            let old = session.state;
            session.state = new_state;
            if old != new_state {
                session.since = Some(Utc::now());
            }
            old
        };

        if old_state != new_state {
            debug!("Link state changed: {} -> {}", old_state, new_state);

            let _ = self.state_tx.send(LinkStateEvent {
                previous: old_state,
                state: new_state,
            });
        }
    }
}
