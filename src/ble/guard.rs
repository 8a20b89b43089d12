//! Teardown for BLE steps that may be cancelled mid-flight.
//!
//! The supervisor drops a scan or connect future when stop is requested or
//! a timeout fires. Anything already started on the adapter (a running scan,
//! a half-open link) is then torn down from a spawned task.

use std::future::Future;
use tracing::{debug, warn};

/// Runs `cleanup` on the current runtime when dropped, unless disarmed.
pub(crate) struct CleanupGuard<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    what: &'static str,
    cleanup: Option<F>,
}

impl<F> CleanupGuard<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    pub(crate) fn new(what: &'static str, cleanup: F) -> Self {
        Self {
            what,
            cleanup: Some(cleanup),
        }
    }

    /// The step completed; skip the cleanup.
    pub(crate) fn disarm(mut self) {
        self.cleanup = None;
    }
}

impl<F> Drop for CleanupGuard<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    fn drop(&mut self) {
        let Some(cleanup) = self.cleanup.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Interrupted {}, cleaning up", self.what);
                handle.spawn(cleanup);
            }
            Err(_) => warn!("Interrupted {} outside a runtime, skipping cleanup", self.what),
        }
    }
}
