//! Link session state.
//!
//! The connection supervisor is the only writer of [`LinkSession`]; everyone
//! else gets snapshots or listens to [`LinkStateEvent`]s.

use std::fmt;

use chrono::{DateTime, Utc};

/// Lifecycle state of the device link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LinkState {
    /// Supervisor not running.
    #[default]
    Idle,
    /// Looking for a matching device.
    Scanning,
    /// Establishing the link.
    Connecting,
    /// Matching registry roles against the device's characteristics.
    ResolvingCharacteristics,
    /// All roles resolved and notifications flowing.
    Subscribed,
    /// A subscribed link went away.
    Disconnected,
    /// The last attempt failed before reaching `Subscribed`.
    Error,
}

impl LinkState {
    /// Check if notifications are flowing.
    pub fn is_subscribed(&self) -> bool {
        matches!(self, Self::Subscribed)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Connecting => write!(f, "Connecting"),
            Self::ResolvingCharacteristics => write!(f, "ResolvingCharacteristics"),
            Self::Subscribed => write!(f, "Subscribed"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Why the last attempt ended. Recovered by the retry loop, never returned
/// to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LinkFailure {
    /// No matching device within the scan window, or the scan itself failed.
    ScanFailed,
    /// Link establishment error.
    ConnectFailed,
    /// One or more required roles absent on the device.
    ResolveFailed,
    /// A subscribed link became unreachable.
    LinkLost,
}

impl fmt::Display for LinkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScanFailed => write!(f, "scan failed"),
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::ResolveFailed => write!(f, "resolve failed"),
            Self::LinkLost => write!(f, "link lost"),
        }
    }
}

/// Snapshot of the supervisor's view of the link.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkSession {
    /// Current state.
    pub state: LinkState,
    /// Failed attempts since the last time the link reached `Subscribed`.
    pub retry_count: u32,
    /// Kind and description of the most recent failure.
    pub last_error: Option<(LinkFailure, String)>,
    /// Address of the connected device, while subscribed.
    pub device_address: Option<String>,
    /// When the current state was entered.
    pub since: Option<DateTime<Utc>>,
}

impl LinkSession {
    /// Check if the link is usable for commands.
    pub fn is_connected(&self) -> bool {
        self.state.is_subscribed()
    }
}

/// Event for link state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStateEvent {
    /// State before the transition.
    pub previous: LinkState,
    /// State after the transition.
    pub state: LinkState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_state() {
        assert!(LinkState::Subscribed.is_subscribed());
        assert!(!LinkState::Disconnected.is_subscribed());
        assert_eq!(LinkState::default(), LinkState::Idle);
    }

    #[test]
    fn test_link_state_display() {
        assert_eq!(format!("{}", LinkState::Subscribed), "Subscribed");
        assert_eq!(
            format!("{}", LinkState::ResolvingCharacteristics),
            "ResolvingCharacteristics"
        );
    }

    #[test]
    fn test_session_default() {
        let session = LinkSession::default();
        assert!(!session.is_connected());
        assert_eq!(session.retry_count, 0);
        assert!(session.last_error.is_none());
    }
}
