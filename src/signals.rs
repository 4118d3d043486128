//! Observable signals the engine exposes to its consumer (the dashboard UI).
//!
//! The UI only ever reads these; the lifecycle controller and the peer
//! manager are the sole writers. Everything is a `watch` channel so a
//! consumer can either poll the latest value or await changes.

use crate::peer::types::ScreenResolution;
use std::sync::Arc;
use tokio::sync::watch;
use webrtc::track::track_remote::TrackRemote;

/// Session lifecycle states. `Closed` and `Error` are terminal until a new
/// `connect` call restarts the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Pending,
    Connected,
    Closed,
    Error,
}

/// State of the relay transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

pub struct EngineSignals {
    status: watch::Sender<SessionStatus>,
    signaling: watch::Sender<SignalingStatus>,
    stream: watch::Sender<Option<Arc<TrackRemote>>>,
    resolution: watch::Sender<ScreenResolution>,
    control_enabled: watch::Sender<bool>,
    last_message: watch::Sender<String>,
}

impl EngineSignals {
    pub fn new() -> Self {
        Self {
            status: watch::channel(SessionStatus::Idle).0,
            signaling: watch::channel(SignalingStatus::Disconnected).0,
            stream: watch::channel(None).0,
            resolution: watch::channel(ScreenResolution::default()).0,
            control_enabled: watch::channel(false).0,
            last_message: watch::channel(String::new()).0,
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn set_status(&self, status: SessionStatus) {
        if self.status.send_replace(status) != status {
            tracing::debug!(?status, "session status changed");
        }
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn signaling_status(&self) -> SignalingStatus {
        *self.signaling.borrow()
    }

    pub fn set_signaling_status(&self, status: SignalingStatus) {
        self.signaling.send_replace(status);
    }

    pub fn subscribe_signaling_status(&self) -> watch::Receiver<SignalingStatus> {
        self.signaling.subscribe()
    }

    /// Adopts the first inbound media stream of a negotiation. Later track
    /// events on the same negotiation are coalesced into the first adoption.
    pub fn adopt_stream(&self, track: Arc<TrackRemote>) -> bool {
        self.stream.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(track);
                true
            } else {
                false
            }
        })
    }

    pub fn clear_stream(&self) {
        self.stream.send_replace(None);
    }

    pub fn stream(&self) -> Option<Arc<TrackRemote>> {
        self.stream.borrow().clone()
    }

    pub fn subscribe_stream(&self) -> watch::Receiver<Option<Arc<TrackRemote>>> {
        self.stream.subscribe()
    }

    pub fn resolution(&self) -> ScreenResolution {
        *self.resolution.borrow()
    }

    pub fn set_resolution(&self, resolution: ScreenResolution) {
        if self.resolution.send_replace(resolution) != resolution {
            tracing::info!(
                width = resolution.width,
                height = resolution.height,
                "remote screen resolution updated"
            );
        }
    }

    pub fn control_enabled(&self) -> bool {
        *self.control_enabled.borrow()
    }

    pub fn set_control_enabled(&self, enabled: bool) {
        self.control_enabled.send_replace(enabled);
    }

    pub fn subscribe_control_enabled(&self) -> watch::Receiver<bool> {
        self.control_enabled.subscribe()
    }

    pub fn last_message(&self) -> String {
        self.last_message.borrow().clone()
    }

    /// Short diagnostic string shown to the user (limit messages, relay
    /// errors). Not a log; the latest value wins.
    pub fn set_last_message(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(%message, "status message");
        self.last_message.send_replace(message);
    }
}

impl Default for EngineSignals {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_idle_and_control_disabled() {
        let signals = EngineSignals::new();
        assert_eq!(signals.status(), SessionStatus::Idle);
        assert_eq!(signals.signaling_status(), SignalingStatus::Disconnected);
        assert!(!signals.control_enabled());
        assert!(signals.stream().is_none());
        assert_eq!(signals.resolution(), ScreenResolution::default());
    }

    #[test]
    fn status_updates_are_observable() {
        let signals = EngineSignals::new();
        let rx = signals.subscribe_status();
        signals.set_status(SessionStatus::Pending);
        assert_eq!(*rx.borrow(), SessionStatus::Pending);
    }
}
