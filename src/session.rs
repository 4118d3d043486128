//! Session lifecycle controller.
//!
//! Drives `idle → pending → connected → closed` (plus terminal `error`),
//! gating every connect behind the quota rules and the backend's session
//! authorization before any transport is opened. Owns the signaling client
//! and the peer manager; consumers only read the signals it publishes.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::licensing::{check_plan_limit, HttpBackend, LicenseBackend};
use crate::peer::{ControlChannel, PeerManager};
use crate::signaling::{SignalingClient, SignalingEvent};
use crate::signals::{EngineSignals, SessionStatus};
use crate::utils::{format_session_code, normalize_session_code};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The one active session, if any. Created when a connect request starts,
/// destroyed on close or unrecoverable error.
#[derive(Debug, Clone)]
pub struct Session {
    pub code: String,
    pub user_id: Option<String>,
    pub started_at: DateTime<Utc>,
}

pub struct SessionController {
    config: EngineConfig,
    signals: Arc<EngineSignals>,
    signaling: Arc<SignalingClient>,
    peer: Arc<PeerManager>,
    backend: Arc<dyn LicenseBackend>,
    session: Mutex<Option<Session>>,
    event_pump: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    pub fn new(config: EngineConfig) -> Self {
        let backend = Arc::new(HttpBackend::new(config.api_base.clone()));
        Self::with_backend(config, backend)
    }

    /// Injects a backend stand-in; lifecycle tests use this to run without
    /// a license service.
    pub fn with_backend(config: EngineConfig, backend: Arc<dyn LicenseBackend>) -> Self {
        let signals = Arc::new(EngineSignals::new());
        let signaling = Arc::new(SignalingClient::new(
            config.signaling_url.clone(),
            signals.clone(),
        ));
        let peer = Arc::new(PeerManager::new(signals.clone()));
        Self {
            config,
            signals,
            signaling,
            peer,
            backend,
            session: Mutex::new(None),
            event_pump: Mutex::new(None),
        }
    }

    pub fn signals(&self) -> Arc<EngineSignals> {
        self.signals.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.signals.status()
    }

    /// Sink for the input command encoder.
    pub fn control_channel(&self) -> Arc<ControlChannel> {
        self.peer.control_channel()
    }

    pub fn session(&self) -> Option<Session> {
        self.session.lock().clone()
    }

    /// Validates eligibility and opens the session. Returns false on any
    /// denial or failure, with the reason published as the last status
    /// message; a superseding call implicitly closes the prior transports.
    pub async fn connect(&self, code: &str, user_id: Option<&str>) -> bool {
        match self.try_connect(code, user_id).await {
            Ok(()) => true,
            Err(e) => {
                self.signals.set_last_message(e.to_string());
                match e {
                    // Fails fast: nothing was touched yet.
                    EngineError::EmptyCode => {}
                    // Denied before any transport was opened.
                    EngineError::LimitExceeded(_)
                    | EngineError::SessionRejected { .. }
                    | EngineError::Http(_) => {
                        self.signals.set_status(SessionStatus::Idle);
                    }
                    // The session may have gone live; teardown is mandatory.
                    _ => {
                        self.teardown_transports().await;
                        self.signals.set_status(SessionStatus::Error);
                    }
                }
                false
            }
        }
    }

    async fn try_connect(&self, code: &str, user_id: Option<&str>) -> Result<()> {
        let code = normalize_session_code(code);
        if code.is_empty() {
            return Err(EngineError::EmptyCode);
        }

        self.signals.set_status(SessionStatus::Pending);
        self.signals.set_last_message("Validating session");

        if let Some(user_id) = user_id {
            if let Some(limits) = self.backend.user_limits(user_id).await? {
                check_plan_limit(&limits)?;
            }
        }

        self.backend.open_session(&code, user_id).await?;
        info!(code = %format_session_code(&code), "session authorized");

        // From here on the session is live; init/connect both close any
        // prior instance before opening a new one.
        if let Some(pump) = self.event_pump.lock().take() {
            pump.abort();
        }
        self.peer
            .init(self.signaling.clone(), self.config.ice_servers.clone())
            .await?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.signaling.connect(&code, tx).await?;
        self.spawn_event_pump(rx);

        *self.session.lock() = Some(Session {
            code: code.clone(),
            user_id: user_id.map(Into::into),
            started_at: Utc::now(),
        });
        self.signals
            .set_last_message(format!("Session {} validated", format_session_code(&code)));
        Ok(())
    }

    /// Notifies the backend (best-effort), then tears down channel, peer
    /// connection, and signaling, in that order. A no-op on an idle engine.
    pub async fn close(&self) {
        let session = self.session.lock().take();

        if let Some(session) = &session {
            if let Err(e) = self.backend.close_session(&session.code).await {
                warn!(error = %e, "failed to close remote session record");
            }
            if let Some(user_id) = &session.user_id {
                if let Err(e) = self.backend.decrement_connection(user_id).await {
                    warn!(error = %e, "failed to decrement connection counter");
                }
            }
        }

        self.teardown_transports().await;
        self.signals.set_status(SessionStatus::Idle);

        if let Some(session) = session {
            let seconds = (Utc::now() - session.started_at).num_seconds();
            info!(
                code = %format_session_code(&session.code),
                seconds,
                "session closed"
            );
        }
    }

    async fn teardown_transports(&self) {
        if let Some(pump) = self.event_pump.lock().take() {
            pump.abort();
        }
        self.peer.close().await;
        self.signaling.disconnect();
        self.signals.clear_stream();
        self.signals.set_control_enabled(false);
    }

    /// Consumes relay events strictly in delivery order; an offer finishes
    /// negotiating before the next event is looked at.
    fn spawn_event_pump(&self, mut events: mpsc::UnboundedReceiver<SignalingEvent>) {
        let signals = self.signals.clone();
        let signaling = self.signaling.clone();
        let peer = self.peer.clone();

        let pump = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    SignalingEvent::Joined | SignalingEvent::PeerJoined => {}
                    SignalingEvent::Offer(offer) => {
                        if let Err(e) = peer.handle_remote_offer(offer, &signaling).await {
                            warn!(error = %e, "offer negotiation failed");
                            signals.set_last_message(format!("Negotiation failed: {e}"));
                            signals.set_status(SessionStatus::Error);
                            peer.close().await;
                        }
                    }
                    SignalingEvent::RemoteCandidate(candidate) => {
                        peer.add_remote_candidate(candidate).await;
                    }
                    // Advisory; already published as the last message.
                    SignalingEvent::RelayError(_) => {}
                    SignalingEvent::SessionClosed => {
                        info!("session closed by the agent");
                        signals.set_last_message("Session closed by the remote peer");
                        peer.close().await;
                        signals.clear_stream();
                        signals.set_status(SessionStatus::Closed);
                    }
                    SignalingEvent::TransportClosed => {
                        if !matches!(
                            signals.status(),
                            SessionStatus::Idle | SessionStatus::Error
                        ) {
                            signals.set_control_enabled(false);
                            signals.clear_stream();
                            signals.set_status(SessionStatus::Closed);
                        }
                        break;
                    }
                }
            }
        });
        *self.event_pump.lock() = Some(pump);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::licensing::{PlanType, UserLimits};
    use async_trait::async_trait;

    #[derive(Default)]
    struct MockBackend {
        limits: Option<UserLimits>,
        reject_reason: Option<String>,
        limits_calls: Mutex<u32>,
        opened: Mutex<Vec<String>>,
        closed: Mutex<Vec<String>>,
        decremented: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LicenseBackend for MockBackend {
        async fn user_limits(&self, _user_id: &str) -> Result<Option<UserLimits>> {
            *self.limits_calls.lock() += 1;
            Ok(self.limits.clone())
        }

        async fn open_session(&self, code: &str, _technician_id: Option<&str>) -> Result<()> {
            if let Some(reason) = &self.reject_reason {
                return Err(EngineError::SessionRejected {
                    code: code.to_string(),
                    reason: reason.clone(),
                });
            }
            self.opened.lock().push(code.to_string());
            Ok(())
        }

        async fn close_session(&self, code: &str) -> Result<()> {
            self.closed.lock().push(code.to_string());
            Ok(())
        }

        async fn decrement_connection(&self, user_id: &str) -> Result<()> {
            self.decremented.lock().push(user_id.to_string());
            Ok(())
        }
    }

    fn controller(backend: MockBackend) -> (SessionController, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        let config = EngineConfig {
            // Refused immediately; tests must never get that far anyway.
            signaling_url: "ws://127.0.0.1:1/".into(),
            ..Default::default()
        };
        (
            SessionController::with_backend(config, backend.clone()),
            backend,
        )
    }

    fn demo_limits(trial_used: u32) -> UserLimits {
        UserLimits {
            plan_type: PlanType::Demo,
            trial_used,
            active_connections: 0,
        }
    }

    #[tokio::test]
    async fn empty_code_fails_fast_without_any_backend_call() {
        let (controller, backend) = controller(MockBackend::default());
        assert!(!controller.connect("", Some("u-1")).await);
        assert!(!controller.connect("  --- ", Some("u-1")).await);
        assert_eq!(*backend.limits_calls.lock(), 0);
        assert!(backend.opened.lock().is_empty());
        assert_eq!(controller.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn exhausted_demo_plan_never_opens_a_session() {
        let (controller, backend) = controller(MockBackend {
            limits: Some(demo_limits(3)),
            ..Default::default()
        });

        assert!(!controller.connect("123456789", Some("u-1")).await);
        assert_eq!(controller.status(), SessionStatus::Idle);
        assert!(backend.opened.lock().is_empty());
        assert!(controller.session().is_none());
        let message = controller.signals().last_message();
        assert!(message.contains("Demo limit reached (3/3"), "{message}");
    }

    #[tokio::test]
    async fn eligible_demo_plan_reaches_authorization() {
        let (controller, backend) = controller(MockBackend {
            limits: Some(demo_limits(2)),
            ..Default::default()
        });

        // Authorization succeeds, then the unreachable relay fails the
        // connect; the point is that the session was opened first and the
        // failure is terminal.
        assert!(!controller.connect("123-456-789", Some("u-1")).await);
        assert_eq!(backend.opened.lock().as_slice(), ["123456789"]);
        assert_eq!(controller.status(), SessionStatus::Error);
    }

    #[tokio::test]
    async fn backend_rejection_aborts_before_transports() {
        let (controller, _backend) = controller(MockBackend {
            reject_reason: Some("unknown code".into()),
            ..Default::default()
        });

        assert!(!controller.connect("987654321", None).await);
        assert_eq!(controller.status(), SessionStatus::Idle);
        assert!(controller.signals().last_message().contains("unknown code"));
    }

    #[tokio::test]
    async fn missing_limits_default_allow() {
        let (controller, backend) = controller(MockBackend::default());
        // limits: None — backend has no answer, connect proceeds to
        // authorization.
        assert!(!controller.connect("123456789", Some("u-1")).await);
        assert_eq!(*backend.limits_calls.lock(), 1);
        assert_eq!(backend.opened.lock().as_slice(), ["123456789"]);
    }

    #[tokio::test]
    async fn close_on_idle_engine_is_a_quiet_no_op() {
        let (controller, backend) = controller(MockBackend::default());
        controller.close().await;
        controller.close().await;
        assert_eq!(controller.status(), SessionStatus::Idle);
        assert!(backend.closed.lock().is_empty());
        assert!(backend.decremented.lock().is_empty());
    }

    #[tokio::test]
    async fn anonymous_connect_skips_the_quota_check() {
        let (controller, backend) = controller(MockBackend {
            limits: Some(demo_limits(3)),
            ..Default::default()
        });
        // No user id: quota is not consulted even though the mock would
        // deny it.
        assert!(!controller.connect("123456789", None).await);
        assert_eq!(*backend.limits_calls.lock(), 0);
        assert_eq!(backend.opened.lock().as_slice(), ["123456789"]);
    }
}
