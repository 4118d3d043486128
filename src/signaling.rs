//! Control-plane connection to the signaling relay.
//!
//! One WebSocket per session: the client joins by code as soon as the
//! transport opens, then dispatches inbound relay messages (in delivery
//! order) to the lifecycle controller as [`SignalingEvent`]s. Outbound
//! messages flow through a single writer task so send order is preserved.
//! There is no automatic reconnect; only a fresh top-level connect opens a
//! new transport.

use crate::error::Result;
use crate::peer::types::IceCandidate;
use crate::signals::{EngineSignals, SignalingStatus};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

pub const TECHNICIAN_ROLE: &str = "technician";
pub const AGENT_ROLE: &str = "agent";

/// Tagged relay protocol messages, both directions.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RelayMessage {
    Join {
        code: String,
        role: String,
    },
    Joined,
    PeerJoined,
    Offer {
        offer: RTCSessionDescription,
    },
    Answer {
        answer: RTCSessionDescription,
        code: String,
        role: String,
    },
    IceCandidate {
        candidate: IceCandidate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },
    Error {
        message: String,
    },
    SessionClosed,
    Leave {
        code: String,
        role: String,
    },
}

/// What the relay delivered, surfaced to the lifecycle controller.
#[derive(Debug)]
pub enum SignalingEvent {
    Joined,
    PeerJoined,
    Offer(RTCSessionDescription),
    RemoteCandidate(IceCandidate),
    RelayError(String),
    SessionClosed,
    TransportClosed,
}

pub struct SignalingClient {
    url: String,
    signals: Arc<EngineSignals>,
    code: Mutex<String>,
    outbound: Mutex<Option<mpsc::UnboundedSender<RelayMessage>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SignalingClient {
    pub fn new(url: impl Into<String>, signals: Arc<EngineSignals>) -> Self {
        Self {
            url: url.into(),
            signals,
            code: Mutex::new(String::new()),
            outbound: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    /// Opens the relay transport and joins the session. Any prior transport
    /// is closed first; only one join is ever sent per transport.
    pub async fn connect(
        &self,
        code: &str,
        events: mpsc::UnboundedSender<SignalingEvent>,
    ) -> Result<()> {
        self.disconnect();
        *self.code.lock() = code.to_string();

        self.signals
            .set_signaling_status(SignalingStatus::Connecting);
        info!(url = %self.url, code, "connecting to signaling relay");

        let (ws, _) = match connect_async(&self.url).await {
            Ok(ok) => ok,
            Err(e) => {
                self.signals.set_signaling_status(SignalingStatus::Error);
                return Err(e.into());
            }
        };
        let (mut sink, mut stream) = ws.split();

        let join = RelayMessage::Join {
            code: code.to_string(),
            role: TECHNICIAN_ROLE.to_string(),
        };
        if let Err(e) = sink.send(Message::Text(serde_json::to_string(&join)?)).await {
            self.signals.set_signaling_status(SignalingStatus::Error);
            return Err(e.into());
        }
        self.signals
            .set_signaling_status(SignalingStatus::Connected);

        let (tx, mut rx) = mpsc::unbounded_channel::<RelayMessage>();
        *self.outbound.lock() = Some(tx);

        // Writer: drains the queue in order, then closes the socket once the
        // sender side is dropped (disconnect enqueues `leave` first).
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "failed to serialize relay message");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!(error = %e, "relay send failed");
                    break;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
        });

        // Reader: dispatches frames in delivery order until the transport
        // goes away. Parse failures are logged per message, never fatal.
        let signals = self.signals.clone();
        let reader = tokio::spawn(async move {
            let mut failed = false;
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => handle_frame(&text, &events, &signals),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "signaling transport error");
                        failed = true;
                        break;
                    }
                }
            }
            signals.set_signaling_status(if failed {
                SignalingStatus::Error
            } else {
                SignalingStatus::Disconnected
            });
            let _ = events.send(SignalingEvent::TransportClosed);
        });
        *self.reader.lock() = Some(reader);

        Ok(())
    }

    /// Queues the local answer, tagged with the session code and our role.
    pub fn send_answer(&self, answer: RTCSessionDescription) -> bool {
        self.enqueue(RelayMessage::Answer {
            answer,
            code: self.code.lock().clone(),
            role: TECHNICIAN_ROLE.to_string(),
        })
    }

    /// Queues one locally discovered candidate. Called per candidate as it
    /// is discovered; no batching.
    pub fn send_ice_candidate(&self, candidate: IceCandidate) -> bool {
        self.enqueue(RelayMessage::IceCandidate {
            candidate,
            code: Some(self.code.lock().clone()),
            role: Some(TECHNICIAN_ROLE.to_string()),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.outbound
            .lock()
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    /// Announces departure so the relay releases the session slot, then
    /// drops the transport. Safe to call when already disconnected.
    pub fn disconnect(&self) {
        if let Some(tx) = self.outbound.lock().take() {
            if !tx.is_closed() {
                let _ = tx.send(RelayMessage::Leave {
                    code: self.code.lock().clone(),
                    role: TECHNICIAN_ROLE.to_string(),
                });
            }
        }
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        self.signals
            .set_signaling_status(SignalingStatus::Disconnected);
    }

    fn enqueue(&self, message: RelayMessage) -> bool {
        match self.outbound.lock().as_ref() {
            Some(tx) => tx.send(message).is_ok(),
            None => {
                debug!("relay transport not open, message dropped");
                false
            }
        }
    }
}

fn handle_frame(
    text: &str,
    events: &mpsc::UnboundedSender<SignalingEvent>,
    signals: &EngineSignals,
) {
    let message = match serde_json::from_str::<RelayMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "ignoring malformed relay message");
            return;
        }
    };
    dispatch(message, events, signals);
}

fn dispatch(
    message: RelayMessage,
    events: &mpsc::UnboundedSender<SignalingEvent>,
    signals: &EngineSignals,
) {
    match message {
        RelayMessage::Joined => {
            signals.set_signaling_status(SignalingStatus::Connected);
            signals.set_last_message("Joined session, waiting for the agent's screen");
            let _ = events.send(SignalingEvent::Joined);
        }
        RelayMessage::PeerJoined => {
            info!("agent joined the session, waiting for offer");
            let _ = events.send(SignalingEvent::PeerJoined);
        }
        RelayMessage::Offer { offer } => {
            let _ = events.send(SignalingEvent::Offer(offer));
        }
        RelayMessage::IceCandidate {
            candidate, role, ..
        } => {
            if role.as_deref() == Some(AGENT_ROLE) {
                let _ = events.send(SignalingEvent::RemoteCandidate(candidate));
            } else {
                debug!(?role, "ignoring candidate from non-agent role");
            }
        }
        RelayMessage::Error { message } => {
            // Relay errors are advisory; the transport stays up.
            signals.set_last_message(format!("Relay error: {message}"));
            let _ = events.send(SignalingEvent::RelayError(message));
        }
        RelayMessage::SessionClosed => {
            let _ = events.send(SignalingEvent::SessionClosed);
        }
        RelayMessage::Join { .. } | RelayMessage::Answer { .. } | RelayMessage::Leave { .. } => {
            debug!("ignoring outbound-only message echoed by relay");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn harness() -> (
        mpsc::UnboundedSender<SignalingEvent>,
        mpsc::UnboundedReceiver<SignalingEvent>,
        Arc<EngineSignals>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, rx, Arc::new(EngineSignals::new()))
    }

    #[test]
    fn join_message_wire_format() {
        let json = serde_json::to_value(&RelayMessage::Join {
            code: "123456789".into(),
            role: TECHNICIAN_ROLE.into(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "join", "code": "123456789", "role": "technician"})
        );
    }

    #[test]
    fn tagged_unit_messages_parse() {
        assert!(matches!(
            serde_json::from_str::<RelayMessage>(r#"{"type":"peer-joined"}"#).unwrap(),
            RelayMessage::PeerJoined
        ));
        assert!(matches!(
            serde_json::from_str::<RelayMessage>(r#"{"type":"session-closed"}"#).unwrap(),
            RelayMessage::SessionClosed
        ));
    }

    #[test]
    fn offer_payload_parses_into_session_description() {
        let text = json!({
            "type": "offer",
            "offer": {"type": "offer", "sdp": "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n"}
        })
        .to_string();
        match serde_json::from_str::<RelayMessage>(&text).unwrap() {
            RelayMessage::Offer { offer } => assert!(offer.sdp.starts_with("v=0")),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn candidates_from_non_agent_roles_are_ignored() {
        let (tx, mut rx, signals) = harness();
        let candidate = IceCandidate {
            candidate: "candidate:1 1 udp 1 1.2.3.4 5000 typ srflx".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        };
        dispatch(
            RelayMessage::IceCandidate {
                candidate: candidate.clone(),
                code: None,
                role: Some("technician".into()),
            },
            &tx,
            &signals,
        );
        dispatch(
            RelayMessage::IceCandidate {
                candidate: candidate.clone(),
                code: None,
                role: None,
            },
            &tx,
            &signals,
        );
        assert!(rx.try_recv().is_err());

        dispatch(
            RelayMessage::IceCandidate {
                candidate,
                code: None,
                role: Some(AGENT_ROLE.into()),
            },
            &tx,
            &signals,
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            SignalingEvent::RemoteCandidate(_)
        ));
    }

    #[test]
    fn relay_errors_surface_without_closing_anything() {
        let (tx, mut rx, signals) = harness();
        dispatch(
            RelayMessage::Error {
                message: "session not found".into(),
            },
            &tx,
            &signals,
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            SignalingEvent::RelayError(m) if m == "session not found"
        ));
        assert!(signals.last_message().contains("session not found"));
    }

    #[test]
    fn malformed_frames_are_swallowed() {
        let (tx, mut rx, signals) = harness();
        handle_frame("not json at all", &tx, &signals);
        handle_frame(r#"{"type":"wat"}"#, &tx, &signals);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn joined_marks_signaling_connected() {
        let (tx, _rx, signals) = harness();
        dispatch(RelayMessage::Joined, &tx, &signals);
        assert_eq!(signals.signaling_status(), SignalingStatus::Connected);
    }
}
