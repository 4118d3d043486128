//! Peer connection manager: owns the RTCPeerConnection for the active
//! session, answers the agent's offer, and bridges ICE candidates to the
//! signaling client.

use crate::config::{CONTROL_CHANNEL_LABEL, CONTROL_CHANNEL_LIFETIME_MS};
use crate::error::{EngineError, Result};
use crate::peer::data_channel::ControlChannel;
use crate::peer::ice::{candidate_kind, CandidateQueue};
use crate::peer::types::IceCandidate;
use crate::signaling::SignalingClient;
use crate::signals::{EngineSignals, SessionStatus};
use crate::utils::random_id;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use webrtc::{
    api::APIBuilder,
    data_channel::{data_channel_init::RTCDataChannelInit, RTCDataChannel},
    ice_transport::{ice_candidate::RTCIceCandidate, ice_server::RTCIceServer},
    peer_connection::{
        configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
        sdp::session_description::RTCSessionDescription, RTCPeerConnection,
    },
    rtp_transceiver::{rtp_receiver::RTCRtpReceiver, RTCRtpTransceiver},
    track::track_remote::TrackRemote,
};

pub struct PeerManager {
    signals: Arc<EngineSignals>,
    pc: Mutex<Option<Arc<RTCPeerConnection>>>,
    channel: Arc<ControlChannel>,
    pending_remote: CandidateQueue,
}

impl PeerManager {
    pub fn new(signals: Arc<EngineSignals>) -> Self {
        let channel = Arc::new(ControlChannel::new(signals.clone()));
        Self {
            signals,
            pc: Mutex::new(None),
            channel,
            pending_remote: CandidateQueue::default(),
        }
    }

    pub fn control_channel(&self) -> Arc<ControlChannel> {
        self.channel.clone()
    }

    pub fn is_active(&self) -> bool {
        self.pc.lock().is_some()
    }

    /// Creates a fresh peer connection for a negotiation, closing any prior
    /// one first. Local candidates are forwarded to the relay the moment
    /// they are discovered.
    pub async fn init(
        &self,
        signaling: Arc<SignalingClient>,
        ice_servers: Vec<RTCIceServer>,
    ) -> Result<()> {
        self.close().await;
        self.pending_remote.clear();
        self.signals.clear_stream();
        self.signals.set_resolution(Default::default());

        let connection_id = random_id();
        info!(conn = %connection_id, "initializing peer connection");

        let api = APIBuilder::new().build();
        let pc = Arc::new(
            api.new_peer_connection(RTCConfiguration {
                ice_servers,
                ..Default::default()
            })
            .await?,
        );

        let conn = connection_id.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let signaling = signaling.clone();
            let conn = conn.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!(conn = %conn, "local candidate gathering complete");
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        let candidate = IceCandidate::from(init);
                        debug!(
                            conn = %conn,
                            kind = candidate_kind(&candidate.candidate),
                            "forwarding local candidate"
                        );
                        signaling.send_ice_candidate(candidate);
                    }
                    Err(e) => warn!(conn = %conn, error = %e, "failed to encode candidate"),
                }
            })
        }));

        let signals = self.signals.clone();
        let conn = connection_id.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            debug!(conn = %conn, ?state, "peer connection state changed");
            match state {
                RTCPeerConnectionState::Failed => {
                    // Intentional teardown transitions through close(); a
                    // failure while live is surfaced as a terminal error.
                    if matches!(
                        signals.status(),
                        SessionStatus::Pending | SessionStatus::Connected
                    ) {
                        signals.set_last_message("Connection to the remote peer failed");
                        signals.set_status(SessionStatus::Error);
                    }
                }
                RTCPeerConnectionState::Disconnected => {
                    warn!(conn = %conn, "peer connection degraded");
                }
                _ => {}
            }
            Box::pin(async {})
        }));

        let signals = self.signals.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let signals = signals.clone();
                Box::pin(async move {
                    if signals.adopt_stream(track.clone()) {
                        info!(kind = %track.kind(), "remote screen stream received");
                        signals.set_status(SessionStatus::Connected);
                    } else {
                        trace!("additional track event coalesced");
                    }
                })
            },
        ));

        let channel = self.channel.clone();
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let channel = channel.clone();
            Box::pin(async move {
                if dc.label() == CONTROL_CHANNEL_LABEL {
                    channel.attach(dc);
                } else {
                    debug!(label = %dc.label(), "ignoring unexpected data channel");
                }
            })
        }));

        *self.pc.lock() = Some(pc);
        Ok(())
    }

    /// Applies the agent's offer, opens our side of the control channel,
    /// and sends the local answer back through the relay. Remote candidates
    /// queued before the offer arrived are flushed once the description is
    /// set.
    pub async fn handle_remote_offer(
        &self,
        offer: RTCSessionDescription,
        signaling: &SignalingClient,
    ) -> Result<()> {
        let pc = self.current()?;

        pc.set_remote_description(offer).await?;

        let init = RTCDataChannelInit {
            ordered: Some(true),
            max_packet_life_time: Some(CONTROL_CHANNEL_LIFETIME_MS),
            ..Default::default()
        };
        let dc = pc
            .create_data_channel(CONTROL_CHANNEL_LABEL, Some(init))
            .await?;
        self.channel.attach(dc);

        self.flush_pending(&pc).await;

        let answer = pc.create_answer(None).await?;
        pc.set_local_description(answer).await?;
        let local = pc.local_description().await.ok_or_else(|| {
            EngineError::Signaling("local description missing after answer".into())
        })?;

        if !signaling.send_answer(local) {
            return Err(EngineError::Signaling(
                "relay transport closed before answer could be sent".into(),
            ));
        }
        info!("answer sent to agent");
        Ok(())
    }

    /// Applies a remote candidate, or queues it when the remote description
    /// has not been set yet. Queued candidates are never dropped.
    pub async fn add_remote_candidate(&self, candidate: IceCandidate) {
        let pc = { self.pc.lock().clone() };
        let Some(pc) = pc else {
            debug!("no peer connection yet, queuing remote candidate");
            self.pending_remote.push(candidate);
            return;
        };

        if pc.remote_description().await.is_some() {
            if let Err(e) = pc.add_ice_candidate(candidate.into()).await {
                warn!(error = %e, "failed to add remote candidate");
            }
        } else {
            debug!("remote description not set, queuing candidate");
            self.pending_remote.push(candidate);
        }
    }

    async fn flush_pending(&self, pc: &RTCPeerConnection) {
        let queued = self.pending_remote.drain();
        if queued.is_empty() {
            return;
        }
        debug!(count = queued.len(), "flushing queued remote candidates");
        for candidate in queued {
            if let Err(e) = pc.add_ice_candidate(candidate.into()).await {
                warn!(error = %e, "failed to apply queued candidate");
            }
        }
    }

    /// Tears down the channel first, then the connection. Idempotent;
    /// errors from already-closed resources are swallowed.
    pub async fn close(&self) {
        self.channel.close().await;
        let pc = self.pc.lock().take();
        if let Some(pc) = pc {
            let _ = pc.close().await;
        }
        self.pending_remote.clear();
    }

    fn current(&self) -> Result<Arc<RTCPeerConnection>> {
        self.pc.lock().clone().ok_or(EngineError::NoPeerConnection)
    }
}
