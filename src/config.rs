use once_cell::sync::Lazy;
use std::time::Duration;
use webrtc::ice_transport::ice_server::RTCIceServer;

/// Relay endpoint the technician client joins sessions through.
pub const DEFAULT_SIGNALING_URL: &str = "wss://grapeassist.org/signal/";

/// License/quota backend.
pub const DEFAULT_API_BASE: &str = "https://grapeassist-backend-production.up.railway.app";

/// Label of the control channel the agent and technician share.
pub const CONTROL_CHANNEL_LABEL: &str = "remoteControl";

/// Bounded lifetime for control-channel packets. Stale mouse samples are
/// worthless, so availability wins over completeness.
pub const CONTROL_CHANNEL_LIFETIME_MS: u16 = 3000;

/// Assumed remote screen size until the agent reports the real one.
pub const DEFAULT_SCREEN_WIDTH: u32 = 1920;
pub const DEFAULT_SCREEN_HEIGHT: u32 = 1080;

/// Delay before the UI is expected to switch to the full-view presentation
/// once the session reaches connected. UI policy, exported for consumers.
pub const FULL_VIEW_DELAY: Duration = Duration::from_secs(1);

/// Two independent STUN resolvers; provider diversity keeps NAT traversal
/// working when one of them is unreachable.
pub static DEFAULT_ICE_SERVERS: Lazy<Vec<RTCIceServer>> = Lazy::new(|| {
    vec![
        RTCIceServer {
            urls: vec!["stun:stun.l.google.com:19302".into()],
            ..Default::default()
        },
        RTCIceServer {
            urls: vec!["stun:stun.twilio.com:3478".into()],
            ..Default::default()
        },
    ]
});

/// Engine configuration. Defaults point at the production relay and backend;
/// tests swap the URLs for local stand-ins.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub signaling_url: String,
    pub api_base: String,
    pub ice_servers: Vec<RTCIceServer>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            signaling_url: DEFAULT_SIGNALING_URL.into(),
            api_base: DEFAULT_API_BASE.into(),
            ice_servers: DEFAULT_ICE_SERVERS.clone(),
        }
    }
}
