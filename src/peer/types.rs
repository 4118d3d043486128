use crate::config::{DEFAULT_SCREEN_HEIGHT, DEFAULT_SCREEN_WIDTH};
use serde::{Deserialize, Serialize};

/// Native pixel dimensions of the remote peer's screen.
///
/// Starts at the default until the agent reports the real value over the
/// control channel; a later `resolution` message may replace it (the peer
/// is allowed to resize).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenResolution {
    pub width: u32,
    pub height: u32,
}

impl Default for ScreenResolution {
    fn default() -> Self {
        Self {
            width: DEFAULT_SCREEN_WIDTH,
            height: DEFAULT_SCREEN_HEIGHT,
        }
    }
}

/// ICE candidate as exchanged with the relay, browser field casing.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

/// Messages the remote agent sends over the control channel.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AgentMessage {
    Resolution { width: u32, height: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_defaults_to_full_hd() {
        let r = ScreenResolution::default();
        assert_eq!((r.width, r.height), (1920, 1080));
    }

    #[test]
    fn ice_candidate_uses_browser_field_names() {
        let json = r#"{"candidate":"candidate:1 1 udp 2113937151 192.168.1.2 52000 typ host","sdpMid":"0","sdpMLineIndex":0}"#;
        let c: IceCandidate = serde_json::from_str(json).unwrap();
        assert_eq!(c.sdp_mid.as_deref(), Some("0"));
        assert_eq!(c.sdp_mline_index, Some(0));
        assert!(c.username_fragment.is_none());

        let back = serde_json::to_value(&c).unwrap();
        assert!(back.get("sdpMLineIndex").is_some());
        assert!(back.get("usernameFragment").is_none());
    }

    #[test]
    fn resolution_message_parses() {
        let msg: AgentMessage =
            serde_json::from_str(r#"{"type":"resolution","width":2560,"height":1440}"#).unwrap();
        let AgentMessage::Resolution { width, height } = msg;
        assert_eq!((width, height), (2560, 1440));
    }

    #[test]
    fn unknown_channel_message_is_an_error_not_a_panic() {
        assert!(serde_json::from_str::<AgentMessage>(r#"{"type":"clipboard"}"#).is_err());
    }
}
