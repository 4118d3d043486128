use thiserror::Error;

/// Engine-wide error type.
///
/// Business denials (`LimitExceeded`, `SessionRejected`) carry the short,
/// user-facing message the UI shows verbatim; transport variants wrap the
/// underlying library errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Enter a session code")]
    EmptyCode,

    #[error("{0}")]
    LimitExceeded(String),

    #[error("Backend rejected session {code}: {reason}")]
    SessionRejected { code: String, reason: String },

    #[error("Signaling error: {0}")]
    Signaling(String),

    #[error("No active peer connection")]
    NoPeerConnection,

    #[error("WebSocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
