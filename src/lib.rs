//! Remote-control session engine for the GrapeAssist technician client.
//!
//! The engine owns the full life of a remote-assistance session: it
//! validates the session code against the license backend, joins the
//! signaling relay, answers the agent's WebRTC offer, receives the screen
//! stream, and encodes local input into control commands for the agent.
//!
//! Consumers drive it through [`SessionController`] and observe it through
//! [`EngineSignals`]; input flows through an [`InputEncoder`] pointed at the
//! controller's [`peer::ControlChannel`].

pub mod config;
pub mod error;
pub mod input;
pub mod licensing;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod signals;
pub mod utils;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use input::{
    is_modifier_key, CommandSink, InputCommand, InputEncoder, KeyEvent, MouseButton,
    PointerEvent, Rect, VideoGeometry, WheelEvent,
};
pub use licensing::{HttpBackend, LicenseBackend, PlanType, UserLimits};
pub use peer::types::{IceCandidate, ScreenResolution};
pub use session::{Session, SessionController};
pub use signals::{EngineSignals, SessionStatus, SignalingStatus};
