//! Peer-to-peer connection ownership: negotiation, media reception, and the
//! remote-control data channel.

pub mod connection;
pub mod data_channel;
pub mod ice;
pub mod types;

pub use connection::PeerManager;
pub use data_channel::ControlChannel;
