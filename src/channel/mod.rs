//! Bidirectional channel to the remote guidance service
//!
//! - `client`: channel traits and the typed inbound event stream
//! - `messages`: JSON wire format
//! - `nats`: NATS-bridged transport

pub mod client;
pub mod messages;
pub mod nats;

pub use client::{ChannelConnector, ChannelEvent, LiveConnectConfig, RealtimeInput, RemoteChannel};
pub use messages::{ClientMessage, MediaChunk, ServerMessage};
pub use nats::NatsConnector;
