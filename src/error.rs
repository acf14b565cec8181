//! Error types for the live guidance engine

use thiserror::Error;

use crate::playback::HandleId;
use crate::session::ConnectionStatus;

/// Failures while converting media between capture, wire and playback formats
#[derive(Debug, Error)]
pub enum CodecError {
    /// Byte length is not a whole multiple of the 16-bit sample width
    #[error("audio payload of {0} bytes is not a whole number of 16-bit samples")]
    PartialSample(usize),

    #[error("invalid channel count: {0}")]
    InvalidChannels(u16),

    /// Interleaved samples do not divide evenly across channels
    #[error("{samples} samples do not form whole frames of {channels} channels")]
    PartialFrame { samples: usize, channels: u16 },

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Snapshot had no pixels to encode
    #[error("video frame is empty")]
    EmptyFrame,

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("cannot convert {from}Hz audio to {to}Hz: {reason}")]
    Resample { from: u32, to: u32, reason: String },
}

/// Camera, microphone and output device failures
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The device went away while capturing
    #[error("device revoked: {0}")]
    Revoked(String),

    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Playback output failures
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("output is closed")]
    Closed,

    #[error("unknown playback handle {0}")]
    UnknownHandle(HandleId),

    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Segment could not be brought to the output rate
    #[error("cannot render segment: {0}")]
    Render(#[from] CodecError),
}

/// Remote channel failures
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("channel is closed")]
    Closed,

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors surfaced by the session lifecycle controller
#[derive(Debug, Error)]
pub enum SessionError {
    /// Camera or microphone could not be acquired at start
    #[error("could not access camera or microphone: {0}")]
    DeviceAccess(#[from] DeviceError),

    /// Remote channel failed to open
    #[error("could not connect to the guidance service: {0}")]
    ChannelConnect(ChannelError),

    /// Malformed inbound audio; recovered locally
    #[error("could not decode audio: {0}")]
    Decode(#[from] CodecError),

    /// Remote side reported an error
    #[error("guidance service error: {0}")]
    Remote(String),

    #[error("a session is already {0}")]
    AlreadyActive(ConnectionStatus),

    /// `stop()` ran while `start()` was still suspended
    #[error("session was stopped while starting")]
    Cancelled,
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
