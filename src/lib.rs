pub mod capture;
pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod playback;
pub mod session;

pub use capture::{
    AudioCapturePipeline, AudioFile, AudioFrame, Camera, FileDevices, MediaDevices, MediaStream,
    Microphone, StillCamera, VideoCapturePipeline, WavMicrophone,
};
pub use channel::{ChannelConnector, ChannelEvent, NatsConnector, RemoteChannel, ServerMessage};
pub use codec::{decode_audio, encode_audio, encode_frame, DecodedSegment, EncodedAudioChunk};
pub use self::config::Config;
pub use error::{Result, SessionError};
pub use http::{create_router, AppState};
pub use playback::{AudioOutput, PlaybackScheduler, WavOutput};
pub use session::{
    ConnectionStatus, LiveSession, SessionConfig, SessionHandler, SessionStats, TranscriptLog,
    TranscriptRole, TranscriptSegment,
};
