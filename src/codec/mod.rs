//! Media blob codec
//!
//! Converts captured audio to the wire format, decodes returned speech,
//! converts sample rates, and compresses camera snapshots for the remote
//! channel.

pub mod audio;
pub mod frame;
pub mod resample;
pub mod transport;

pub use audio::{
    decode_audio, encode_audio, DecodedSegment, EncodedAudioChunk, CAPTURE_SAMPLE_RATE,
    CAPTURE_WINDOW, PLAYBACK_SAMPLE_RATE,
};
pub use frame::{encode_frame, EncodedVideoFrame, DEFAULT_JPEG_QUALITY, JPEG_MIME_TYPE};
pub use resample::RateConverter;
pub use transport::{from_base64, to_base64};
