//! Camera and microphone capture
//!
//! - `device`: device traits (microphone, camera, output) and frame types
//! - `file`: file-backed devices for headless sessions
//! - `audio`: windowed audio chunking and forwarding
//! - `video`: periodic camera snapshots

pub mod audio;
pub mod device;
pub mod file;
pub mod video;

pub use audio::AudioCapturePipeline;
pub use device::{
    AudioConstraints, AudioFrame, Camera, FacingMode, MediaDevices, MediaStream, MediaTrack,
    Microphone, TrackKind, VideoConstraints,
};
pub use file::{AudioFile, FileDevices, StillCamera, WavMicrophone};
pub use video::{spawn_video_timer, VideoCapturePipeline, DEFAULT_VIDEO_INTERVAL};
