//! Playback of synthesized speech
//!
//! - `output`: the output device abstraction and a WAV-rendering output
//! - `scheduler`: gapless, interruptible scheduling of decoded segments

pub mod output;
pub mod scheduler;

pub use output::{AudioOutput, HandleId, WavOutput};
pub use scheduler::{PlaybackHandle, PlaybackScheduler};
