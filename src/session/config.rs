use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::capture::DEFAULT_VIDEO_INTERVAL;
use crate::codec::{CAPTURE_SAMPLE_RATE, CAPTURE_WINDOW, DEFAULT_JPEG_QUALITY, PLAYBACK_SAMPLE_RATE};

/// Instruction the remote service is configured with
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a real-time visual guide for a blind or \
low-vision user. You see what their camera sees and hear what they say. Describe obstacles, \
doors, steps, signs and people that matter for moving safely, in short spoken sentences. \
Mention hazards first. Do not describe things the user did not ask about unless they affect \
their safety.";

/// Configuration for a live session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Remote model identifier
    pub model: String,

    /// Synthesized voice the replies are spoken with
    pub voice_name: String,

    pub system_instruction: String,

    /// Transcribe both the user's speech and the replies
    pub transcription: bool,

    /// Microphone sample rate (the wire format is fixed at 16kHz)
    pub capture_sample_rate: u32,

    /// Samples per encoded audio chunk
    pub audio_window: usize,

    /// Time between camera snapshots
    pub video_interval: Duration,

    /// JPEG quality for camera snapshots (1-100)
    pub jpeg_quality: u8,

    /// Output rate for synthesized speech
    pub output_sample_rate: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "models/gemini-2.0-flash-live-001".to_string(),
            voice_name: "Puck".to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            transcription: true,
            capture_sample_rate: CAPTURE_SAMPLE_RATE, // 16kHz mono
            audio_window: CAPTURE_WINDOW,             // 4096 samples (~256ms)
            video_interval: DEFAULT_VIDEO_INTERVAL,   // 1.5s
            jpeg_quality: DEFAULT_JPEG_QUALITY,       // 0.85
            output_sample_rate: PLAYBACK_SAMPLE_RATE, // 24kHz
        }
    }
}
