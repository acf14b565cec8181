use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::session::{SessionConfig, DEFAULT_SYSTEM_INSTRUCTION};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub nats_url: String,
    pub model: String,
    pub voice_name: String,
    pub system_instruction: String,
    pub transcription: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            nats_url: "nats://localhost:4222".to_string(),
            model: session.model,
            voice_name: session.voice_name,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            transcription: session.transcription,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// WAV file standing in for the microphone
    pub microphone_path: Option<PathBuf>,
    /// Image file standing in for the camera
    pub camera_path: Option<PathBuf>,
    /// Replay the microphone file instead of going silent at its end
    pub looping: bool,
    pub video_interval_ms: u64,
    pub jpeg_quality: u8,
    pub audio_window: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            microphone_path: None,
            camera_path: None,
            looping: false,
            video_interval_ms: session.video_interval.as_millis() as u64,
            jpeg_quality: session.jpeg_quality,
            audio_window: session.audio_window,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub output_sample_rate: u32,
    /// Where synthesized speech is written when a session ends
    pub output_path: Option<PathBuf>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            output_sample_rate: SessionConfig::default().output_sample_rate,
            output_path: None,
        }
    }
}

impl Config {
    /// Load from a file, with `LIVE_GUIDE__SECTION__KEY` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("LIVE_GUIDE").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            model: self.channel.model.clone(),
            voice_name: self.channel.voice_name.clone(),
            system_instruction: self.channel.system_instruction.clone(),
            transcription: self.channel.transcription,
            video_interval: Duration::from_millis(self.capture.video_interval_ms),
            jpeg_quality: self.capture.jpeg_quality.clamp(1, 100),
            audio_window: self.capture.audio_window.max(1),
            output_sample_rate: self.playback.output_sample_rate,
            ..SessionConfig::default()
        }
    }
}
