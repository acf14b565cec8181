use image::RgbImage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::codec::CAPTURE_SAMPLE_RATE;
use crate::error::DeviceError;
use crate::playback::{AudioOutput, HandleId};

/// Microphone samples (normalized f32, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples in `[-1, 1]`
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Requested microphone format
#[derive(Debug, Clone)]
pub struct AudioConstraints {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            sample_rate: CAPTURE_SAMPLE_RATE,
            channels: 1,
        }
    }
}

/// Which way the camera should face
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    User,
    Environment,
}

/// Requested camera format
#[derive(Debug, Clone)]
pub struct VideoConstraints {
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::Environment,
            ideal_width: 3840,
            ideal_height: 2160,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A single captured media track
pub trait MediaTrack: Send + Sync {
    fn kind(&self) -> TrackKind;

    /// Human-readable device name for logging
    fn label(&self) -> &str;

    fn set_enabled(&self, enabled: bool);

    /// Stop the track and release the underlying device
    fn stop(&self) -> Result<(), DeviceError>;
}

/// Microphone track plus its capture context
#[async_trait::async_trait]
pub trait Microphone: MediaTrack {
    /// Start delivering frames
    ///
    /// The receiver closes when capture ends. If that happens before the
    /// session stops, the device is considered revoked.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, DeviceError>;

    /// Close the capture context
    fn close(&mut self) -> Result<(), DeviceError>;

    fn is_closed(&self) -> bool;
}

/// Camera track that can be sampled on demand
pub trait Camera: MediaTrack {
    /// Current camera frame, as shown in the (mirrored) preview
    ///
    /// Returns `None` while the track is stopped or disabled, or before the
    /// first frame is available.
    fn snapshot(&self) -> Option<RgbImage>;
}

/// Microphone and camera acquired together for one session
pub struct MediaStream {
    pub microphone: Box<dyn Microphone>,
    pub camera: Arc<dyn Camera>,
}

impl MediaStream {
    /// Disable and stop every track, ignoring individual failures
    pub fn stop_tracks(&self) {
        self.microphone.set_enabled(false);
        if let Err(e) = self.microphone.stop() {
            debug!("Ignoring failure to stop {}: {}", self.microphone.label(), e);
        }

        self.camera.set_enabled(false);
        if let Err(e) = self.camera.stop() {
            debug!("Ignoring failure to stop {}: {}", self.camera.label(), e);
        }
    }
}

/// Source of capture and output devices
#[async_trait::async_trait]
pub trait MediaDevices: Send + Sync {
    async fn open_microphone(
        &self,
        constraints: &AudioConstraints,
    ) -> Result<Box<dyn Microphone>, DeviceError>;

    async fn open_camera(
        &self,
        constraints: &VideoConstraints,
    ) -> Result<Arc<dyn Camera>, DeviceError>;

    /// Open the playback output
    ///
    /// Segments that finish on their own are reported on `ended`.
    async fn open_output(
        &self,
        sample_rate: u32,
        ended: mpsc::UnboundedSender<HandleId>,
    ) -> Result<Box<dyn AudioOutput>, DeviceError>;

    /// Acquire microphone and camera together
    ///
    /// If the camera cannot be opened the microphone is released again.
    async fn open_stream(
        &self,
        audio: &AudioConstraints,
        video: &VideoConstraints,
    ) -> Result<MediaStream, DeviceError> {
        let mut microphone = self.open_microphone(audio).await?;

        match self.open_camera(video).await {
            Ok(camera) => Ok(MediaStream { microphone, camera }),
            Err(e) => {
                if let Err(stop_err) = microphone.stop() {
                    warn!("Failed to release microphone: {}", stop_err);
                }
                let _ = microphone.close();
                Err(e)
            }
        }
    }
}
